//! The causality graph: which states can produce which signals.
//!
//! The graph may contain cycles (a state's output feeding back into its own
//! inputs). It is only ever consulted locally: completion walks outward
//! from one conjunction and visits each signal at most once per branch, so
//! cycles cannot cause unbounded expansion.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use arbiter_types::{Signal, StateId};

use crate::constraint::Conjunction;

/// Upper bound on completed branches derived from one original branch.
const MAX_COMPLETIONS: usize = 32;
/// Upper bound on expansion steps per original branch.
const MAX_COMPLETION_STEPS: usize = 1024;

#[derive(Debug, Default)]
pub(crate) struct CausalGraph {
    causes: BTreeMap<Signal, BTreeSet<StateId>>,
}

impl CausalGraph {
    /// Record that `state` can cause `signal`. Idempotent.
    pub(crate) fn add(&mut self, signal: Signal, state: StateId) -> bool {
        self.causes.entry(signal).or_default().insert(state)
    }

    pub(crate) fn causes(&self, signal: &Signal) -> impl Iterator<Item = StateId> + '_ {
        self.causes.get(signal).into_iter().flatten().copied()
    }

    /// Drop every edge from `state`. Returns the signals it used to cause.
    pub(crate) fn remove_state(&mut self, state: StateId) -> Vec<Signal> {
        let mut affected = Vec::new();
        self.causes.retain(|signal, states| {
            if states.remove(&state) {
                affected.push(signal.clone());
            }
            !states.is_empty()
        });
        affected
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.causes.values().map(BTreeSet::len).sum()
    }

    /// Extend each original branch with the branches of the states causing
    /// its signals, transitively. Returns only genuinely extended branches.
    pub(crate) fn complete<'a>(
        &self,
        originals: &[Conjunction],
        branches_of: impl Fn(StateId) -> Option<&'a [Conjunction]>,
    ) -> Vec<Conjunction> {
        let mut completed: Vec<Conjunction> = Vec::new();
        for original in originals {
            let mut results: Vec<Conjunction> = Vec::new();
            let frontier: VecDeque<Signal> = original.signals().cloned().collect();
            let mut pending = vec![(original.clone(), frontier)];
            let mut steps = 0;

            while let Some((current, mut frontier)) = pending.pop() {
                steps += 1;
                if steps > MAX_COMPLETION_STEPS || results.len() >= MAX_COMPLETIONS {
                    tracing::debug!(
                        branches = results.len(),
                        "Stopped completing branch at expansion limit"
                    );
                    break;
                }
                let Some(signal) = frontier.pop_front() else {
                    if current.is_completed() && !results.iter().any(|r| r.same_leaves(&current)) {
                        results.push(current);
                    }
                    continue;
                };
                let alternatives: Vec<&Conjunction> = self
                    .causes(&signal)
                    .filter_map(&branches_of)
                    .flatten()
                    .collect();
                if alternatives.is_empty() {
                    pending.push((current, frontier));
                    continue;
                }
                for alternative in alternatives {
                    let mut next = current.clone();
                    let mut next_frontier = frontier.clone();
                    next_frontier.extend(next.absorb(alternative));
                    pending.push((next, next_frontier));
                }
            }

            for result in results {
                let duplicate = originals.iter().any(|o| o.same_leaves(&result))
                    || completed.iter().any(|c| c.same_leaves(&result));
                if !duplicate {
                    completed.push(result);
                }
            }
        }
        completed
    }
}
