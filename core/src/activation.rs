//! Activations: per-state progress toward satisfying a constraint.
//!
//! An activation learns about spikes only when they are emitted (`acquire`),
//! and re-checks age windows lazily every pass, so a leaf satisfied at
//! arrival can age out later. Once fired, the activation is replaced by a
//! fresh one that only sees later spikes.

use std::collections::BTreeMap;
use std::time::Duration;

use arbiter_types::{ActivationId, Signal, SpikeId, StateId};

use crate::constraint::{Conjunction, Leaf};
use crate::spike::SpikeStore;

/// Score of one branch: the sum of its signals' specificities, capped at 1.
pub(crate) fn branch_specificity(conjunction: &Conjunction, signal: &impl Fn(&Signal) -> f64) -> f64 {
    conjunction.signals().map(signal).sum::<f64>().min(1.0)
}

/// A complete branch and the spikes that satisfied it.
#[derive(Debug, Clone)]
pub(crate) struct FiredBranch {
    pub(crate) index: usize,
    pub(crate) spikes: Vec<SpikeId>,
    pub(crate) specificity: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct Activation {
    id: ActivationId,
    state: StateId,
    conjunctions: Vec<Conjunction>,
    candidates: BTreeMap<Signal, Vec<SpikeId>>,
}

impl Activation {
    pub(crate) fn new(id: ActivationId, state: StateId, conjunctions: Vec<Conjunction>) -> Self {
        Self {
            id,
            state,
            conjunctions,
            candidates: BTreeMap::new(),
        }
    }

    pub(crate) fn id(&self) -> ActivationId {
        self.id
    }

    pub(crate) fn conjunctions(&self) -> &[Conjunction] {
        &self.conjunctions
    }

    pub(crate) fn pending_spikes(&self) -> usize {
        self.candidates.values().map(Vec::len).sum()
    }

    pub(crate) fn references(&self, signal: &Signal) -> bool {
        self.conjunctions.iter().any(|conj| conj.contains(signal))
    }

    /// Offer a newly emitted spike. Returns whether any leaf wants it.
    pub(crate) fn acquire(&mut self, spike: SpikeId, signal: &Signal) -> bool {
        if !self.references(signal) {
            return false;
        }
        self.candidates.entry(signal.clone()).or_default().push(spike);
        true
    }

    /// Swap in a new set of branches, keeping spikes the new branches still reference.
    pub(crate) fn rebuild(&mut self, conjunctions: Vec<Conjunction>) {
        self.conjunctions = conjunctions;
        let conjunctions = &self.conjunctions;
        self.candidates
            .retain(|signal, _| conjunctions.iter().any(|conj| conj.contains(signal)));
    }

    /// A fresh instantiation with the same branches and no spikes.
    pub(crate) fn renewed(&self, id: ActivationId) -> Self {
        Self::new(id, self.state, self.conjunctions.clone())
    }

    /// Forget spikes that are gone or too old for every leaf on their signal.
    pub(crate) fn prune(&mut self, now: Duration, spikes: &SpikeStore) {
        let conjunctions = &self.conjunctions;
        for (signal, ids) in &mut self.candidates {
            ids.retain(|id| {
                spikes.get(*id).is_some_and(|spike| {
                    let age = spike.age(now);
                    conjunctions
                        .iter()
                        .flat_map(Conjunction::leaves)
                        .filter(|leaf| leaf.signal() == signal)
                        .any(|leaf| !leaf.window().expired(age))
                })
            });
        }
        self.candidates.retain(|_, ids| !ids.is_empty());
    }

    /// The newest live spike satisfying `leaf` right now.
    fn leaf_match(&self, leaf: &Leaf, now: Duration, spikes: &SpikeStore) -> Option<SpikeId> {
        self.candidates
            .get(leaf.signal())?
            .iter()
            .rev()
            .copied()
            .find(|id| {
                spikes
                    .get(*id)
                    .is_some_and(|spike| leaf.window().contains(spike.age(now)))
            })
    }

    fn branch_match(&self, conj: &Conjunction, now: Duration, spikes: &SpikeStore) -> Option<Vec<SpikeId>> {
        conj.leaves()
            .iter()
            .map(|leaf| self.leaf_match(leaf, now, spikes))
            .collect()
    }

    /// The highest-scoring complete branch, if any. Ties go to the earlier branch.
    pub(crate) fn best_branch(
        &self,
        now: Duration,
        spikes: &SpikeStore,
        signal: &impl Fn(&Signal) -> f64,
    ) -> Option<FiredBranch> {
        let mut best: Option<FiredBranch> = None;
        for (index, conj) in self.conjunctions.iter().enumerate() {
            let Some(matched) = self.branch_match(conj, now, spikes) else {
                continue;
            };
            let specificity = branch_specificity(conj, signal);
            if best.as_ref().is_none_or(|b| specificity > b.specificity) {
                best = Some(FiredBranch {
                    index,
                    spikes: matched,
                    specificity,
                });
            }
        }
        best
    }

    /// The lowest branch score across every original and completed branch.
    pub(crate) fn specificity(&self, signal: &impl Fn(&Signal) -> f64) -> f64 {
        self.conjunctions
            .iter()
            .map(|conj| branch_specificity(conj, signal))
            .reduce(f64::min)
            .unwrap_or(0.0)
    }
}
