//! Spikes: timestamped occurrences of signals.
//!
//! The context owns every spike through [`SpikeStore`]. Adoption records a
//! parent→child edge; wiping a spike removes it and, transitively, every
//! spike it adopted. Being wiped is being absent from the store: a wiped
//! spike can no longer satisfy any constraint.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use arbiter_types::{Signal, SpikeId};
use serde_json::Value;

use crate::clock::age_secs;
use crate::error::ContextError;

/// One occurrence of a signal.
///
/// There is no wiped flag: wiping removes the spike from the store, so a
/// spike obtained from [`SpikeStore`] or a `live_spikes()` snapshot was live
/// when it was read.
#[derive(Debug, Clone)]
pub struct Spike {
    id: SpikeId,
    signal: Signal,
    created: Duration,
    payload: Option<Value>,
    children: BTreeSet<SpikeId>,
}

impl Spike {
    #[must_use]
    pub fn id(&self) -> SpikeId {
        self.id
    }

    #[must_use]
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    #[must_use]
    pub fn created(&self) -> Duration {
        self.created
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Spikes whose lifetime is tied to this one.
    #[must_use]
    pub fn children(&self) -> &BTreeSet<SpikeId> {
        &self.children
    }

    #[must_use]
    pub fn age(&self, now: Duration) -> f64 {
        age_secs(now, self.created)
    }
}

/// The live spike set.
#[derive(Debug, Default)]
pub(crate) struct SpikeStore {
    live: BTreeMap<SpikeId, Spike>,
    next_id: u64,
}

impl SpikeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn get(&self, id: SpikeId) -> Option<&Spike> {
        self.live.get(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Spike> {
        self.live.values()
    }

    pub(crate) fn insert(
        &mut self,
        signal: Signal,
        created: Duration,
        payload: Option<Value>,
    ) -> SpikeId {
        self.next_id += 1;
        let id = SpikeId::new(self.next_id);
        self.live.insert(
            id,
            Spike {
                id,
                signal,
                created,
                payload,
                children: BTreeSet::new(),
            },
        );
        id
    }

    /// Wipe every live spike of `signal`, cascading into adopted children.
    pub(crate) fn wipe_signal(&mut self, signal: &Signal) -> Vec<SpikeId> {
        let roots: Vec<SpikeId> = self
            .live
            .values()
            .filter(|spike| &spike.signal == signal)
            .map(|spike| spike.id)
            .collect();
        self.wipe_all(roots)
    }

    pub(crate) fn wipe(&mut self, id: SpikeId) -> Vec<SpikeId> {
        self.wipe_all(vec![id])
    }

    fn wipe_all(&mut self, mut pending: Vec<SpikeId>) -> Vec<SpikeId> {
        let mut removed = Vec::new();
        while let Some(id) = pending.pop() {
            if let Some(spike) = self.live.remove(&id) {
                removed.push(id);
                pending.extend(spike.children);
            }
        }
        removed
    }

    /// Record that `parent` adopts `child`. Rejected if `child` already
    /// (transitively) adopted `parent`, or if either spike is gone.
    pub(crate) fn adopt(&mut self, parent: SpikeId, child: SpikeId) -> Result<(), ContextError> {
        if parent == child {
            return Err(ContextError::InvalidAdoption { parent, child });
        }
        for id in [parent, child] {
            if !self.live.contains_key(&id) {
                return Err(ContextError::UnknownSpike(id));
            }
        }
        if self.reaches(child, parent) {
            return Err(ContextError::InvalidAdoption { parent, child });
        }
        if let Some(spike) = self.live.get_mut(&parent) {
            spike.children.insert(child);
        }
        Ok(())
    }

    /// Whether `target` is reachable from `from` along adoption edges.
    fn reaches(&self, from: SpikeId, target: SpikeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(spike) = self.live.get(&id) {
                pending.extend(spike.children.iter().copied());
            }
        }
        false
    }

    /// Drop spikes older than their signal's retention. Children survive an
    /// expiring parent; only an explicit wipe cascades.
    pub(crate) fn expire(&mut self, now: Duration, retention: impl Fn(&Signal) -> f64) -> usize {
        let expired: Vec<SpikeId> = self
            .live
            .values()
            .filter(|spike| spike.age(now) > retention(&spike.signal))
            .map(|spike| spike.id)
            .collect();
        for id in &expired {
            self.live.remove(id);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Expired spikes");
        }
        expired.len()
    }
}
