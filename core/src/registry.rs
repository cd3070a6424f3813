//! Everything guarded by the context's single mutual-exclusion domain:
//! modules, properties, states, activations, the causality graph and the
//! live spike set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arbiter_config::{Configuration, ContextSettings};
use arbiter_types::{ActivationId, QualifiedName, Signal, SpikeId, StateId};
use serde_json::Value;

use crate::activation::{Activation, FiredBranch};
use crate::causality::CausalGraph;
use crate::constraint::Conjunction;
use crate::error::ContextError;
use crate::module::Module;
use crate::property::{Mutation, Property, PropertySlot};
use crate::spike::{Spike, SpikeStore};
use crate::state::State;

/// What a cascading removal took with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    pub states: Vec<QualifiedName>,
    pub activations: usize,
}

/// Read-only view of one activation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationInfo {
    pub id: ActivationId,
    pub state: QualifiedName,
    pub specificity: f64,
    pub branches: usize,
    pub pending_spikes: usize,
}

/// A spike that satisfied the branch a state fired on.
#[derive(Debug, Clone)]
pub(crate) struct Trigger {
    pub(crate) spike: SpikeId,
    pub(crate) signal: Signal,
    pub(crate) payload: Option<Value>,
}

pub(crate) struct Firing {
    pub(crate) state: Arc<State>,
    pub(crate) triggers: Vec<Trigger>,
    pub(crate) specificity: f64,
}

/// Output of the locked half of a scheduling pass.
pub(crate) struct Plan {
    pub(crate) firings: Vec<Firing>,
    pub(crate) suppressed: Vec<QualifiedName>,
    pub(crate) expired: usize,
}

struct StateEntry {
    state: Arc<State>,
    originals: Vec<Conjunction>,
    completions: Vec<Conjunction>,
}

impl StateEntry {
    fn branches(&self) -> Vec<Conjunction> {
        self.originals
            .iter()
            .chain(&self.completions)
            .cloned()
            .collect()
    }

    fn all_branches(&self) -> impl Iterator<Item = &Conjunction> {
        self.originals.iter().chain(&self.completions)
    }

    fn references(&self, signal: &Signal) -> bool {
        self.all_branches().any(|conj| conj.contains(signal))
    }
}

fn specificity_from(fan_out: &BTreeMap<Signal, usize>, signal: &Signal) -> f64 {
    match fan_out.get(signal) {
        Some(&count) if count > 0 => 1.0 / count as f64,
        _ => 0.0,
    }
}

pub(crate) struct Registry {
    settings: ContextSettings,
    configuration: Configuration,
    modules: BTreeMap<String, Module>,
    properties: BTreeMap<QualifiedName, PropertySlot>,
    states: BTreeMap<StateId, StateEntry>,
    state_ids: HashMap<QualifiedName, StateId>,
    activations: BTreeMap<StateId, Vec<Activation>>,
    causes: CausalGraph,
    spikes: SpikeStore,
    next_state: u64,
    next_activation: u64,
}

impl Registry {
    pub(crate) fn new(settings: ContextSettings, configuration: Configuration) -> Self {
        Self {
            settings,
            configuration,
            modules: BTreeMap::new(),
            properties: BTreeMap::new(),
            states: BTreeMap::new(),
            state_ids: HashMap::new(),
            activations: BTreeMap::new(),
            causes: CausalGraph::default(),
            spikes: SpikeStore::new(),
            next_state: 0,
            next_activation: 0,
        }
    }

    fn activation_id(&mut self) -> ActivationId {
        self.next_activation += 1;
        ActivationId::new(self.next_activation)
    }

    // ------------------------------------------------------------------
    // Spikes
    // ------------------------------------------------------------------

    pub(crate) fn emit(
        &mut self,
        signal: Signal,
        payload: Option<Value>,
        wipe: bool,
        now: Duration,
    ) -> SpikeId {
        if wipe {
            let wiped = self.spikes.wipe_signal(&signal);
            if !wiped.is_empty() {
                tracing::trace!(signal = %signal, count = wiped.len(), "Wiped previous spikes");
            }
        }
        let id = self.spikes.insert(signal.clone(), now, payload);
        let mut interested = 0;
        for activation in self.activations.values_mut().flatten() {
            if activation.acquire(id, &signal) {
                interested += 1;
            }
        }
        tracing::trace!(signal = %signal, spike = %id, interested, "Emitted spike");
        id
    }

    /// Emit on behalf of a firing state; the triggering spikes adopt the new one.
    pub(crate) fn emit_caused(
        &mut self,
        signal: Signal,
        parents: &[SpikeId],
        now: Duration,
    ) -> SpikeId {
        let id = self.emit(signal, None, false, now);
        for parent in parents {
            if let Err(err) = self.spikes.adopt(*parent, id) {
                tracing::debug!(error = %err, "Skipped adoption of emitted spike");
            }
        }
        id
    }

    pub(crate) fn adopt(&mut self, parent: SpikeId, child: SpikeId) -> Result<(), ContextError> {
        self.spikes.adopt(parent, child)
    }

    pub(crate) fn wipe(&mut self, spike: SpikeId) -> usize {
        self.spikes.wipe(spike).len()
    }

    pub(crate) fn spike_count(&self) -> usize {
        self.spikes.len()
    }

    pub(crate) fn live_spikes(&self) -> Vec<Spike> {
        self.spikes.iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    pub(crate) fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub(crate) fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub(crate) fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub(crate) fn insert_module(&mut self, module: Module) {
        self.configuration
            .add_module_defaults(module.name(), module.config_defaults().clone());
        self.modules.insert(module.name().to_string(), module);
    }

    pub(crate) fn config_value(&self, module: &str, key: &str) -> Option<Value> {
        self.configuration.get(module, key).cloned()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Returns `false` if the property was already registered.
    pub(crate) fn add_prop(&mut self, property: Property) -> Result<bool, ContextError> {
        if !self.modules.contains_key(property.module()) {
            return Err(ContextError::UnknownModule {
                name: property.module().to_string(),
            });
        }
        let id = property.id();
        if self.properties.contains_key(&id) {
            tracing::warn!("Attempt to add property `{id}` twice!");
            return Ok(false);
        }
        self.properties.insert(id, PropertySlot::new(property));
        Ok(true)
    }

    pub(crate) fn rm_prop(&mut self, id: &QualifiedName) -> Result<Removal, ContextError> {
        if self.properties.remove(id).is_none() {
            return Err(ContextError::UnknownProperty {
                name: id.to_string(),
            });
        }
        let dependents: Vec<QualifiedName> = self
            .states
            .values()
            .filter(|entry| entry.state.references_property(id))
            .map(|entry| entry.state.id())
            .collect();
        let mut removal = Removal::default();
        for state in dependents {
            let removed = self.rm_state(&state)?;
            removal.states.extend(removed.states);
            removal.activations += removed.activations;
        }
        tracing::info!(
            property = %id,
            states = removal.states.len(),
            activations = removal.activations,
            "Removed property"
        );
        Ok(removal)
    }

    pub(crate) fn has_property(&self, id: &QualifiedName) -> bool {
        self.properties.contains_key(id)
    }

    fn slot(&self, id: &QualifiedName) -> Result<&PropertySlot, ContextError> {
        self.properties
            .get(id)
            .ok_or_else(|| ContextError::UnknownProperty {
                name: id.to_string(),
            })
    }

    fn slot_mut(&mut self, id: &QualifiedName) -> Result<&mut PropertySlot, ContextError> {
        self.properties
            .get_mut(id)
            .ok_or_else(|| ContextError::UnknownProperty {
                name: id.to_string(),
            })
    }

    pub(crate) fn read_property(&self, id: &QualifiedName) -> Result<Value, ContextError> {
        self.slot(id)?.read()
    }

    pub(crate) fn property_children(&self, id: &QualifiedName) -> Result<Vec<Value>, ContextError> {
        Ok(self.slot(id)?.children().to_vec())
    }

    pub(crate) fn write_property(
        &mut self,
        id: &QualifiedName,
        value: Value,
        now: Duration,
    ) -> Result<bool, ContextError> {
        let mutation = self.slot_mut(id)?.write(value)?;
        Ok(self.publish(id, mutation, now).is_some())
    }

    pub(crate) fn push_property(
        &mut self,
        id: &QualifiedName,
        child: Value,
        now: Duration,
    ) -> Result<(), ContextError> {
        let mutation = self.slot_mut(id)?.push(child)?;
        self.publish(id, mutation, now);
        Ok(())
    }

    pub(crate) fn pop_property(
        &mut self,
        id: &QualifiedName,
        now: Duration,
    ) -> Result<Value, ContextError> {
        let mutation = self.slot_mut(id)?.pop()?;
        let popped = match &mutation {
            Mutation::Popped(value) => value.clone(),
            _ => Value::Null,
        };
        self.publish(id, mutation, now);
        Ok(popped)
    }

    /// Turn a mutation into its derived spike, under the same lock as the
    /// mutation itself.
    fn publish(&mut self, id: &QualifiedName, mutation: Mutation, now: Duration) -> Option<SpikeId> {
        let slot = self.properties.get(id)?;
        let (signal, payload, wipe) = match mutation {
            Mutation::Unchanged => return None,
            Mutation::Changed(value) => (slot.decl().changed_signal(), value, true),
            Mutation::Pushed(value) => (slot.decl().pushed_signal(), value, false),
            Mutation::Popped(value) => (slot.decl().popped_signal(), value, false),
        };
        Some(self.emit(signal, Some(payload), wipe, now))
    }

    // ------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------

    pub(crate) fn add_state(&mut self, state: State) -> Result<StateId, ContextError> {
        let id = state.id();
        if let Some(existing) = self.state_ids.get(&id) {
            tracing::warn!("Attempt to add state `{id}` twice!");
            return Ok(*existing);
        }
        if !self.modules.contains_key(state.module()) {
            return Err(ContextError::UnknownModule {
                name: state.module().to_string(),
            });
        }
        if let Some(missing) = state
            .reads()
            .iter()
            .chain(state.writes())
            .find(|prop| !self.properties.contains_key(*prop))
        {
            return Err(ContextError::UnknownProperty {
                name: missing.to_string(),
            });
        }
        let constraint = state
            .effective_constraint()
            .ok_or_else(|| ContextError::EmptyConstraint(id.clone()))?;
        let originals =
            constraint.conjunctions(state.module(), &self.configuration, &self.settings);
        if originals.is_empty() {
            return Err(ContextError::EmptyConstraint(id));
        }

        self.next_state += 1;
        let state_id = StateId::new(self.next_state);
        let mut caused = state.emittable();
        for property in state.writes() {
            if let Some(slot) = self.properties.get(property) {
                caused.extend(slot.decl().write_signals());
            }
        }
        let activation_id = self.activation_id();
        self.activations.insert(
            state_id,
            vec![Activation::new(activation_id, state_id, originals.clone())],
        );
        self.states.insert(
            state_id,
            StateEntry {
                state: Arc::new(state),
                originals,
                completions: Vec::new(),
            },
        );
        self.state_ids.insert(id.clone(), state_id);

        for signal in &caused {
            self.causes.add(signal.clone(), state_id);
        }
        let mut affected = self.states_referencing(&caused);
        affected.insert(state_id);
        self.refresh_completions(&affected);

        tracing::info!(state = %id, "Added state");
        Ok(state_id)
    }

    pub(crate) fn rm_state(&mut self, id: &QualifiedName) -> Result<Removal, ContextError> {
        let state_id = self
            .state_ids
            .remove(id)
            .ok_or_else(|| ContextError::UnknownState(id.clone()))?;
        self.states.remove(&state_id);
        let activations = self
            .activations
            .remove(&state_id)
            .map_or(0, |acts| acts.len());
        let affected_signals = self.causes.remove_state(state_id);
        let affected = self.states_referencing(&affected_signals);
        self.refresh_completions(&affected);
        tracing::debug!(state = %id, activations, "Removed state");
        Ok(Removal {
            states: vec![id.clone()],
            activations,
        })
    }

    fn states_referencing(&self, signals: &[Signal]) -> BTreeSet<StateId> {
        self.states
            .iter()
            .filter(|(_, entry)| signals.iter().any(|signal| entry.references(signal)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Recompute completed branches for `targets` and rebuild their activations.
    fn refresh_completions(&mut self, targets: &BTreeSet<StateId>) {
        let updates: Vec<(StateId, Vec<Conjunction>)> = targets
            .iter()
            .filter_map(|id| {
                let entry = self.states.get(id)?;
                let completions = self.causes.complete(&entry.originals, |cause| {
                    self.states.get(&cause).map(|e| e.originals.as_slice())
                });
                Some((*id, completions))
            })
            .collect();

        for (id, completions) in updates {
            let Some(entry) = self.states.get_mut(&id) else {
                continue;
            };
            entry.completions = completions;
            let branches = entry.branches();
            if let Some(activations) = self.activations.get_mut(&id) {
                for activation in activations {
                    activation.rebuild(branches.clone());
                }
            }
        }
    }

    pub(crate) fn has_state(&self, id: &QualifiedName) -> bool {
        self.state_ids.contains_key(id)
    }

    fn entry(&self, id: &QualifiedName) -> Result<(StateId, &StateEntry), ContextError> {
        let state_id = self
            .state_ids
            .get(id)
            .copied()
            .ok_or_else(|| ContextError::UnknownState(id.clone()))?;
        self.states
            .get(&state_id)
            .map(|entry| (state_id, entry))
            .ok_or_else(|| ContextError::UnknownState(id.clone()))
    }

    pub(crate) fn conjunctions(&self, id: &QualifiedName) -> Result<Vec<Conjunction>, ContextError> {
        Ok(self.entry(id)?.1.branches())
    }

    // ------------------------------------------------------------------
    // Causality & specificity
    // ------------------------------------------------------------------

    /// Number of distinct states whose branches reference each signal.
    fn fan_out(&self) -> BTreeMap<Signal, usize> {
        let mut fan_out = BTreeMap::new();
        for entry in self.states.values() {
            let signals: BTreeSet<&Signal> = entry
                .all_branches()
                .flat_map(Conjunction::signals)
                .collect();
            for signal in signals {
                *fan_out.entry(signal.clone()).or_insert(0) += 1;
            }
        }
        fan_out
    }

    pub(crate) fn signal_specificity(&self, signal: &Signal) -> f64 {
        specificity_from(&self.fan_out(), signal)
    }

    pub(crate) fn states_for_signal(&self, signal: &Signal) -> Vec<QualifiedName> {
        self.states
            .values()
            .filter(|entry| entry.references(signal))
            .map(|entry| entry.state.id())
            .collect()
    }

    pub(crate) fn signal_causes(&self, signal: &Signal) -> Vec<QualifiedName> {
        self.causes
            .causes(signal)
            .filter_map(|id| self.states.get(&id))
            .map(|entry| entry.state.id())
            .collect()
    }

    pub(crate) fn activations_of(&self, id: &QualifiedName) -> Result<Vec<ActivationInfo>, ContextError> {
        let (state_id, entry) = self.entry(id)?;
        let fan_out = self.fan_out();
        let score = |signal: &Signal| specificity_from(&fan_out, signal);
        Ok(self
            .activations
            .get(&state_id)
            .into_iter()
            .flatten()
            .map(|activation| ActivationInfo {
                id: activation.id(),
                state: entry.state.id(),
                specificity: activation.specificity(&score),
                branches: activation.conjunctions().len(),
                pending_spikes: activation.pending_spikes(),
            })
            .collect())
    }

    pub(crate) fn state_count(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub(crate) fn activation_count(&self) -> usize {
        self.activations.values().map(Vec::len).sum()
    }

    pub(crate) fn causality_edge_count(&self) -> usize {
        self.causes.edge_count()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Largest age any leaf accepts for each referenced signal.
    fn retention(&self) -> BTreeMap<Signal, f64> {
        let mut retention: BTreeMap<Signal, f64> = BTreeMap::new();
        for leaf in self
            .states
            .values()
            .flat_map(StateEntry::all_branches)
            .flat_map(Conjunction::leaves)
        {
            let max = retention.entry(leaf.signal().clone()).or_insert(0.0);
            *max = max.max(leaf.window().max());
        }
        retention
    }

    /// The locked half of a pass: expire, re-evaluate, arbitrate, renew.
    pub(crate) fn plan(&mut self, now: Duration) -> Plan {
        let retention = self.retention();
        let fallback = self.settings.spike_retention;
        let expired = self.spikes.expire(now, |signal| {
            retention.get(signal).copied().unwrap_or(fallback)
        });

        let fan_out = self.fan_out();
        let score = |signal: &Signal| specificity_from(&fan_out, signal);
        let mut candidates: Vec<(StateId, usize, FiredBranch)> = Vec::new();
        for (state_id, activations) in &mut self.activations {
            for (index, activation) in activations.iter_mut().enumerate() {
                activation.prune(now, &self.spikes);
                if let Some(branch) = activation.best_branch(now, &self.spikes, &score) {
                    candidates.push((*state_id, index, branch));
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.2.specificity
                .total_cmp(&a.2.specificity)
                .then(a.0.cmp(&b.0))
        });

        let mut claimed: BTreeSet<QualifiedName> = BTreeSet::new();
        let mut firings = Vec::new();
        let mut suppressed = Vec::new();
        for (state_id, index, branch) in candidates {
            let Some(state) = self.states.get(&state_id).map(|e| Arc::clone(&e.state)) else {
                continue;
            };
            let renewed_id = self.activation_id();
            if let Some(activation) = self
                .activations
                .get_mut(&state_id)
                .and_then(|acts| acts.get_mut(index))
            {
                *activation = activation.renewed(renewed_id);
            }

            if let Some(conflict) = state.writes().iter().find(|prop| claimed.contains(*prop)) {
                tracing::debug!(
                    state = %state.id(),
                    property = %conflict,
                    branch = branch.index,
                    specificity = branch.specificity,
                    "Suppressed by a more specific state writing the same property"
                );
                suppressed.push(state.id());
                continue;
            }
            claimed.extend(state.writes().iter().cloned());

            let triggers = branch
                .spikes
                .iter()
                .filter_map(|id| self.spikes.get(*id))
                .map(|spike| Trigger {
                    spike: spike.id(),
                    signal: spike.signal().clone(),
                    payload: spike.payload().cloned(),
                })
                .collect();
            firings.push(Firing {
                state,
                triggers,
                specificity: branch.specificity,
            });
        }

        Plan {
            firings,
            suppressed,
            expired,
        }
    }
}
