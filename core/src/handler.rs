//! The view a state's handler gets of the context while it runs.

use arbiter_types::{QualifiedName, Signal, SpikeId};
use serde_json::Value;

use crate::context::Shared;
use crate::error::{ContextError, PropertyAccess};
use crate::registry::Trigger;
use crate::state::State;

/// Handed to a [`crate::Handler`] for the duration of one firing.
///
/// Property access is limited to the state's declared read and write sets,
/// and emission to its declared signals. Every spike emitted through this
/// context is adopted by the spikes that triggered the firing.
pub struct StateContext<'a> {
    shared: &'a Shared,
    state: &'a State,
    triggers: &'a [Trigger],
    emitted: Vec<SpikeId>,
}

impl<'a> StateContext<'a> {
    pub(crate) fn new(shared: &'a Shared, state: &'a State, triggers: &'a [Trigger]) -> Self {
        Self {
            shared,
            state,
            triggers,
            emitted: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> QualifiedName {
        self.state.id()
    }

    /// Spikes emitted so far during this firing.
    #[must_use]
    pub fn emitted(&self) -> &[SpikeId] {
        &self.emitted
    }

    fn authorize(&self, property: &QualifiedName, access: PropertyAccess) -> Result<(), ContextError> {
        let declared = match access {
            PropertyAccess::Read => self.state.reads(),
            PropertyAccess::Write | PropertyAccess::Push | PropertyAccess::Pop => {
                self.state.writes()
            }
        };
        if declared.contains(property) {
            Ok(())
        } else {
            Err(ContextError::UnauthorizedAccess {
                state: self.state.id(),
                property: property.clone(),
                access,
            })
        }
    }

    pub fn get(&self, property: &QualifiedName) -> Result<Value, ContextError> {
        self.authorize(property, PropertyAccess::Read)?;
        self.shared.lock().read_property(property)
    }

    /// Write a property. Returns whether a `changed` spike was emitted.
    pub fn set(&mut self, property: &QualifiedName, value: impl Into<Value>) -> Result<bool, ContextError> {
        self.authorize(property, PropertyAccess::Write)?;
        let changed = self
            .shared
            .lock()
            .write_property(property, value.into(), self.shared.now())?;
        self.shared.notify();
        Ok(changed)
    }

    pub fn push(&mut self, property: &QualifiedName, child: impl Into<Value>) -> Result<(), ContextError> {
        self.authorize(property, PropertyAccess::Push)?;
        self.shared
            .lock()
            .push_property(property, child.into(), self.shared.now())?;
        self.shared.notify();
        Ok(())
    }

    pub fn pop(&mut self, property: &QualifiedName) -> Result<Value, ContextError> {
        self.authorize(property, PropertyAccess::Pop)?;
        let popped = self.shared.lock().pop_property(property, self.shared.now())?;
        self.shared.notify();
        Ok(popped)
    }

    /// Emit the state's own signal.
    pub fn emit(&mut self) -> Result<SpikeId, ContextError> {
        let signal = self
            .state
            .signal()
            .ok_or_else(|| ContextError::UnauthorizedSignal {
                state: self.state.id(),
                signal: Signal::new(self.state.module(), self.state.name()),
            })?;
        self.emit_signal(signal)
    }

    /// Emit any signal the state declared.
    pub fn emit_signal(&mut self, signal: Signal) -> Result<SpikeId, ContextError> {
        if !self.state.may_emit(&signal) {
            return Err(ContextError::UnauthorizedSignal {
                state: self.state.id(),
                signal,
            });
        }
        let parents: Vec<SpikeId> = self.triggers.iter().map(|t| t.spike).collect();
        let id = self
            .shared
            .lock()
            .emit_caused(signal, &parents, self.shared.now());
        self.shared.notify();
        self.emitted.push(id);
        Ok(id)
    }

    /// Signals of the spikes that triggered this firing.
    pub fn triggers(&self) -> impl Iterator<Item = &Signal> {
        self.triggers.iter().map(|t| &t.signal)
    }

    /// Payload of the triggering spike on `signal`, if it carried one.
    #[must_use]
    pub fn trigger_payload(&self, signal: &Signal) -> Option<&Value> {
        self.triggers
            .iter()
            .find(|t| &t.signal == signal)
            .and_then(|t| t.payload.as_ref())
    }

    /// A configuration value of the state's module.
    #[must_use]
    pub fn config(&self, key: &str) -> Option<Value> {
        self.shared.lock().config_value(self.state.module(), key)
    }

    /// Whether the context has begun shutting down.
    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.shared.shutting_down()
    }
}
