//! Properties: module-owned value slots.

use arbiter_types::{PropertyEvent, QualifiedName, Signal};
use serde_json::Value;

use crate::error::{ContextError, PropertyAccess};

/// Declaration of a property.
///
/// Built unqualified with [`Property::new`]; [`crate::Module::property`]
/// places it under its module.
#[derive(Debug, Clone)]
pub struct Property {
    module: String,
    name: String,
    default_value: Value,
    allow_read: bool,
    allow_write: bool,
    allow_push: bool,
    allow_pop: bool,
    always_signal_changed: bool,
}

impl Property {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: String::new(),
            name: name.into(),
            default_value: Value::Null,
            allow_read: true,
            allow_write: true,
            allow_push: true,
            allow_pop: true,
            always_signal_changed: false,
        }
    }

    #[must_use]
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    #[must_use]
    pub fn allow_read(mut self, allow: bool) -> Self {
        self.allow_read = allow;
        self
    }

    #[must_use]
    pub fn allow_write(mut self, allow: bool) -> Self {
        self.allow_write = allow;
        self
    }

    #[must_use]
    pub fn allow_push(mut self, allow: bool) -> Self {
        self.allow_push = allow;
        self
    }

    #[must_use]
    pub fn allow_pop(mut self, allow: bool) -> Self {
        self.allow_pop = allow;
        self
    }

    /// Emit `changed` on every write, even when the value is unchanged.
    #[must_use]
    pub fn always_signal_changed(mut self, always: bool) -> Self {
        self.always_signal_changed = always;
        self
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> QualifiedName {
        QualifiedName::new(self.module.clone(), self.name.clone())
    }

    #[must_use]
    pub fn changed_signal(&self) -> Signal {
        self.id().property_signal(PropertyEvent::Changed)
    }

    #[must_use]
    pub fn pushed_signal(&self) -> Signal {
        self.id().property_signal(PropertyEvent::Pushed)
    }

    #[must_use]
    pub fn popped_signal(&self) -> Signal {
        self.id().property_signal(PropertyEvent::Popped)
    }

    /// Signals a state writing this property may cause.
    pub(crate) fn write_signals(&self) -> Vec<Signal> {
        [
            (self.allow_write, PropertyEvent::Changed),
            (self.allow_push, PropertyEvent::Pushed),
            (self.allow_pop, PropertyEvent::Popped),
        ]
        .into_iter()
        .filter(|(allowed, _)| *allowed)
        .map(|(_, event)| self.id().property_signal(event))
        .collect()
    }

    fn permits(&self, access: PropertyAccess) -> bool {
        match access {
            PropertyAccess::Read => self.allow_read,
            PropertyAccess::Write => self.allow_write,
            PropertyAccess::Push => self.allow_push,
            PropertyAccess::Pop => self.allow_pop,
        }
    }
}

/// What a mutation did, so the caller can emit the matching signal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mutation {
    Unchanged,
    Changed(Value),
    Pushed(Value),
    Popped(Value),
}

/// A registered property and its runtime value.
#[derive(Debug, Clone)]
pub(crate) struct PropertySlot {
    decl: Property,
    value: Value,
    children: Vec<Value>,
}

impl PropertySlot {
    pub(crate) fn new(decl: Property) -> Self {
        Self {
            value: decl.default_value.clone(),
            decl,
            children: Vec::new(),
        }
    }

    pub(crate) fn decl(&self) -> &Property {
        &self.decl
    }

    fn check(&self, access: PropertyAccess) -> Result<(), ContextError> {
        if self.decl.permits(access) {
            Ok(())
        } else {
            Err(ContextError::AccessDenied {
                property: self.decl.id(),
                access,
            })
        }
    }

    pub(crate) fn read(&self) -> Result<Value, ContextError> {
        self.check(PropertyAccess::Read)?;
        Ok(self.value.clone())
    }

    pub(crate) fn children(&self) -> &[Value] {
        &self.children
    }

    pub(crate) fn write(&mut self, value: Value) -> Result<Mutation, ContextError> {
        self.check(PropertyAccess::Write)?;
        let changed = self.value != value;
        self.value = value;
        if changed || self.decl.always_signal_changed {
            Ok(Mutation::Changed(self.value.clone()))
        } else {
            Ok(Mutation::Unchanged)
        }
    }

    pub(crate) fn push(&mut self, child: Value) -> Result<Mutation, ContextError> {
        self.check(PropertyAccess::Push)?;
        self.children.push(child.clone());
        Ok(Mutation::Pushed(child))
    }

    pub(crate) fn pop(&mut self) -> Result<Mutation, ContextError> {
        self.check(PropertyAccess::Pop)?;
        self.children
            .pop()
            .map(Mutation::Popped)
            .ok_or_else(|| ContextError::EmptyPop(self.decl.id()))
    }
}
