//! States: named units of behaviour gated by a constraint.

use std::fmt;
use std::sync::Arc;

use arbiter_types::{PropertyEvent, QualifiedName, Signal};

use crate::constraint::Constraint;
use crate::error::ContextError;
use crate::handler::StateContext;

/// A state's behaviour. Runs on the context loop, outside the registry lock.
pub type Handler = Arc<dyn Fn(&mut StateContext<'_>) -> Result<(), ContextError> + Send + Sync>;

/// Declaration of a state.
#[derive(Clone)]
pub struct State {
    module: String,
    name: String,
    constraint: Option<Constraint>,
    read: Vec<QualifiedName>,
    write: Vec<QualifiedName>,
    emits_own: bool,
    signals: Vec<Signal>,
    handler: Handler,
}

impl State {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut StateContext<'_>) -> Result<(), ContextError> + Send + Sync + 'static,
    {
        Self {
            module: String::new(),
            name: name.into(),
            constraint: None,
            read: Vec::new(),
            write: Vec::new(),
            emits_own: false,
            signals: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    #[must_use]
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    #[must_use]
    pub fn cond(mut self, constraint: impl Into<Constraint>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    #[must_use]
    pub fn read(mut self, property: QualifiedName) -> Self {
        if !self.read.contains(&property) {
            self.read.push(property);
        }
        self
    }

    #[must_use]
    pub fn write(mut self, property: QualifiedName) -> Self {
        if !self.write.contains(&property) {
            self.write.push(property);
        }
        self
    }

    /// Declare that this state emits its own signal, `module:name`.
    #[must_use]
    pub fn emits(mut self) -> Self {
        self.emits_own = true;
        self
    }

    /// Declare an additional signal this state may emit.
    #[must_use]
    pub fn emit_signal(mut self, signal: Signal) -> Self {
        if !self.signals.contains(&signal) {
            self.signals.push(signal);
        }
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

    /// The signal this state represents, if it declared one.
    #[must_use]
    pub fn signal(&self) -> Option<Signal> {
        self.emits_own
            .then(|| Signal::new(self.module.clone(), self.name.clone()))
    }

    /// Every signal this state may emit; these are the signals it causes.
    #[must_use]
    pub fn emittable(&self) -> Vec<Signal> {
        self.signal()
            .into_iter()
            .chain(self.signals.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn may_emit(&self, signal: &Signal) -> bool {
        self.signals.contains(signal)
            || (self.emits_own && signal.module() == self.module && signal.name() == self.name)
    }

    #[must_use]
    pub fn reads(&self) -> &[QualifiedName] {
        &self.read
    }

    #[must_use]
    pub fn writes(&self) -> &[QualifiedName] {
        &self.write
    }

    #[must_use]
    pub fn references_property(&self, property: &QualifiedName) -> bool {
        self.read.contains(property) || self.write.contains(property)
    }

    /// The declared constraint, or "any read property changed".
    #[must_use]
    pub fn effective_constraint(&self) -> Option<Constraint> {
        if let Some(constraint) = &self.constraint {
            return Some(constraint.clone());
        }
        let mut changed = self
            .read
            .iter()
            .map(|prop| Constraint::from(prop.property_signal(PropertyEvent::Changed)));
        let first = changed.next()?;
        Some(changed.fold(first, |acc, next| acc | next))
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id())
            .field("constraint", &self.constraint)
            .field("read", &self.read)
            .field("write", &self.write)
            .field("emits_own", &self.emits_own)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}
