//! Signal and qualified-name types.
//!
//! Everything addressable in a context lives under a module: properties,
//! states and the signals they produce are all written `module:name`.
//! Process-wide lifecycle signals use the empty module (`:startup`).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameParseError {
    #[error("name must not be empty")]
    Empty,
    #[error("`{0}` is missing the `module:` prefix")]
    MissingModule(String),
    #[error("`{0}` has an empty name after the module prefix")]
    EmptyName(String),
}

/// A `module:name` pair identifying a property or a state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    module: String,
    name: String,
}

impl QualifiedName {
    #[must_use]
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Parse `module:name`. The split happens at the first colon, so the
    /// name part may itself contain colons.
    pub fn parse(raw: &str) -> Result<Self, NameParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NameParseError::Empty);
        }
        let (module, name) = trimmed
            .split_once(':')
            .ok_or_else(|| NameParseError::MissingModule(trimmed.to_string()))?;
        if name.is_empty() {
            return Err(NameParseError::EmptyName(trimmed.to_string()));
        }
        Ok(Self::new(module, name))
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The signal derived from a lifecycle event on the property with this name.
    #[must_use]
    pub fn property_signal(&self, event: PropertyEvent) -> Signal {
        Signal::new(
            self.module.clone(),
            format!("{}:{}", self.name, event.as_str()),
        )
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = NameParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for QualifiedName {
    type Error = NameParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

/// Property lifecycle events that derive a signal automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyEvent {
    Changed,
    Pushed,
    Popped,
}

impl PropertyEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Pushed => "pushed",
            Self::Popped => "popped",
        }
    }
}

/// An event kind. Immutable; identity is `(module, name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signal {
    module: String,
    name: String,
}

impl Signal {
    const STARTUP: &'static str = "startup";
    const SHUTDOWN: &'static str = "shutdown";

    #[must_use]
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Parse `module:name`; `:startup` parses to the process-wide signal.
    pub fn parse(raw: &str) -> Result<Self, NameParseError> {
        let qualified = QualifiedName::parse(raw)?;
        Ok(Self::new(qualified.module, qualified.name))
    }

    /// Emitted once per successful `run()`.
    #[must_use]
    pub fn startup() -> Self {
        Self::new("", Self::STARTUP)
    }

    /// Emitted once per `shutdown()` of a running context.
    #[must_use]
    pub fn shutdown() -> Self {
        Self::new("", Self::SHUTDOWN)
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

impl TryFrom<String> for Signal {
    type Error = NameParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Signal {
    type Error = NameParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Signal> for String {
    fn from(value: Signal) -> Self {
        value.to_string()
    }
}
