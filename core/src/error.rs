//! Errors raised by the context and by state handlers.

use std::{fmt, io};

use arbiter_types::{NameParseError, QualifiedName, Signal, SpikeId};
use thiserror::Error;

/// The kind of access a caller attempted on a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyAccess {
    Read,
    Write,
    Push,
    Pop,
}

impl PropertyAccess {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Push => "push",
            Self::Pop => "pop",
        }
    }
}

impl fmt::Display for PropertyAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("unknown module `{name}`")]
    UnknownModule { name: String },
    #[error("unknown property `{name}`")]
    UnknownProperty { name: String },
    #[error("unknown state `{0}`")]
    UnknownState(QualifiedName),
    #[error("state `{0}` has no constraint and reads no properties")]
    EmptyConstraint(QualifiedName),
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameParseError),
    #[error("{parent} cannot adopt {child}: adoption would form a cycle")]
    InvalidAdoption { parent: SpikeId, child: SpikeId },
    #[error("unknown or expired spike {0}")]
    UnknownSpike(SpikeId),
    #[error("state `{state}` is not allowed to {access} property `{property}`")]
    UnauthorizedAccess {
        state: QualifiedName,
        property: QualifiedName,
        access: PropertyAccess,
    },
    #[error("state `{state}` is not allowed to emit `{signal}`")]
    UnauthorizedSignal { state: QualifiedName, signal: Signal },
    #[error("property `{property}` does not permit {access}")]
    AccessDenied {
        property: QualifiedName,
        access: PropertyAccess,
    },
    #[error("property `{0}` has no children to pop")]
    EmptyPop(QualifiedName),
    #[error("context is already running")]
    AlreadyRunning,
    #[error("context is not running")]
    NotRunning,
    #[error("failed to spawn the context loop: {0}")]
    Spawn(#[source] io::Error),
    #[error("{0}")]
    Handler(String),
}

impl ContextError {
    /// Convenience for handlers reporting their own failures.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}
