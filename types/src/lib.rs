//! Core domain types for Arbiter.
//!
//! This crate contains pure domain types with no IO, no threads, and minimal
//! dependencies: identifiers, signals, qualified names and age bounds.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod age;
mod ids;
mod signal;

pub use age::{Age, AgeWindow, DEFAULT_MAX_AGE, DEFAULT_MIN_AGE};
pub use ids::{ActivationId, SpikeId, StateId};
pub use signal::{NameParseError, PropertyEvent, QualifiedName, Signal};
