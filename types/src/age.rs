//! Age bounds for signal references.
//!
//! An age is the time in seconds between a spike's creation and the moment
//! a constraint is evaluated. Bounds are either literal or looked up in the
//! owning module's configuration when the state is registered.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_AGE: f64 = 0.0;
pub const DEFAULT_MAX_AGE: f64 = 5.0;

/// An unresolved age bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Age {
    Literal(f64),
    /// Key into the owning module's configuration.
    Config { key: String },
}

impl Age {
    #[must_use]
    pub fn config(key: impl Into<String>) -> Self {
        Self::Config { key: key.into() }
    }
}

impl From<f64> for Age {
    fn from(value: f64) -> Self {
        Self::Literal(value)
    }
}

/// A resolved, inclusive `[min, max]` age window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeWindow {
    min: f64,
    max: f64,
}

impl AgeWindow {
    /// Negative bounds clamp to zero and an inverted window collapses onto `min`.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        let min = min.max(0.0);
        Self {
            min,
            max: max.max(min),
        }
    }

    #[must_use]
    pub const fn min(self) -> f64 {
        self.min
    }

    #[must_use]
    pub const fn max(self) -> f64 {
        self.max
    }

    #[must_use]
    pub fn contains(self, age: f64) -> bool {
        age >= self.min && age <= self.max
    }

    /// Whether a spike of this age can never satisfy the window again.
    #[must_use]
    pub fn expired(self, age: f64) -> bool {
        age > self.max
    }

    /// The tighter of two windows on the same signal.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self::new(self.min.max(other.min), self.max.min(other.max))
    }
}

impl Default for AgeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_AGE, DEFAULT_MAX_AGE)
    }
}
