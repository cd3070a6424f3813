//! Constraints over signals.
//!
//! A [`Constraint`] is an immutable expression tree of conjunctions and
//! disjunctions whose leaves reference signals with optional age bounds.
//! Registration normalizes it into disjunctive normal form: a list of
//! [`Conjunction`]s with every age bound resolved to a number.

use std::collections::BTreeSet;
use std::ops::{BitAnd, BitOr};

use arbiter_config::{Configuration, ContextSettings};
use arbiter_types::{Age, AgeWindow, Signal};

/// A reference to a signal inside a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRef {
    signal: Signal,
    min_age: Option<Age>,
    max_age: Option<Age>,
}

/// Shorthand for referencing a signal with the default age window.
#[must_use]
pub fn s(signal: Signal) -> SignalRef {
    SignalRef::new(signal)
}

impl SignalRef {
    #[must_use]
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            min_age: None,
            max_age: None,
        }
    }

    #[must_use]
    pub fn min_age(mut self, age: impl Into<Age>) -> Self {
        self.min_age = Some(age.into());
        self
    }

    #[must_use]
    pub fn max_age(mut self, age: impl Into<Age>) -> Self {
        self.max_age = Some(age.into());
        self
    }

    #[must_use]
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    fn resolve(
        &self,
        module: &str,
        configuration: &Configuration,
        settings: &ContextSettings,
    ) -> Leaf {
        let min = resolve_age(
            self.min_age.as_ref(),
            settings.default_min_age,
            module,
            configuration,
        );
        let max = resolve_age(
            self.max_age.as_ref(),
            settings.default_max_age,
            module,
            configuration,
        );
        Leaf {
            signal: self.signal.clone(),
            window: AgeWindow::new(min, max),
        }
    }
}

fn resolve_age(
    age: Option<&Age>,
    fallback: f64,
    module: &str,
    configuration: &Configuration,
) -> f64 {
    match age {
        None => fallback,
        Some(Age::Literal(value)) => *value,
        Some(Age::Config { key }) => configuration.get_f64(module, key).unwrap_or_else(|| {
            tracing::warn!(
                module,
                key = %key,
                fallback,
                "Configurable age not found in module config, using default"
            );
            fallback
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Signal(SignalRef),
    /// Every branch must hold.
    All(Vec<Constraint>),
    /// At least one branch must hold.
    Any(Vec<Constraint>),
}

impl Constraint {
    /// Every signal referenced anywhere in the tree.
    #[must_use]
    pub fn signals(&self) -> BTreeSet<&Signal> {
        let mut out = BTreeSet::new();
        self.collect_signals(&mut out);
        out
    }

    fn collect_signals<'a>(&'a self, out: &mut BTreeSet<&'a Signal>) {
        match self {
            Constraint::Signal(leaf) => {
                out.insert(&leaf.signal);
            }
            Constraint::All(parts) | Constraint::Any(parts) => {
                for part in parts {
                    part.collect_signals(out);
                }
            }
        }
    }

    /// Disjunctive normal form over unresolved leaves.
    fn dnf(&self) -> Vec<Vec<&SignalRef>> {
        match self {
            Constraint::Signal(leaf) => vec![vec![leaf]],
            Constraint::Any(parts) => parts.iter().flat_map(Constraint::dnf).collect(),
            Constraint::All(parts) => parts.iter().fold(vec![Vec::new()], |acc, part| {
                let part_dnf = part.dnf();
                let mut product = Vec::with_capacity(acc.len() * part_dnf.len());
                for left in &acc {
                    for right in &part_dnf {
                        let mut merged = left.clone();
                        merged.extend(right.iter().copied());
                        product.push(merged);
                    }
                }
                product
            }),
        }
    }

    /// Normalize and resolve age bounds against `module`'s configuration.
    /// Empty conjunctions are dropped.
    #[must_use]
    pub fn conjunctions(
        &self,
        module: &str,
        configuration: &Configuration,
        settings: &ContextSettings,
    ) -> Vec<Conjunction> {
        let mut out: Vec<Conjunction> = Vec::new();
        for refs in self.dnf() {
            if refs.is_empty() {
                continue;
            }
            let conjunction = Conjunction::new(
                refs.into_iter()
                    .map(|leaf| leaf.resolve(module, configuration, settings)),
            );
            if !out.contains(&conjunction) {
                out.push(conjunction);
            }
        }
        out
    }
}

impl From<SignalRef> for Constraint {
    fn from(value: SignalRef) -> Self {
        Constraint::Signal(value)
    }
}

impl From<Signal> for Constraint {
    fn from(value: Signal) -> Self {
        Constraint::Signal(SignalRef::new(value))
    }
}

impl<R: Into<Constraint>> BitAnd<R> for Constraint {
    type Output = Constraint;

    fn bitand(self, rhs: R) -> Constraint {
        let rhs = rhs.into();
        match (self, rhs) {
            (Constraint::All(mut left), Constraint::All(right)) => {
                left.extend(right);
                Constraint::All(left)
            }
            (Constraint::All(mut left), right) => {
                left.push(right);
                Constraint::All(left)
            }
            (left, right) => Constraint::All(vec![left, right]),
        }
    }
}

impl<R: Into<Constraint>> BitOr<R> for Constraint {
    type Output = Constraint;

    fn bitor(self, rhs: R) -> Constraint {
        let rhs = rhs.into();
        match (self, rhs) {
            (Constraint::Any(mut left), Constraint::Any(right)) => {
                left.extend(right);
                Constraint::Any(left)
            }
            (Constraint::Any(mut left), right) => {
                left.push(right);
                Constraint::Any(left)
            }
            (left, right) => Constraint::Any(vec![left, right]),
        }
    }
}

impl<R: Into<Constraint>> BitAnd<R> for SignalRef {
    type Output = Constraint;

    fn bitand(self, rhs: R) -> Constraint {
        Constraint::from(self) & rhs
    }
}

impl<R: Into<Constraint>> BitOr<R> for SignalRef {
    type Output = Constraint;

    fn bitor(self, rhs: R) -> Constraint {
        Constraint::from(self) | rhs
    }
}

/// A resolved signal requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    signal: Signal,
    window: AgeWindow,
}

impl Leaf {
    #[must_use]
    pub fn new(signal: Signal, window: AgeWindow) -> Self {
        Self { signal, window }
    }

    #[must_use]
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    #[must_use]
    pub fn window(&self) -> AgeWindow {
        self.window
    }
}

/// One branch of a normalized constraint: every leaf must be satisfied.
///
/// A completed conjunction is an original one extended with the
/// conjunctions of the states that cause its signals.
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunction {
    leaves: Vec<Leaf>,
    completed: bool,
}

impl Conjunction {
    /// Leaves on the same signal merge into their narrowest window.
    pub fn new(leaves: impl IntoIterator<Item = Leaf>) -> Self {
        let mut merged: Vec<Leaf> = Vec::new();
        for leaf in leaves {
            match merged.iter_mut().find(|known| known.signal == leaf.signal) {
                Some(known) => known.window = known.window.intersect(leaf.window),
                None => merged.push(leaf),
            }
        }
        Self {
            leaves: merged,
            completed: false,
        }
    }

    #[must_use]
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.leaves.iter().map(|leaf| &leaf.signal)
    }

    #[must_use]
    pub fn contains(&self, signal: &Signal) -> bool {
        self.leaves.iter().any(|leaf| &leaf.signal == signal)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Add the leaves of `cause` this conjunction lacks. Returns the signals
    /// that were actually added.
    pub(crate) fn absorb(&mut self, cause: &Conjunction) -> Vec<Signal> {
        let mut added = Vec::new();
        for leaf in &cause.leaves {
            if !self.contains(&leaf.signal) {
                self.leaves.push(leaf.clone());
                added.push(leaf.signal.clone());
            }
        }
        if !added.is_empty() {
            self.completed = true;
        }
        added
    }

    /// Same leaf set, regardless of order.
    pub(crate) fn same_leaves(&self, other: &Conjunction) -> bool {
        self.len() == other.len() && other.leaves.iter().all(|leaf| self.leaves.contains(leaf))
    }
}
