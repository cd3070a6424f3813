//! Raw text input and output.

use arbiter_core::{Module, Property, QualifiedName};

pub const NAME: &str = "rawio";

#[must_use]
pub fn input() -> QualifiedName {
    QualifiedName::new(NAME, "in")
}

#[must_use]
pub fn output() -> QualifiedName {
    QualifiedName::new(NAME, "out")
}

fn text(name: &str) -> Property {
    Property::new(name)
        .default_value("")
        .allow_push(false)
        .allow_pop(false)
        .always_signal_changed(true)
}

#[must_use]
pub fn declare() -> Module {
    Module::new(NAME).property(text("in")).property(text("out"))
}
