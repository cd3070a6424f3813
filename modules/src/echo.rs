//! Writes every line of raw input back to raw output.

use arbiter_core::{ContextError, Module, State, StateContext};
use serde_json::Value;

use crate::rawio;

pub const NAME: &str = "echo";

/// Configuration key: text placed in front of every echoed line.
pub const PREFIX: &str = "prefix";

fn echo(ctx: &mut StateContext<'_>) -> Result<(), ContextError> {
    let input = ctx.get(&rawio::input())?;
    let line = match &input {
        Value::String(line) => line.as_str(),
        Value::Null => "",
        other => {
            tracing::debug!(value = %other, "Ignoring non-text input");
            return Ok(());
        }
    };
    let prefix = ctx
        .config(PREFIX)
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default();
    ctx.set(&rawio::output(), format!("{prefix}{line}"))?;
    ctx.emit()?;
    Ok(())
}

#[must_use]
pub fn declare() -> Module {
    Module::new(NAME).depends_on(rawio::NAME).config(PREFIX, "").state(
        State::new("echoed", echo)
            .read(rawio::input())
            .write(rawio::output())
            .emits(),
    )
}
