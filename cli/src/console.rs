//! Prints raw output to the terminal.

use std::io::{Write, stdout};

use arbiter_core::{ContextError, Module, State, StateContext};
use arbiter_modules::rawio;
use serde_json::Value;

pub const NAME: &str = "console";

fn print_output(ctx: &mut StateContext<'_>) -> Result<(), ContextError> {
    let line = match ctx.get(&rawio::output())? {
        Value::String(line) => line,
        other => other.to_string(),
    };
    let mut out = stdout().lock();
    writeln!(out, "{line}")
        .and_then(|()| out.flush())
        .map_err(|e| ContextError::handler(format!("failed to write output: {e}")))
}

pub fn declare() -> Module {
    Module::new(NAME)
        .depends_on(rawio::NAME)
        .state(State::new("print", print_output).read(rawio::output()))
}
