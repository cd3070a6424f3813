//! Command-line arguments.

use std::path::PathBuf;

use thiserror::Error;

pub const USAGE: &str = "\
Usage: arbiter [--config PATH] [MODULE...]

Runs the named modules (default: rawio echo), feeding each stdin line to
rawio:in and printing every rawio:out change.

Options:
  -c, --config PATH   Read configuration from PATH instead of ~/.arbiter/config.toml
  -h, --help          Print this help";

const DEFAULT_MODULES: [&str; 2] = ["rawio", "echo"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("`{0}` expects a value")]
    MissingValue(String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub modules: Vec<String>,
}

impl Args {
    /// `Ok(None)` when help was requested.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut config = None;
        let mut modules = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "-c" | "--config" => {
                    let path = args.next().ok_or(ArgsError::MissingValue(arg))?;
                    config = Some(PathBuf::from(path));
                }
                other if other.starts_with("--config=") => {
                    config = Some(PathBuf::from(&other["--config=".len()..]));
                }
                other if other.starts_with('-') => {
                    return Err(ArgsError::UnknownOption(other.to_string()));
                }
                _ => {
                    if !modules.contains(&arg) {
                        modules.push(arg);
                    }
                }
            }
        }

        if modules.is_empty() {
            modules = DEFAULT_MODULES.iter().map(ToString::to_string).collect();
        }
        Ok(Some(Self { config, modules }))
    }
}
