//! Arbiter CLI - hosts a context on the terminal.
//!
//! ```text
//! stdin line ──► rawio:in ──► (modules) ──► rawio:out ──► console ──► stdout
//! ```
//!
//! Runs until stdin closes or Ctrl-C, then shuts the context down.

mod args;
mod console;

use anyhow::{Context as _, Result, bail};
use std::{
    env,
    fs::{self, File, OpenOptions},
    io,
    path::PathBuf,
    sync::Mutex,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use arbiter_config::ArbiterConfig;
use arbiter_core::{Context, ContextBuilder};
use arbiter_modules::rawio;

use crate::args::Args;

/// Passes made after stdin closes so the last line's effects reach stdout.
const DRAIN_PASSES: usize = 16;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout carries module output, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.arbiter/logs/arbiter.log
    if let Some(home) = arbiter_config::arbiter_home() {
        candidates.push(home.join("logs").join("arbiter.log"));
    }

    // Fallback: ./.arbiter/logs/arbiter.log
    candidates.push(PathBuf::from(".arbiter").join("logs").join("arbiter.log"));

    candidates
}

fn load_config(args: &Args) -> Result<ArbiterConfig> {
    if let Some(path) = &args.config {
        return ArbiterConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    match ArbiterConfig::load() {
        Ok(Some(config)) => {
            tracing::info!(path = ?ArbiterConfig::path(), "Loaded configuration");
            Ok(config)
        }
        Ok(None) => Ok(ArbiterConfig::default()),
        Err(err) => {
            tracing::warn!(path = ?ArbiterConfig::path(), error = %err, "Continuing with default configuration");
            Ok(ArbiterConfig::default())
        }
    }
}

fn build_context(args: &Args, config: &ArbiterConfig) -> Result<Context> {
    let catalog = arbiter_modules::catalog();
    if let Some(unknown) = args.modules.iter().find(|module| !catalog.contains(module)) {
        let available: Vec<&str> = catalog.names().collect();
        bail!("unknown module `{unknown}` (available: {})", available.join(", "));
    }
    let ctx = ContextBuilder::from_config(config)
        .context("invalid module configuration")?
        .catalog(catalog)
        .build();

    for module in &args.modules {
        ctx.add_module(module)
            .with_context(|| format!("failed to add module `{module}`"))?;
    }
    if !ctx.has_module(rawio::NAME) {
        ctx.add_module(rawio::NAME)?;
    }
    ctx.register_module(console::declare());
    Ok(ctx)
}

/// Let the loop settle once no more input will arrive.
fn drain(ctx: &Context) {
    for _ in 0..DRAIN_PASSES {
        if ctx.tick().is_idle() {
            break;
        }
    }
}

async fn bridge_stdin(ctx: &Context) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    tracing::info!("Input closed");
                    drain(ctx);
                    return Ok(());
                };
                ctx.set(&rawio::input(), line)?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::parse(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{}", args::USAGE);
            return Ok(());
        }
        Err(err) => bail!("{err}\n\n{}", args::USAGE),
    };

    init_tracing();

    let config = load_config(&args)?;
    let ctx = build_context(&args, &config)?;
    ctx.run()?;

    let bridged = bridge_stdin(&ctx).await;
    ctx.shutdown()?;
    bridged
}
