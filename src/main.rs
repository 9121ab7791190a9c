//! Augmenta CLI - Config-Driven Audio Augmentation
//!
//! Runs a pipeline configuration and exits non-zero only when the
//! configuration cannot be used or the report cannot be written.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use augmenta::cli::{commands, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still wins over the flags
    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log_filter())).init();

    info!("Augmenta v{}", env!("CARGO_PKG_VERSION"));

    commands::run(&cli)
        .map_err(|e| {
            for hint in e.recovery_suggestions() {
                error!("hint: {}", hint);
            }
            e
        })
        .with_context(|| format!("pipeline run for {} failed", cli.config.display()))?;

    Ok(())
}
