//! CLI Module
//!
//! Command-line interface for the augmentation pipeline.

pub mod commands;

use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::DEFAULT_CONFIG_FILE;

/// Augmenta - apply configured effect chains to audio files
#[derive(Parser, Debug)]
#[command(name = "augmenta")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (YAML or JSON, by extension)
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Write the run report as JSON to this path
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Override the worker count from the configuration
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}
