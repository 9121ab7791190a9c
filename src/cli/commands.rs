//! CLI Command Implementations

use log::{info, warn};

use crate::cli::Cli;
use crate::error::Result;
use crate::pipeline::{run_pipeline, PipelineConfig, RunReport};

/// Load the configuration, run it, and write the report if asked.
///
/// # Errors
/// Configuration problems and a report that cannot be written. Per-pair
/// failures are only logged.
pub fn run(cli: &Cli) -> Result<RunReport> {
    info!("Loading configuration: {}", cli.config.display());
    let mut config = PipelineConfig::load(&cli.config)?;

    if let Some(workers) = cli.workers {
        config.workers = usize::from(workers);
    }

    let report = run_pipeline(&config)?;

    if let Some(path) = &cli.report {
        report.write_json(path)?;
        info!("Run report written to {}", path.display());
    }

    print_summary(&report);
    Ok(report)
}

/// Log failed pairs and the final tally
pub fn print_summary(report: &RunReport) {
    for unit in report.failed() {
        let reason = unit
            .error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or("unknown error");
        warn!(
            "{} / {}: {} ({})",
            unit.input.display(),
            unit.variant,
            unit.state,
            reason
        );
    }

    for unit in report.written() {
        for output in &unit.outputs {
            println!("{}", output.path.display());
        }
    }

    info!("{}", report.summary());
}
