//! Pipeline orchestration
//!
//! Configuration loading, input resolution (including combined sources), the
//! worker pool that runs every (input, variant) pair, and the run report it
//! produces.

pub mod config;
pub mod inputs;
pub mod orchestrator;
pub mod report;

pub use config::{
    default_workers, CombineMethod, CombinedSpec, ConfigFile, InputEntry, PipelineConfig, Variant,
    VariantSpec, DEFAULT_CONFIG_FILE,
};
pub use inputs::{path_identity, resolve_inputs, wildcard_match, CombinedSource, Source};
pub use orchestrator::{output_path, run_pipeline, Job, Orchestrator, RunPlan};
pub use report::{
    file_checksum, RunReport, RunSummary, TransitionError, UnitError, UnitOutcome, UnitState,
    WorkUnit, WrittenFile,
};
