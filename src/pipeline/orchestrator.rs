//! Variant Orchestrator
//!
//! Expands the configuration into (input, variant) work units, runs them on
//! a pool of scoped worker threads, and collects one outcome per unit.
//! A failing unit never stops the others. Combined sources are rendered once,
//! before the pool starts, and shared by all of their variants.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::dsp::{ChainExecutor, CompiledChain};
use crate::engine::{AudioBuffer, AudioCodec, FfmpegCodec};
use crate::error::{PipelineError, Result};
use crate::pipeline::config::{PipelineConfig, Variant};
use crate::pipeline::inputs::{path_identity, resolve_inputs, Source};
use crate::pipeline::report::{RunReport, UnitOutcome, UnitState, WorkUnit, WrittenFile};

/// One (input, variant) pair and the files it should produce
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Position in the report
    pub index: usize,
    /// Index into [`RunPlan::sources`]
    pub source: usize,
    pub variant: usize,
    /// (format, destination) per configured output format
    pub outputs: Vec<(String, PathBuf)>,
}

/// Every unit of work for a run, in input then variant order
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub sources: Vec<Source>,
    pub jobs: Vec<Job>,
}

/// Destination of one output: `<output_dir>/<stem>_<variant>.<format>`
pub fn output_path(output_dir: &Path, stem: &str, variant: &str, format: &str) -> PathBuf {
    output_dir.join(format!("{}_{}.{}", stem, variant, format))
}

/// Scratch name an output is written under before being moved into place
fn partial_path(destination: &Path, format: &str) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.partial.{}", stem, format))
}

/// Drives a run over a codec and a chain executor
pub struct Orchestrator<'a> {
    codec: &'a dyn AudioCodec,
    executor: ChainExecutor<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(codec: &'a dyn AudioCodec, executor: ChainExecutor<'a>) -> Self {
        Self { codec, executor }
    }

    /// Resolve inputs and derive every output path
    ///
    /// Creates the output directory.
    ///
    /// # Errors
    /// `Config` if no input matched, two units would write the same file, or
    /// an output would overwrite one of the inputs
    pub fn plan(&self, config: &PipelineConfig) -> Result<RunPlan> {
        let sources = resolve_inputs(&config.inputs, &config.input_dir, &config.output_dir)?;

        let read: HashSet<PathBuf> = sources
            .iter()
            .flat_map(|source| source.files())
            .map(path_identity)
            .collect();
        let mut claimed: HashMap<PathBuf, (String, String)> = HashMap::new();
        let mut jobs = Vec::with_capacity(sources.len() * config.variants.len());

        for (source_index, source) in sources.iter().enumerate() {
            let stem = source.stem();

            for (variant_index, variant) in config.variants.iter().enumerate() {
                let mut outputs = Vec::with_capacity(config.output_formats.len());

                for format in &config.output_formats {
                    let path = output_path(&config.output_dir, &stem, &variant.name, format);
                    if read.contains(&path_identity(&path)) {
                        return Err(PipelineError::config(format!(
                            "output {} of ({}, {}) would overwrite an input file",
                            path.display(),
                            source,
                            variant.name
                        )));
                    }
                    if let Some((other_source, other_variant)) =
                        claimed.insert(path.clone(), (source.to_string(), variant.name.clone()))
                    {
                        return Err(PipelineError::config(format!(
                            "output {} would be written by both ({}, {}) and ({}, {})",
                            path.display(),
                            other_source,
                            other_variant,
                            source,
                            variant.name
                        )));
                    }
                    outputs.push((format.clone(), path));
                }

                jobs.push(Job {
                    index: jobs.len(),
                    source: source_index,
                    variant: variant_index,
                    outputs,
                });
            }
        }

        fs::create_dir_all(&config.output_dir).map_err(|e| PipelineError::Io {
            path: config.output_dir.clone(),
            source: e,
        })?;

        Ok(RunPlan { sources, jobs })
    }

    /// Render every combined source; plain files are loaded per unit
    fn prepare(&self, sources: &[Source]) -> Vec<Option<Result<AudioBuffer>>> {
        sources
            .iter()
            .map(|source| match source {
                Source::File(_) => None,
                Source::Combined(combined) => {
                    let built = combined.build(self.codec);
                    if let Err(e) = &built {
                        warn!("Combined source '{}' could not be built: {}", combined.name, e);
                    }
                    Some(built)
                }
            })
            .collect()
    }

    /// Run every (input, variant) pair
    ///
    /// # Returns
    /// The run report, with units in input then variant order
    ///
    /// # Errors
    /// Only run-level problems (see [`Orchestrator::plan`]); per-pair failures
    /// are recorded in the report
    pub fn run(&self, config: &PipelineConfig) -> Result<RunReport> {
        let timer = Instant::now();
        let mut report = RunReport::begin();

        let plan = self.plan(config)?;
        let workers = config.workers.clamp(1, plan.jobs.len().max(1));

        info!(
            "Run {}: {} input(s) x {} variant(s) = {} unit(s) on {} worker(s)",
            report.run_id,
            plan.sources.len(),
            config.variants.len(),
            plan.jobs.len(),
            workers
        );

        let prepared = self.prepare(&plan.sources);
        let run = Prepared {
            plan: &plan,
            buffers: &prepared,
            config,
        };

        let mut outcomes: Vec<(usize, UnitOutcome)> = if workers == 1 {
            plan.jobs
                .iter()
                .map(|job| (job.index, self.process(job, &run)))
                .collect()
        } else {
            self.run_parallel(&run, workers)
        };

        outcomes.sort_by_key(|(index, _)| *index);
        report.units = outcomes.into_iter().map(|(_, outcome)| outcome).collect();
        report.elapsed_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!("Run {} finished: {}", report.run_id, report.summary());
        Ok(report)
    }

    fn run_parallel(&self, run: &Prepared<'_>, workers: usize) -> Vec<(usize, UnitOutcome)> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<&Job>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, UnitOutcome)>();

        for job in &run.plan.jobs {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);

        thread::scope(|scope| {
            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for job in job_rx.iter() {
                        debug!("worker {} picked unit {}", worker, job.index);
                        let outcome = self.process(job, run);
                        if result_tx.send((job.index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        result_rx.iter().collect()
    }

    /// Run one pair to a terminal state
    fn process(&self, job: &Job, run: &Prepared<'_>) -> UnitOutcome {
        let source = &run.plan.sources[job.source];
        let variant = &run.config.variants[job.variant];
        let mut unit = WorkUnit::new(source.label(), &variant.name);

        let chain = match &variant.chain {
            Ok(chain) => chain,
            Err(e) => {
                warn!(
                    "Skipping {} / {}: variant chain is invalid: {}",
                    source, variant.name, e
                );
                unit.fail(e, false);
                return unit.finish();
            }
        };

        let prebuilt = match &run.buffers[job.source] {
            Some(Ok(buffer)) => Some(buffer),
            Some(Err(e)) => {
                unit.fail(e, true);
                return unit.finish();
            }
            None => None,
        };

        if let Err(e) = self.process_unit(&mut unit, job, source, prebuilt, variant, chain) {
            let on_load = unit.state() == UnitState::Pending;
            warn!(
                "Unit {} / {} failed in state {}: {}",
                source,
                variant.name,
                unit.state(),
                e
            );

            for path in unit.output_paths() {
                if let Err(remove_err) = fs::remove_file(path) {
                    warn!("Could not remove partial output {}: {}", path.display(), remove_err);
                }
            }
            unit.clear_outputs();
            unit.fail(&e, on_load);
        }

        unit.finish()
    }

    fn process_unit(
        &self,
        unit: &mut WorkUnit,
        job: &Job,
        source: &Source,
        prebuilt: Option<&AudioBuffer>,
        variant: &Variant,
        chain: &CompiledChain,
    ) -> Result<()> {
        let buffer = match (prebuilt, source) {
            (Some(buffer), _) => buffer.clone(),
            (None, Source::File(path)) => self.codec.load(path)?,
            (None, Source::Combined(combined)) => combined.build(self.codec)?,
        };
        unit.transition(UnitState::Loaded)?;
        debug!(
            "Loaded {} ({} ch, {} Hz, {:.0} ms)",
            source,
            buffer.channels(),
            buffer.sample_rate,
            buffer.duration_ms()
        );

        debug!("Applying '{}': {}", variant.name, chain);
        let processed = self.executor.run(buffer, chain)?;
        unit.transition(UnitState::Processed)?;

        for (format, destination) in &job.outputs {
            let written = self.write_output(&processed, format, destination)?;
            unit.record_output(written);
        }

        unit.transition(UnitState::Written)?;
        info!(
            "Wrote {} / {} ({} file(s))",
            source,
            variant.name,
            job.outputs.len()
        );
        Ok(())
    }

    /// Encode under a scratch name, then move the file into place
    fn write_output(
        &self,
        buffer: &AudioBuffer,
        format: &str,
        destination: &Path,
    ) -> Result<WrittenFile> {
        let partial = partial_path(destination, format);

        let result = self
            .codec
            .save(buffer, &partial)
            .and_then(|_| WrittenFile::from_disk(&partial, format, buffer.duration_ms()))
            .and_then(|mut written| {
                fs::rename(&partial, destination).map_err(|e| PipelineError::Io {
                    path: destination.to_path_buf(),
                    source: e,
                })?;
                written.path = destination.to_path_buf();
                Ok(written)
            });

        if result.is_err() && partial.exists() {
            if let Err(e) = fs::remove_file(&partial) {
                warn!("Could not remove {}: {}", partial.display(), e);
            }
        }

        result
    }
}

/// Shared, read-only state of a run handed to every worker
struct Prepared<'r> {
    plan: &'r RunPlan,
    /// Rendered combined sources, by source index
    buffers: &'r [Option<Result<AudioBuffer>>],
    config: &'r PipelineConfig,
}

/// Run a configuration with the file codecs it names
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunReport> {
    let codec = FfmpegCodec::new(&config.ffmpeg, config.export);
    Orchestrator::new(&codec, ChainExecutor::global()).run(config)
}
