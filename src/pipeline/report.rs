//! Run report and per-pair state tracking
//!
//! Every (input, variant) pair is a `WorkUnit` moving through a small state
//! machine:
//!
//! ```text
//! PENDING -> LOADED -> PROCESSED -> WRITTEN
//!    |          |          |
//!    |          +----------+-----> FAILED
//!    +--> LOAD_FAILED
//!    +--> FAILED   (variant chain rejected before any audio I/O)
//! ```
//!
//! Finished units become `UnitOutcome`s collected in the `RunReport`.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

// ============================================================================
// Unit state machine
// ============================================================================

/// Lifecycle state of one (input, variant) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    Pending,
    Loaded,
    Processed,
    Written,
    Failed,
    LoadFailed,
}

impl UnitState {
    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitState::Written | UnitState::Failed | UnitState::LoadFailed
        )
    }

    /// Check if moving to `next` is legal
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Pending, Loaded)
                | (Pending, LoadFailed)
                | (Pending, Failed)
                | (Loaded, Processed)
                | (Loaded, Failed)
                | (Processed, Written)
                | (Processed, Failed)
        )
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Pending => "PENDING",
            UnitState::Loaded => "LOADED",
            UnitState::Processed => "PROCESSED",
            UnitState::Written => "WRITTEN",
            UnitState::Failed => "FAILED",
            UnitState::LoadFailed => "LOAD_FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Attempted move between two states that are not connected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal unit transition {from} -> {to}")]
pub struct TransitionError {
    pub from: UnitState,
    pub to: UnitState,
}

/// Mutable record of one pair while it is being processed
#[derive(Debug)]
pub struct WorkUnit {
    input: PathBuf,
    variant: String,
    state: UnitState,
    outputs: Vec<WrittenFile>,
    error: Option<UnitError>,
}

impl WorkUnit {
    pub fn new(input: impl Into<PathBuf>, variant: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            variant: variant.into(),
            state: UnitState::Pending,
            outputs: Vec::new(),
            error: None,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Move to `next` if the state machine allows it
    pub fn transition(&mut self, next: UnitState) -> std::result::Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record a failure and move to the matching failure state
    ///
    /// A unit still `PENDING` that fails on load goes to `LOAD_FAILED`;
    /// anything else goes to `FAILED`.
    pub fn fail(&mut self, error: &PipelineError, on_load: bool) {
        let next = if on_load && self.state == UnitState::Pending {
            UnitState::LoadFailed
        } else {
            UnitState::Failed
        };
        // Terminal states never move again; keep the first recorded failure.
        if self.state.can_transition_to(next) {
            self.state = next;
            self.error = Some(UnitError::from(error));
        }
    }

    /// Attach a file written for this unit
    pub fn record_output(&mut self, file: WrittenFile) {
        self.outputs.push(file);
    }

    /// Paths written so far, for cleanup after a late failure
    pub fn output_paths(&self) -> impl Iterator<Item = &Path> {
        self.outputs.iter().map(|f| f.path.as_path())
    }

    /// Drop recorded outputs (after they were removed from disk)
    pub fn clear_outputs(&mut self) {
        self.outputs.clear();
    }

    /// Freeze the unit into its report entry
    pub fn finish(self) -> UnitOutcome {
        UnitOutcome {
            input: self.input,
            variant: self.variant,
            state: self.state,
            outputs: self.outputs,
            error: self.error,
        }
    }
}

// ============================================================================
// Report entries
// ============================================================================

/// A file produced for a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub format: String,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
    pub bytes: u64,
    /// Duration of the written audio
    pub duration_ms: f64,
}

impl WrittenFile {
    /// Describe a file already on disk
    pub fn from_disk(path: &Path, format: &str, duration_ms: f64) -> Result<Self> {
        let bytes = fs::metadata(path)
            .map_err(|e| PipelineError::Io {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            format: format.to_string(),
            sha256: file_checksum(path)?,
            bytes,
            duration_ms,
        })
    }
}

/// Calculate SHA-256 checksum of a file
pub fn file_checksum(path: &Path) -> Result<String> {
    let io_err = |e| PipelineError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = fs::File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(io_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Why a pair did not produce its outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl From<&PipelineError> for UnitError {
    fn from(error: &PipelineError) -> Self {
        let position = match error {
            PipelineError::ChainExecution { position, .. } => Some(*position),
            _ => None,
        };

        Self {
            code: error.root_cause().error_code().to_string(),
            message: error.to_string(),
            effect: error.failing_effect().map(str::to_string),
            position,
        }
    }
}

/// Final record of one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub input: PathBuf,
    pub variant: String,
    pub state: UnitState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<WrittenFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
}

impl UnitOutcome {
    pub fn is_written(&self) -> bool {
        self.state == UnitState::Written
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, UnitState::Failed | UnitState::LoadFailed)
    }
}

// ============================================================================
// Run report
// ============================================================================

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// One entry per (input, variant) pair, in input then variant order
    pub units: Vec<UnitOutcome>,
}

impl RunReport {
    /// Start an empty report stamped with a fresh run id
    pub fn begin() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            units: Vec::new(),
        }
    }

    /// Pairs whose outputs were all written
    pub fn written(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.units.iter().filter(|u| u.is_written())
    }

    /// Pairs that ended in `FAILED` or `LOAD_FAILED`
    pub fn failed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.units.iter().filter(|u| u.is_failed())
    }

    /// Look up the outcome of a pair
    pub fn unit(&self, input: &Path, variant: &str) -> Option<&UnitOutcome> {
        self.units
            .iter()
            .find(|u| u.input == input && u.variant == variant)
    }

    pub fn summary(&self) -> RunSummary {
        let count = |state: UnitState| self.units.iter().filter(|u| u.state == state).count();

        RunSummary {
            total: self.units.len(),
            written: count(UnitState::Written),
            failed: count(UnitState::Failed),
            load_failed: count(UnitState::LoadFailed),
            files: self.units.iter().map(|u| u.outputs.len()).sum(),
            elapsed_ms: self.elapsed_ms,
        }
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })?;

        fs::write(path, json).map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Counts of written versus failed pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub written: usize,
    pub failed: usize,
    pub load_failed: usize,
    pub files: usize,
    pub elapsed_ms: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} pair(s) written ({} file(s)), {} failed, {} failed to load in {} ms",
            self.written, self.total, self.files, self.failed, self.load_failed, self.elapsed_ms
        )
    }
}
