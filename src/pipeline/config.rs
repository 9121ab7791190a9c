//! Pipeline Configuration
//!
//! The configuration document is YAML or JSON, chosen by file extension;
//! both share one schema. It is read once per run, validated, and then
//! treated as immutable. Effect chains are compiled here, before any
//! audio is touched, so a bad chain is known up front and only its own
//! variant is affected.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::dsp::{ChainSpec, CompiledChain, EffectRegistry};
use crate::engine::ExportFormat;
use crate::error::{PipelineError, Result};

/// Configuration file used when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Output directory used when the configuration does not name one
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// ffmpeg executable used when the configuration does not name one
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Source name for a mixdown declared with the flat top-level keys
pub const DEFAULT_COMBINED_NAME: &str = "result";

/// Variant created from a top-level `effects` list
pub const TOP_LEVEL_VARIANT: &str = "processed";

fn default_input_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_output_formats() -> Vec<String> {
    vec!["wav".to_string()]
}

fn default_bit_depth() -> u16 {
    ExportFormat::default().bit_depth
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from(DEFAULT_FFMPEG)
}

/// Number of workers used when the configuration does not say
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ============================================================================
// File schema
// ============================================================================

/// Configuration document as written on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Input files, directories, wildcard patterns, or combined sources
    #[serde(default)]
    pub inputs: Vec<InputEntry>,

    /// Base directory for relative inputs
    #[serde(default = "default_input_dir", alias = "input_folder")]
    pub input_dir: PathBuf,

    /// Directory receiving the derived files
    #[serde(default = "default_output_dir", alias = "output_folder")]
    pub output_dir: PathBuf,

    /// Extensions written for every (input, variant) pair
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<String>,

    /// WAV bit depth of written files
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u16,

    /// Worker pool size (defaults to available cores)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Path to the media-conversion executable
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Named effect chains
    #[serde(default)]
    pub variants: Vec<VariantSpec>,

    /// Chain for an extra variant named `processed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<ChainSpec>,

    // Flat mixdown keys: together they declare one combined source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mix_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concatenate_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_combine_method: Option<CombineMethod>,
    /// Older single-list form, combined with `combine_method`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combine_method: Option<CombineMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,

    /// Unrecognised keys, kept so they can be reported
    #[serde(flatten)]
    pub unknown_fields: BTreeMap<String, serde_json::Value>,
}

impl ConfigFile {
    /// The combined source declared by the flat top-level keys, if any
    pub fn top_level_source(&self) -> Option<CombinedSpec> {
        let name = self
            .output_name
            .clone()
            .unwrap_or_else(|| DEFAULT_COMBINED_NAME.to_string());

        if !self.mix_files.is_empty() || !self.concatenate_files.is_empty() {
            return Some(CombinedSpec {
                name,
                mix: self.mix_files.clone(),
                concat: self.concatenate_files.clone(),
                combine: self.final_combine_method.unwrap_or_default(),
            });
        }
        if self.audio_files.is_empty() {
            return None;
        }

        let files = self.audio_files.clone();
        let spec = match self.combine_method.unwrap_or_default() {
            CombineMethod::Overlay => CombinedSpec {
                name,
                mix: files,
                concat: Vec::new(),
                combine: CombineMethod::Overlay,
            },
            CombineMethod::Concatenate => CombinedSpec {
                name,
                mix: Vec::new(),
                concat: files,
                combine: CombineMethod::Concatenate,
            },
        };
        Some(spec)
    }
}

/// One entry of `inputs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputEntry {
    /// File, directory, or pattern relative to `input_dir`
    Path(String),
    /// Several files rendered into one source before any variant runs
    Combined(CombinedSpec),
}

impl From<&str> for InputEntry {
    fn from(path: &str) -> Self {
        InputEntry::Path(path.to_string())
    }
}

/// How the mixed and concatenated parts of a combined source are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMethod {
    /// Sum onto the first part, keeping its length
    #[serde(alias = "mix")]
    Overlay,
    /// Play one after the other
    #[default]
    #[serde(alias = "concat")]
    Concatenate,
}

/// A source built from several input files
///
/// `mix` files are overlaid onto the first of them; `concat` files are
/// appended in order. When both are given the two results are joined with
/// `combine`, mixed part first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombinedSpec {
    /// Stem used in output file names
    #[serde(alias = "output_name")]
    pub name: String,

    #[serde(default, alias = "mix_files", skip_serializing_if = "Vec::is_empty")]
    pub mix: Vec<String>,

    #[serde(
        default,
        alias = "concatenate",
        alias = "concatenate_files",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub concat: Vec<String>,

    #[serde(default, alias = "final_combine_method")]
    pub combine: CombineMethod,
}

/// A named effect chain as written in the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Suffix used in output file names
    pub name: String,

    /// Effects applied in order
    #[serde(default, alias = "chain")]
    pub effects: ChainSpec,
}

impl VariantSpec {
    pub fn new(name: impl Into<String>, effects: impl Into<ChainSpec>) -> Self {
        Self {
            name: name.into(),
            effects: effects.into(),
        }
    }
}

// ============================================================================
// Validated configuration
// ============================================================================

/// A variant whose chain has been checked against the registry
///
/// A chain that failed to compile keeps its error; every pair of this
/// variant is then reported failed without any audio work.
#[derive(Debug)]
pub struct Variant {
    pub name: String,
    pub spec: ChainSpec,
    pub chain: Result<CompiledChain>,
}

impl Variant {
    /// Check if the chain compiled
    pub fn is_valid(&self) -> bool {
        self.chain.is_ok()
    }
}

/// Validated, immutable configuration for one run
#[derive(Debug)]
pub struct PipelineConfig {
    /// Input entries as written, plus any flat-key mixdown
    pub inputs: Vec<InputEntry>,
    /// Resolved base directory for relative inputs
    pub input_dir: PathBuf,
    /// Resolved output directory
    pub output_dir: PathBuf,
    /// Lower-case extensions without the leading dot
    pub output_formats: Vec<String>,
    pub export: ExportFormat,
    pub workers: usize,
    pub ffmpeg: PathBuf,
    pub variants: Vec<Variant>,
}

impl PipelineConfig {
    /// Load and validate a configuration file
    ///
    /// Relative `input_dir` and `output_dir` are resolved against the
    /// directory holding the file.
    ///
    /// # Errors
    /// `Config` if the file is missing, unreadable, unparsable, or invalid
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::Config {
            reason: format!("cannot read configuration file {}: {}", path.display(), e),
            source: Some(Box::new(e)),
        })?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let config = if is_yaml(path) {
            Self::from_yaml_str(&content, base_dir)?
        } else {
            Self::from_json_str(&content, base_dir)?
        };
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str, base_dir: &Path) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(content).map_err(|e| PipelineError::Config {
            reason: format!("invalid configuration JSON: {}", e),
            source: Some(Box::new(e)),
        })?;
        Self::from_file(file, base_dir, EffectRegistry::global())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content).map_err(|e| PipelineError::Config {
            reason: format!("invalid configuration YAML: {}", e),
            source: Some(Box::new(e)),
        })?;
        Self::from_file(file, base_dir, EffectRegistry::global())
    }

    /// Validate a parsed document against a registry
    pub fn from_file(
        mut file: ConfigFile,
        base_dir: &Path,
        registry: &EffectRegistry,
    ) -> Result<Self> {
        for key in file.unknown_fields.keys() {
            warn!("Ignoring unknown configuration key '{}'", key);
        }

        if let Some(combined) = file.top_level_source() {
            info!("Top-level file lists define combined source '{}'", combined.name);
            file.inputs.push(InputEntry::Combined(combined));
        }
        if let Some(effects) = file.effects.take() {
            file.variants.push(VariantSpec::new(TOP_LEVEL_VARIANT, effects));
        }

        if file.inputs.is_empty() {
            return Err(PipelineError::config("'inputs' must list at least one file or pattern"));
        }
        for entry in &file.inputs {
            validate_input_entry(entry)?;
        }
        if file.variants.is_empty() {
            return Err(PipelineError::config("'variants' must define at least one variant"));
        }

        let output_formats = validate_formats(&file.output_formats)?;
        let export = ExportFormat::new(file.bit_depth)?;

        let workers = match file.workers {
            Some(0) => return Err(PipelineError::config("'workers' must be at least 1")),
            Some(n) => n,
            None => default_workers(),
        };

        let mut seen = HashSet::new();
        let mut variants = Vec::with_capacity(file.variants.len());
        for spec in file.variants {
            validate_variant_name(&spec.name)?;
            if !seen.insert(spec.name.clone()) {
                return Err(PipelineError::config(format!(
                    "duplicate variant name '{}'",
                    spec.name
                )));
            }

            let chain = spec.effects.compile(registry);
            if let Err(e) = &chain {
                warn!("Variant '{}' is invalid and will be skipped: {}", spec.name, e);
            }

            variants.push(Variant {
                name: spec.name,
                spec: spec.effects,
                chain,
            });
        }

        Ok(Self {
            inputs: file.inputs,
            input_dir: base_dir.join(&file.input_dir),
            output_dir: base_dir.join(&file.output_dir),
            output_formats,
            export,
            workers,
            ffmpeg: file.ffmpeg,
            variants,
        })
    }

    /// Look up a variant by name
    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

fn validate_input_entry(entry: &InputEntry) -> Result<()> {
    match entry {
        InputEntry::Path(path) if path.trim().is_empty() => Err(PipelineError::config(format!(
            "'inputs' contains an empty entry: {:?}",
            path
        ))),
        InputEntry::Path(_) => Ok(()),
        InputEntry::Combined(spec) => {
            if spec.name.trim().is_empty()
                || spec.name == "."
                || spec.name == ".."
                || spec.name.contains(['/', '\\'])
            {
                return Err(PipelineError::config(format!(
                    "combined source name {:?} must be a plain file stem",
                    spec.name
                )));
            }
            if spec.mix.is_empty() && spec.concat.is_empty() {
                return Err(PipelineError::config(format!(
                    "combined source '{}' lists no files",
                    spec.name
                )));
            }
            if let Some(bad) = spec
                .mix
                .iter()
                .chain(spec.concat.iter())
                .find(|m| m.trim().is_empty() || m.contains(['*', '?']))
            {
                return Err(PipelineError::config(format!(
                    "combined source '{}' must list plain files, got {:?}",
                    spec.name, bad
                )));
            }
            Ok(())
        }
    }
}

fn validate_variant_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PipelineError::config("variant names must not be empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(PipelineError::config(format!(
            "variant name '{}' must not contain path separators",
            name
        )));
    }
    Ok(())
}

fn validate_formats(formats: &[String]) -> Result<Vec<String>> {
    if formats.is_empty() {
        return Err(PipelineError::config("'output_formats' must not be empty"));
    }

    let mut normalized: Vec<String> = Vec::with_capacity(formats.len());
    for format in formats {
        let ext = format.trim().trim_start_matches('.').to_ascii_lowercase();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PipelineError::config(format!(
                "invalid output format '{}'",
                format
            )));
        }
        if normalized.contains(&ext) {
            return Err(PipelineError::config(format!(
                "output format '{}' is listed twice",
                ext
            )));
        }
        normalized.push(ext);
    }

    Ok(normalized)
}
