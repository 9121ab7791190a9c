//! Audio file I/O for Augmenta
//!
//! WAV files are decoded and encoded in-process with `hound`. Every other
//! container (mp3, flac, ogg, ...) goes through an external `ffmpeg`
//! executable, using a scratch WAV as the intermediate.
//!
//! Audio keeps its source sample rate and channel count; nothing is
//! resampled on import or export.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::engine::buffer::AudioBuffer;
use crate::error::{PipelineError, Result};

/// File extensions treated as audio when scanning input directories
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "flac", "ogg", "m4a", "aac", "aiff", "aif", "opus", "wma",
];

/// Check whether a path carries a known audio extension (case-insensitive)
pub fn is_audio_file(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.to_ascii_lowercase())
}

/// Integer full scale per bit depth, shared by import and export
const I8_SCALE: f32 = 128.0;
const I16_SCALE: f32 = 32768.0;
const I24_SCALE: f32 = 8388608.0;
const I32_SCALE: f32 = 2147483648.0;

/// Quantize a float sample to a signed integer of the given full scale
#[inline]
fn quantize(sample: f32, scale: f32) -> f32 {
    (sample * scale).round().clamp(-scale, scale - 1.0)
}

fn is_wav(path: &Path) -> bool {
    extension_of(path).as_deref() == Some("wav")
}

// ============================================================================
// Codec collaborator
// ============================================================================

/// Loads and saves audio buffers
///
/// The orchestrator only talks to this trait, so tests and alternative
/// backends can replace the file-based implementations.
pub trait AudioCodec: Send + Sync {
    /// Decode the file at `path` into a buffer
    fn load(&self, path: &Path) -> Result<AudioBuffer>;

    /// Encode `buffer` into a new file at `path`, replacing any existing file
    fn save(&self, buffer: &AudioBuffer, path: &Path) -> Result<()>;
}

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Bit depth: 16, 24, or 32 (32 = float, default: 16)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat { bit_depth: 16 }
    }
}

impl ExportFormat {
    /// Bit depths the WAV writer can produce
    pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [16, 24, 32];

    /// Create a new export format with the given bit depth
    pub fn new(bit_depth: u16) -> Result<Self> {
        if !Self::SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
            return Err(PipelineError::config(format!(
                "unsupported bit depth {} (expected one of 16, 24, 32)",
                bit_depth
            )));
        }
        Ok(ExportFormat { bit_depth })
    }
}

/// In-process WAV codec backed by `hound`
#[derive(Debug, Clone, Default)]
pub struct WavCodec {
    format: ExportFormat,
}

impl WavCodec {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }
}

impl AudioCodec for WavCodec {
    fn load(&self, path: &Path) -> Result<AudioBuffer> {
        import_audio(path)
    }

    fn save(&self, buffer: &AudioBuffer, path: &Path) -> Result<()> {
        export_audio(buffer, path, self.format)
    }
}

/// Codec that handles WAV natively and delegates other formats to ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    wav: WavCodec,
    ffmpeg_path: PathBuf,
}

impl FfmpegCodec {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            wav: WavCodec::new(format),
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Run ffmpeg converting `input` into `output`
    fn transcode(&self, input: &Path, output: &Path, reported: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        match extension_of(output).as_deref() {
            Some("mp3") => {
                cmd.arg("-b:a").arg("192k");
            }
            Some("wav") => {
                // Scratch decode target: keep full float precision
                cmd.arg("-c:a").arg("pcm_f32le");
            }
            _ => {}
        }
        cmd.arg(output);

        debug!("Running {:?}", cmd);

        let result = cmd.output().map_err(|e| PipelineError::Codec {
            path: reported.to_path_buf(),
            reason: format!(
                "failed to launch '{}': {}",
                self.ffmpeg_path.display(),
                e
            ),
            source: Some(Box::new(e)),
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::codec(
                reported,
                format!("ffmpeg failed ({}): {}", result.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}

impl AudioCodec for FfmpegCodec {
    fn load(&self, path: &Path) -> Result<AudioBuffer> {
        if is_wav(path) {
            return self.wav.load(path);
        }
        if !path.exists() {
            return Err(not_found(path));
        }

        let scratch = scratch_dir(path)?;
        let decoded = scratch.path().join("decoded.wav");
        self.transcode(path, &decoded, path)?;

        import_audio(&decoded).map_err(|e| retarget(e, &decoded, path))
    }

    fn save(&self, buffer: &AudioBuffer, path: &Path) -> Result<()> {
        if is_wav(path) {
            return self.wav.save(buffer, path);
        }

        let scratch = scratch_dir(path)?;
        let encoded = scratch.path().join("encoded.wav");
        // Float WAV keeps full precision for the final encode
        export_audio(buffer, &encoded, ExportFormat { bit_depth: 32 })
            .map_err(|e| retarget(e, &encoded, path))?;

        self.transcode(&encoded, path, path)
    }
}

fn scratch_dir(path: &Path) -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("augmenta-")
        .tempdir()
        .map_err(|e| PipelineError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Report errors on scratch files against the user-visible path
fn retarget(err: PipelineError, scratch: &Path, visible: &Path) -> PipelineError {
    match err {
        PipelineError::Codec {
            path,
            reason,
            source,
        } if path == scratch => PipelineError::Codec {
            path: visible.to_path_buf(),
            reason,
            source,
        },
        PipelineError::Io { path, source } if path == scratch => PipelineError::Io {
            path: visible.to_path_buf(),
            source,
        },
        other => other,
    }
}

fn not_found(path: &Path) -> PipelineError {
    PipelineError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
    }
}

fn map_hound_error(path: &Path, context: &str, err: hound::Error) -> PipelineError {
    match err {
        hound::Error::IoError(source) => PipelineError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => PipelineError::Codec {
            path: path.to_path_buf(),
            reason: format!("{}: {}", context, other),
            source: Some(Box::new(other)),
        },
    }
}

// ============================================================================
// WAV import / export
// ============================================================================

/// Import a WAV file
///
/// Reads a WAV file and converts every sample to 32-bit float in [-1, 1].
///
/// # Errors
/// * `Io` - If the file does not exist or cannot be read
/// * `Codec` - If the file is not a valid WAV file or holds no samples
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(not_found(path));
    }

    let reader =
        WavReader::open(path).map_err(|e| map_hound_error(path, "failed to open WAV file", e))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    if channels == 0 {
        return Err(PipelineError::codec(path, "WAV header declares zero channels"));
    }

    let samples_f32 = read_samples_as_f32(path, reader, spec.bits_per_sample, spec.sample_format)?;

    if samples_f32.is_empty() {
        return Err(PipelineError::codec(path, "audio contains no samples"));
    }

    AudioBuffer::from_interleaved(&samples_f32, channels, spec.sample_rate).map_err(|e| match e {
        PipelineError::Codec { reason, .. } => PipelineError::codec(path, reason),
        other => other,
    })
}

/// Export an AudioBuffer to a WAV file
///
/// Integer formats clamp to the representable range, so gain pushed past
/// full scale clips here rather than in the effect chain.
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| map_hound_error(path, "failed to create WAV file", e))?;

    let interleaved = buffer.to_interleaved();
    let write_err = |e| map_hound_error(path, "failed to write sample", e);

    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = quantize(sample, I16_SCALE) as i16;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = quantize(sample, I24_SCALE) as i32;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        32 => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(write_err)?;
            }
        }
        other => {
            return Err(PipelineError::codec(
                path,
                format!("{}-bit audio (only 16, 24, 32 supported)", other),
            ));
        }
    }

    writer
        .finalize()
        .map_err(|e| map_hound_error(path, "failed to finalize WAV file", e))?;

    Ok(())
}

/// Generate a test tone (sine wave)
///
/// Every channel carries the same sine at `amplitude`.
pub fn generate_test_tone(
    frequency: f32,
    duration_secs: f32,
    sample_rate: u32,
    channels: usize,
    amplitude: f32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32).round() as usize;
    let mut buffer = AudioBuffer::new(channels, num_samples, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;

    for channel in buffer.samples.iter_mut() {
        for (i, sample) in channel.iter_mut().enumerate() {
            *sample = amplitude * (angular_freq * i as f32).sin();
        }
    }

    buffer
}

// ============================================================================
// Internal helper functions
// ============================================================================

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    path: &Path,
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let read_err = |e| map_hound_error(path, "failed to read samples", e);

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / I8_SCALE))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / I16_SCALE))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / I24_SCALE))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / I32_SCALE))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(read_err),
            _ => Err(PipelineError::codec(
                path,
                format!("{}-bit integer audio is not supported", bits_per_sample),
            )),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
