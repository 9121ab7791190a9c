//! Audio Engine Module
//!
//! In-memory audio and the codec collaborators that move it on and off disk:
//! - Audio buffer management
//! - File I/O operations (WAV in-process, other formats through ffmpeg)

pub mod buffer;
pub mod io;

pub use buffer::{calculate_peak, db_to_linear, linear_to_db, AudioBuffer};
pub use io::{
    export_audio, generate_test_tone, import_audio, is_audio_file, AudioCodec, ExportFormat,
    FfmpegCodec, WavCodec, AUDIO_EXTENSIONS,
};
