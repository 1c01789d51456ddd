//! Error types for the render pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a render run.
///
/// Recoverable conditions (silent renders, missing gain annotations, failed
/// deletions) are handled where they occur and never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A preset or artifact path has an extension the pipeline cannot handle.
    #[error("Unsupported {kind} format: {path} (extension {extension:?})")]
    UnsupportedFormat {
        kind: &'static str,
        path: PathBuf,
        extension: String,
    },

    #[error("Unsupported MIDI timing: {0}")]
    UnsupportedTiming(String),

    #[error("MIDI parse error in {path}: {reason}")]
    MidiParse { path: PathBuf, reason: String },

    #[error("Invalid preset {path}: {reason}")]
    Preset { path: PathBuf, reason: String },

    #[error("Failed to load instrument {name} from {path}: {reason}")]
    InstrumentLoad {
        name: String,
        path: PathBuf,
        reason: String,
    },

    /// The external mixing tool could not be started or exited non-zero.
    #[error("External tool {program} failed (status {status:?}): {stderr}")]
    ExternalToolFailure {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("No tracks were rendered, nothing to mix")]
    NothingToMix,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary preset error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_message() {
        let err = PipelineError::UnsupportedFormat {
            kind: "preset",
            path: PathBuf::from("lead.nki"),
            extension: "nki".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("preset"));
        assert!(msg.contains("lead.nki"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
