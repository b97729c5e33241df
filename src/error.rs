//! Error handling for Multitake
//!
//! Mixing and serialization failures are deterministic validation errors.
//! Collaborator failures (capture, decode, playback) are wrapped with the
//! track they concern so the caller can report them.

use thiserror::Error;

/// Result type alias for Multitake operations
pub type Result<T> = std::result::Result<T, MultitakeError>;

/// Main error type for Multitake operations
#[derive(Error, Debug)]
pub enum MultitakeError {
    // Mixdown / Serializer Errors
    #[error("Nothing to mix: the session has no tracks")]
    EmptyMix,

    #[error("Track {track} has {found} channel(s), mix expects {expected}")]
    ChannelMismatch {
        track: usize,
        expected: usize,
        found: usize,
    },

    #[error("Cannot serialize an empty buffer")]
    EmptyBuffer,

    #[error("Invalid audio buffer: {reason}")]
    InvalidBuffer { reason: String },

    #[error("Failed to decode track {track}: {reason}")]
    DecodeError {
        track: usize,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Not a canonical PCM WAV file: {reason}")]
    WavFormat { reason: String },

    // Repository / Session Errors
    #[error("Track not found: {id}")]
    NotFound { id: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    // Collaborator Errors
    #[error("Capture device error: {reason}")]
    Capture { reason: String },

    #[error("Playback device error: {reason}")]
    Playback { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // Worker Errors
    #[error("Mixdown worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MultitakeError {
    /// Wrap a collaborator decode failure for the given track position
    pub fn decode<E>(track: usize, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MultitakeError::DecodeError {
            track,
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MultitakeError::EmptyMix => "EMPTY_MIX",
            MultitakeError::ChannelMismatch { .. } => "CHANNEL_MISMATCH",
            MultitakeError::EmptyBuffer => "EMPTY_BUFFER",
            MultitakeError::InvalidBuffer { .. } => "INVALID_BUFFER",
            MultitakeError::DecodeError { .. } => "DECODE_ERROR",
            MultitakeError::WavFormat { .. } => "WAV_FORMAT",
            MultitakeError::NotFound { .. } => "NOT_FOUND",
            MultitakeError::InvalidState { .. } => "INVALID_STATE",
            MultitakeError::Capture { .. } => "CAPTURE_ERROR",
            MultitakeError::Playback { .. } => "PLAYBACK_ERROR",
            MultitakeError::Config { .. } => "CONFIG_ERROR",
            MultitakeError::Worker(_) => "WORKER_ERROR",
            MultitakeError::Io(_) => "IO_ERROR",
            MultitakeError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the session untouched; callers doing
    /// best-effort cleanup may ignore them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MultitakeError::NotFound { .. }
                | MultitakeError::InvalidState { .. }
                | MultitakeError::DecodeError { .. }
                | MultitakeError::Capture { .. }
                | MultitakeError::Playback { .. }
        )
    }
}
