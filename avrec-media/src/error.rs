//! Media pipeline error types
//!
//! Errors raised by the muxer, the container writer and PCM sources. They are
//! converted into [`RecorderError`] at the point where they leave a pipeline.

use avrec_core::{RecorderError, StreamKind};
use thiserror::Error;

/// Main error type for muxing and sources
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Container bytes could not be parsed
    #[error("Invalid container: {reason}")]
    InvalidContainer {
        /// Failure reason
        reason: String,
    },

    /// A sample was written before every stream was added
    #[error("Muxer not started: {added} of {expected} streams added")]
    MuxerNotStarted {
        /// Streams added so far
        added: usize,
        /// Streams required before writing
        expected: usize,
    },

    /// A second stream of the same kind was added
    #[error("Duplicate {kind} stream")]
    DuplicateStream {
        /// Stream kind
        kind: StreamKind,
    },

    /// No stream is registered at the index
    #[error("Unknown stream index {index}")]
    UnknownStream {
        /// Requested index
        index: usize,
    },

    /// Streams cannot be added once writing started
    #[error("Streams cannot be added after the muxer started")]
    AlreadyStarted,

    /// The muxer was already finalized or poisoned by a write failure
    #[error("Muxer already finished")]
    AlreadyFinished,

    /// PCM source failure
    #[error("Audio source failed: {reason}")]
    Source {
        /// Failure reason
        reason: String,
    },
}

/// Result type for media operations
pub type MediaResult<T> = std::result::Result<T, MediaError>;

impl From<MediaError> for RecorderError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::MuxerNotStarted { added, expected } => {
                RecorderError::MuxerNotStarted { added, expected }
            }
            MediaError::Source { reason } => RecorderError::EncodeFailed {
                stream: StreamKind::Audio,
                reason,
            },
            other => RecorderError::MuxerFailed {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrec_core::ErrorCode;

    #[test]
    fn test_conversion_keeps_public_codes() {
        let error: RecorderError = MediaError::MuxerNotStarted {
            added: 1,
            expected: 2,
        }
        .into();
        assert_eq!(error.code(), Some(ErrorCode::MuxerFailed));

        let error: RecorderError = MediaError::Source {
            reason: "underrun".into(),
        }
        .into();
        assert_eq!(error.code(), Some(ErrorCode::EncodeFailed));
        assert_eq!(error.stream(), Some(StreamKind::Audio));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let error: RecorderError = MediaError::from(io).into();
        assert_eq!(error.code(), Some(ErrorCode::MuxerFailed));
        assert!(error.to_string().contains("disk full"));
    }
}
