//! Error types for avrec
//!
//! Every failure a recording session can hit is expressed as a
//! [`RecorderError`]. Errors that reach the public callback contract carry a
//! stable [`ErrorCode`].

use crate::sample::StreamKind;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Stable error codes reported through `on_failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// The output file could not be created
    CreateFileFailed = 1,
    /// A codec device rejected its configuration
    EncoderPrepareFailed = 2,
    /// The session could not be started
    StartFailed = 3,
    /// No codec is available for the requested type
    UnsupportedType = 4,
    /// A codec device failed while encoding
    EncodeFailed = 5,
    /// The container could not be written or finalized
    MuxerFailed = 6,
}

impl ErrorCode {
    /// Numeric value of the code
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code by its numeric value
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(ErrorCode::CreateFileFailed),
            2 => Some(ErrorCode::EncoderPrepareFailed),
            3 => Some(ErrorCode::StartFailed),
            4 => Some(ErrorCode::UnsupportedType),
            5 => Some(ErrorCode::EncodeFailed),
            6 => Some(ErrorCode::MuxerFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::CreateFileFailed => "ERROR_CREATE_FILE_FAILED",
            ErrorCode::EncoderPrepareFailed => "ERROR_ENCODER_PREPARE_FAILED",
            ErrorCode::StartFailed => "ERROR_START_FAILED",
            ErrorCode::UnsupportedType => "ERROR_UNSUPPORTED_TYPE",
            ErrorCode::EncodeFailed => "ERROR_ENCODE_FAILED",
            ErrorCode::MuxerFailed => "ERROR_MUXER_FAILED",
        };
        write!(f, "{}({})", name, self.as_i32())
    }
}

/// Codec device lifecycle step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOperation {
    /// Creating the device
    Create,
    /// Applying the encoder configuration
    Configure,
    /// Creating the input surface
    CreateSurface,
    /// Starting the device
    Start,
    /// Queueing raw input
    QueueInput,
    /// Polling for encoded output
    DequeueOutput,
    /// Returning an output buffer
    ReleaseOutput,
    /// Flushing pending buffers
    Flush,
    /// Stopping the device
    Stop,
    /// Releasing device resources
    Release,
}

impl fmt::Display for DeviceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceOperation::Create => "create",
            DeviceOperation::Configure => "configure",
            DeviceOperation::CreateSurface => "create_input_surface",
            DeviceOperation::Start => "start",
            DeviceOperation::QueueInput => "queue_input",
            DeviceOperation::DequeueOutput => "dequeue_output",
            DeviceOperation::ReleaseOutput => "release_output",
            DeviceOperation::Flush => "flush",
            DeviceOperation::Stop => "stop",
            DeviceOperation::Release => "release",
        };
        f.write_str(name)
    }
}

/// Error raised by a codec device
#[derive(Error, Debug, Clone)]
#[error("codec device {operation} failed: {reason}")]
pub struct DeviceError {
    /// Lifecycle step that failed
    pub operation: DeviceOperation,
    /// Device supplied reason
    pub reason: String,
}

impl DeviceError {
    /// Create a device error for the given operation
    pub fn new(operation: DeviceOperation, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Result type for codec device calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Main error type for recording operations
///
/// Errors are cloneable so the same failure can be returned to the caller
/// and delivered through the session's event channel.
#[derive(Error, Debug, Clone)]
pub enum RecorderError {
    /// Output file could not be created
    #[error("Failed to create output file {path:?}: {source}")]
    CreateFileFailed {
        /// Requested output path
        path: PathBuf,
        /// Underlying I/O error
        source: Arc<std::io::Error>,
    },

    /// Encoder could not be prepared
    #[error("Failed to prepare {stream} encoder: {reason}")]
    EncoderPrepareFailed {
        /// Stream whose encoder failed
        stream: StreamKind,
        /// Failure reason
        reason: String,
    },

    /// Session could not be started
    #[error("Failed to start recording: {reason}")]
    StartFailed {
        /// Failure reason
        reason: String,
    },

    /// No codec for the requested MIME type
    #[error("Unsupported type: {mime}")]
    UnsupportedType {
        /// Requested MIME type
        mime: String,
    },

    /// Runtime encoding failure
    #[error("Encoding failed on {stream} stream: {reason}")]
    EncodeFailed {
        /// Stream that failed
        stream: StreamKind,
        /// Failure reason
        reason: String,
    },

    /// Container could not be written
    #[error("Muxer failed: {reason}")]
    MuxerFailed {
        /// Failure reason
        reason: String,
    },

    /// Codec device error
    #[error("{stream} {source}")]
    Device {
        /// Stream the device belongs to
        stream: StreamKind,
        /// Device error
        #[source]
        source: DeviceError,
    },

    /// A sample was written before every stream was added
    #[error("Muxer not started: {added} of {expected} streams added")]
    MuxerNotStarted {
        /// Streams added so far
        added: usize,
        /// Streams required before writing
        expected: usize,
    },

    /// Invalid state for the requested operation
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state(s)
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Invalid configuration supplied
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },
}

/// Result type alias for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

impl RecorderError {
    /// Output file creation failure
    pub fn create_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::CreateFileFailed {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Wrap a device error raised by the given stream's codec
    pub fn device(stream: StreamKind, source: DeviceError) -> Self {
        RecorderError::Device { stream, source }
    }

    /// Public error code for this error
    ///
    /// Device errors map by the lifecycle step that failed: configuration
    /// problems are prepare failures, start problems are start failures and
    /// everything else happens while encoding.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RecorderError::CreateFileFailed { .. } => Some(ErrorCode::CreateFileFailed),
            RecorderError::EncoderPrepareFailed { .. } => {
                Some(ErrorCode::EncoderPrepareFailed)
            }
            RecorderError::StartFailed { .. } => Some(ErrorCode::StartFailed),
            RecorderError::UnsupportedType { .. } => Some(ErrorCode::UnsupportedType),
            RecorderError::EncodeFailed { .. } => Some(ErrorCode::EncodeFailed),
            RecorderError::MuxerFailed { .. } => Some(ErrorCode::MuxerFailed),
            RecorderError::MuxerNotStarted { .. } => Some(ErrorCode::MuxerFailed),
            RecorderError::Device { source, .. } => Some(match source.operation {
                DeviceOperation::Create
                | DeviceOperation::Configure
                | DeviceOperation::CreateSurface => ErrorCode::EncoderPrepareFailed,
                DeviceOperation::Start => ErrorCode::StartFailed,
                _ => ErrorCode::EncodeFailed,
            }),
            RecorderError::InvalidConfiguration { .. } => {
                Some(ErrorCode::EncoderPrepareFailed)
            }
            RecorderError::InvalidState { .. } => None,
        }
    }

    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RecorderError::InvalidState { .. })
    }

    /// Stream the error originated from, if any
    pub fn stream(&self) -> Option<StreamKind> {
        match self {
            RecorderError::EncoderPrepareFailed { stream, .. }
            | RecorderError::EncodeFailed { stream, .. }
            | RecorderError::Device { stream, .. } => Some(*stream),
            _ => None,
        }
    }
}
