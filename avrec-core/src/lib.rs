//! # avrec Core
//!
//! Shared building blocks of the avrec recording pipeline: the encoded sample
//! and stream format model, the error taxonomy with its stable public codes,
//! encoder configuration, the pause gate used by worker threads, timestamp
//! rebasing and the session state machine.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod pause;
pub mod sample;
pub mod state;
pub mod timestamp;

// Re-export main types
pub use config::{
    AudioEncoderConfig, VideoEncoderConfig, MIME_AUDIO_AAC, MIME_AUDIO_OPUS, MIME_VIDEO_AVC,
};
pub use error::{
    DeviceError, DeviceOperation, DeviceResult, ErrorCode, RecorderError, RecorderResult,
};
pub use pause::PauseGate;
pub use sample::{EncodedSample, FormatParams, SampleFlags, StreamFormat, StreamKind};
pub use state::PipelineState;
pub use timestamp::{MediaClock, PtsRebaser};
