//! # avrec - synchronized audio/video recording
//!
//! avrec records one video track and one audio track into a single seekable
//! container. Frames are drawn into a codec input surface on a render
//! thread, PCM is pushed into an audio codec, and one drain thread per stream
//! moves encoded access units into a shared interleaving muxer. Both tracks
//! are rebased so the first video frame is at time zero.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avrec::{AudioEncoderConfig, Recorder, RecorderConfig, VideoEncoderConfig};
//! use avrec::{MIME_AUDIO_RAW, MIME_VIDEO_PASSTHROUGH};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = RecorderConfig::new("/tmp/clip.avrc");
//!     config.video = VideoEncoderConfig { mime: MIME_VIDEO_PASSTHROUGH.into(), ..Default::default() };
//!     config.audio = AudioEncoderConfig { mime: MIME_AUDIO_RAW.into(), ..Default::default() };
//!
//!     let (mut recorder, mut events) = Recorder::new(config);
//!     recorder.prepare()?;
//!     recorder.start()?;
//!     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     let summary = recorder.stop()?;
//!     println!("Wrote {} bytes", summary.bytes_written);
//!
//!     drop(recorder);
//!     while let Some(event) = events.next().await {
//!         println!("Recorder event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Threading
//!
//! Control methods on [`Recorder`] are called from the host thread. Worker
//! threads never call user code; every notification travels through
//! [`RecorderEvents`], which the host drains on its own thread.

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use avrec_core::{
    AudioEncoderConfig, DeviceError, DeviceOperation, DeviceResult, EncodedSample, ErrorCode,
    FormatParams, MediaClock, PauseGate, PipelineState, PtsRebaser, RecorderError,
    RecorderResult, SampleFlags, StreamFormat, StreamKind, VideoEncoderConfig, MIME_AUDIO_AAC,
    MIME_AUDIO_OPUS, MIME_VIDEO_AVC,
};

pub use avrec_media::{
    AudioCodecDevice, CodecDevice, CodecFactory, CodecRegistry, DequeueOutcome, FrameRenderer,
    InputSurface, MediaError, OutputBuffer, PcmChunk, PcmSource, RenderError, RenderResult,
    ToneSource, TrackFileReader, VideoCodecDevice, MIME_AUDIO_RAW, MIME_VIDEO_PASSTHROUGH,
};

#[cfg(feature = "opus")]
pub use avrec_media::OpusCodecFactory;

// Public API modules
pub mod config;
pub mod event;
pub mod logging;
pub mod recorder;
mod session;

// Re-export main API types
pub use config::RecorderConfig;
pub use event::{RecorderCallback, RecorderEvent, RecorderEvents};
pub use logging::{init_logging, init_logging_with, LOG_ENV};
pub use recorder::{Recorder, RecorderBuilder, RecordingSummary};
