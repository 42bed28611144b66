//! # avrec Media
//!
//! Encode pipelines, the codec device contract and muxing for avrec. This
//! crate owns the worker threads: a render and a drain thread for video, a
//! drain thread for audio, all writing into one interleaving [`Muxer`].

#![warn(clippy::all)]

pub mod audio;
pub mod codecs;
pub mod container;
pub mod device;
pub mod drain;
pub mod error;
pub mod muxer;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod video;

// Re-export main types
pub use audio::AudioEncoder;
pub use codecs::{
    CodecFactory, CodecRegistry, PassthroughAudioDevice, PassthroughCodecFactory,
    PassthroughSurface, PassthroughVideoDevice, MIME_AUDIO_RAW, MIME_VIDEO_PASSTHROUGH,
};
#[cfg(feature = "opus")]
pub use codecs::{OpusAudioDevice, OpusCodecFactory};
pub use container::{ContainerWriter, IndexEntry, TrackFileReader, TrackFileWriter, FILE_EXTENSION};
pub use device::{AudioCodecDevice, CodecDevice, DequeueOutcome, OutputBuffer, VideoCodecDevice};
pub use drain::{DrainLoop, InputFeeder, PcmInput, SurfaceInput};
pub use error::{MediaError, MediaResult};
pub use muxer::{Muxer, MuxerStats, TrackStats, DEFAULT_INTERLEAVE_WINDOW_US};
pub use pipeline::{EncodeContext, EncodedStreamSink, MediaEncoder};
pub use render::{FrameRenderer, InputSurface, RenderError, RenderResult};
pub use source::{PcmChunk, PcmSource, ToneSource};
pub use video::VideoEncoder;
