//! Codec device contract
//!
//! A codec device is the hardware or software encoder behind a pipeline. It
//! is driven from a single drain thread: started once, polled with
//! [`CodecDevice::dequeue_output`] until it reports nothing is ready, and
//! shut down with flush, stop and release. Video devices take their input
//! from an [`InputSurface`]; audio devices take queued PCM.

use crate::render::InputSurface;
use crate::source::PcmChunk;
use avrec_core::{
    AudioEncoderConfig, DeviceResult, SampleFlags, StreamFormat, VideoEncoderConfig,
};
use bytes::Bytes;
use std::time::Duration;

/// Encoded buffer owned by the device until released
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    /// Device slot to hand back through `release_output`
    pub index: usize,
    /// Encoded bytes
    pub payload: Bytes,
    /// Device presentation timestamp, microseconds
    pub pts_us: i64,
    /// Buffer flags
    pub flags: SampleFlags,
}

/// Result of polling a device for output
#[derive(Debug, Clone)]
pub enum DequeueOutcome {
    /// Nothing ready within the timeout
    TryAgainLater,
    /// The output format is now known; sent once before any buffer
    FormatChanged(StreamFormat),
    /// An encoded buffer
    Buffer(OutputBuffer),
}

/// Lifecycle and output side shared by every codec device
pub trait CodecDevice: Send {
    /// Device name used in logs
    fn name(&self) -> &str;

    /// Start encoding
    fn start(&mut self) -> DeviceResult<()>;

    /// Poll for output, waiting at most `timeout`
    fn dequeue_output(&mut self, timeout: Duration) -> DeviceResult<DequeueOutcome>;

    /// Hand a dequeued buffer back to the device
    fn release_output(&mut self, index: usize) -> DeviceResult<()>;

    /// Drop pending input and output
    fn flush(&mut self) -> DeviceResult<()>;

    /// Stop encoding
    fn stop(&mut self) -> DeviceResult<()>;

    /// Free device resources
    fn release(&mut self) -> DeviceResult<()>;
}

/// Video encoder fed through a drawable surface
pub trait VideoCodecDevice: CodecDevice {
    /// Apply the encoder configuration; called once before start
    fn configure(&mut self, config: &VideoEncoderConfig) -> DeviceResult<()>;

    /// Create the surface frames are rendered onto
    fn create_input_surface(&mut self) -> DeviceResult<Box<dyn InputSurface>>;
}

/// Audio encoder fed with PCM chunks
pub trait AudioCodecDevice: CodecDevice {
    /// Apply the encoder configuration; called once before start
    fn configure(&mut self, config: &AudioEncoderConfig) -> DeviceResult<()>;

    /// Queue one chunk of PCM
    ///
    /// Returns `false` when no input slot is free; the caller retries the
    /// same chunk on a later iteration.
    fn queue_input(&mut self, chunk: &PcmChunk) -> DeviceResult<bool>;
}
