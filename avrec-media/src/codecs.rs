//! Codec registry and built-in codec devices
//!
//! Platform encoders plug in through [`CodecFactory`], keyed by MIME type in
//! a [`CodecRegistry`]. Two software devices ship with the crate:
//!
//! - passthrough devices that emit frame descriptors (video) and raw PCM
//!   (audio) without compressing anything, useful for tests and demos
//! - an Opus audio device when the `opus` feature is enabled

use crate::device::{AudioCodecDevice, CodecDevice, DequeueOutcome, OutputBuffer, VideoCodecDevice};
use crate::render::{InputSurface, RenderError, RenderResult};
use crate::source::PcmChunk;
use avrec_core::{
    AudioEncoderConfig, DeviceError, DeviceOperation, DeviceResult, MediaClock, RecorderError,
    RecorderResult, SampleFlags, StreamFormat, StreamKind, VideoEncoderConfig,
};
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// MIME type of the passthrough video device
pub const MIME_VIDEO_PASSTHROUGH: &str = "video/x-avrec-frames";
/// MIME type of the passthrough audio device
pub const MIME_AUDIO_RAW: &str = "audio/raw";

/// Creates codec devices for the MIME types it is registered under
pub trait CodecFactory: Send + Sync {
    /// Factory name used in logs
    fn name(&self) -> &str;

    /// Create a video device for `mime`
    fn create_video_device(&self, mime: &str) -> DeviceResult<Box<dyn VideoCodecDevice>> {
        Err(DeviceError::new(
            DeviceOperation::Create,
            format!("{} cannot encode video ({})", self.name(), mime),
        ))
    }

    /// Create an audio device for `mime`
    fn create_audio_device(&self, mime: &str) -> DeviceResult<Box<dyn AudioCodecDevice>> {
        Err(DeviceError::new(
            DeviceOperation::Create,
            format!("{} cannot encode audio ({})", self.name(), mime),
        ))
    }
}

/// Codec registry for selecting a device factory by MIME type
#[derive(Clone, Default)]
pub struct CodecRegistry {
    factories: HashMap<String, Arc<dyn CodecFactory>>,
}

impl CodecRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in software codecs
    pub fn with_defaults(clock: MediaClock) -> Self {
        let mut registry = Self::new();

        let passthrough: Arc<dyn CodecFactory> = Arc::new(PassthroughCodecFactory::new(clock));
        registry.register(MIME_VIDEO_PASSTHROUGH, passthrough.clone());
        registry.register(MIME_AUDIO_RAW, passthrough);

        #[cfg(feature = "opus")]
        registry.register(avrec_core::MIME_AUDIO_OPUS, Arc::new(OpusCodecFactory));

        registry
    }

    /// Register a factory for a MIME type, replacing any previous one
    pub fn register(&mut self, mime: &str, factory: Arc<dyn CodecFactory>) {
        self.factories.insert(mime.to_string(), factory);
    }

    /// Whether a factory is registered for `mime`
    pub fn supports(&self, mime: &str) -> bool {
        self.factories.contains_key(mime)
    }

    /// Registered MIME types, sorted
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Create the video device for a configuration
    pub fn video_device(&self, config: &VideoEncoderConfig) -> RecorderResult<Box<dyn VideoCodecDevice>> {
        let factory = self.lookup(&config.mime)?;
        debug!(factory = factory.name(), mime = %config.mime, "Creating video device");
        factory
            .create_video_device(&config.mime)
            .map_err(|e| RecorderError::device(StreamKind::Video, e))
    }

    /// Create the audio device for a configuration
    pub fn audio_device(&self, config: &AudioEncoderConfig) -> RecorderResult<Box<dyn AudioCodecDevice>> {
        let factory = self.lookup(&config.mime)?;
        debug!(factory = factory.name(), mime = %config.mime, "Creating audio device");
        factory
            .create_audio_device(&config.mime)
            .map_err(|e| RecorderError::device(StreamKind::Audio, e))
    }

    fn lookup(&self, mime: &str) -> RecorderResult<&Arc<dyn CodecFactory>> {
        self.factories
            .get(mime)
            .ok_or_else(|| RecorderError::UnsupportedType {
                mime: mime.to_string(),
            })
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("types", &self.list_types())
            .finish()
    }
}

/// Output buffer slots handed out by a device
#[derive(Debug, Default)]
struct OutputSlots {
    next: usize,
    in_flight: Vec<usize>,
}

impl OutputSlots {
    fn acquire(&mut self) -> usize {
        let index = self.next;
        self.next = self.next.wrapping_add(1);
        self.in_flight.push(index);
        index
    }

    fn release(&mut self, index: usize) -> DeviceResult<()> {
        match self.in_flight.iter().position(|&slot| slot == index) {
            Some(position) => {
                self.in_flight.swap_remove(position);
                Ok(())
            }
            None => Err(DeviceError::new(
                DeviceOperation::ReleaseOutput,
                format!("buffer {} is not dequeued", index),
            )),
        }
    }
}

fn require_started(started: bool, operation: DeviceOperation) -> DeviceResult<()> {
    if started {
        Ok(())
    } else {
        Err(DeviceError::new(operation, "device not started"))
    }
}

/// Factory for the passthrough devices
#[derive(Debug, Clone)]
pub struct PassthroughCodecFactory {
    clock: MediaClock,
}

impl PassthroughCodecFactory {
    /// Devices stamp frames with `clock`
    pub fn new(clock: MediaClock) -> Self {
        Self { clock }
    }
}

impl CodecFactory for PassthroughCodecFactory {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn create_video_device(&self, mime: &str) -> DeviceResult<Box<dyn VideoCodecDevice>> {
        Ok(Box::new(PassthroughVideoDevice::new(mime, self.clock)))
    }

    fn create_audio_device(&self, mime: &str) -> DeviceResult<Box<dyn AudioCodecDevice>> {
        Ok(Box::new(PassthroughAudioDevice::new(mime)))
    }
}

#[derive(Debug, Default)]
struct PresentedFrames {
    pts: VecDeque<i64>,
    presented: u64,
}

/// Video device emitting one descriptor per presented frame
///
/// Each payload holds the frame number and the frame dimensions. A key frame
/// is flagged every `frame_rate * i_frame_interval_secs` frames.
#[derive(Debug)]
pub struct PassthroughVideoDevice {
    mime: String,
    clock: MediaClock,
    config: Option<VideoEncoderConfig>,
    frames: Arc<Mutex<PresentedFrames>>,
    slots: OutputSlots,
    encoded: u64,
    started: bool,
    format_sent: bool,
}

impl PassthroughVideoDevice {
    /// Create an unconfigured device
    pub fn new(mime: &str, clock: MediaClock) -> Self {
        Self {
            mime: mime.to_string(),
            clock,
            config: None,
            frames: Arc::new(Mutex::new(PresentedFrames::default())),
            slots: OutputSlots::default(),
            encoded: 0,
            started: false,
            format_sent: false,
        }
    }

    fn key_frame_interval(config: &VideoEncoderConfig) -> u64 {
        (config.frame_rate as u64 * config.i_frame_interval_secs as u64).max(1)
    }
}

impl CodecDevice for PassthroughVideoDevice {
    fn name(&self) -> &str {
        "passthrough-video"
    }

    fn start(&mut self) -> DeviceResult<()> {
        if self.config.is_none() {
            return Err(DeviceError::new(DeviceOperation::Start, "device not configured"));
        }
        self.started = true;
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> DeviceResult<DequeueOutcome> {
        require_started(self.started, DeviceOperation::DequeueOutput)?;
        let config = match &self.config {
            Some(config) => config,
            None => return Ok(DequeueOutcome::TryAgainLater),
        };

        let pts_us = {
            let mut frames = self.frames.lock();
            if frames.pts.is_empty() {
                return Ok(DequeueOutcome::TryAgainLater);
            }
            if !self.format_sent {
                None
            } else {
                frames.pts.pop_front()
            }
        };

        let pts_us = match pts_us {
            Some(pts_us) => pts_us,
            None => {
                self.format_sent = true;
                let format = StreamFormat::video(&self.mime, config.width, config.height, config.frame_rate)
                    .with_bit_rate(config.effective_bit_rate());
                return Ok(DequeueOutcome::FormatChanged(format));
            }
        };

        let frame_number = self.encoded;
        self.encoded += 1;

        let mut payload = BytesMut::with_capacity(16);
        payload.put_u64(frame_number);
        payload.put_u32(config.width);
        payload.put_u32(config.height);

        let flags = if frame_number % Self::key_frame_interval(config) == 0 {
            SampleFlags::key_frame()
        } else {
            SampleFlags::default()
        };

        Ok(DequeueOutcome::Buffer(OutputBuffer {
            index: self.slots.acquire(),
            payload: payload.freeze(),
            pts_us,
            flags,
        }))
    }

    fn release_output(&mut self, index: usize) -> DeviceResult<()> {
        self.slots.release(index)
    }

    fn flush(&mut self) -> DeviceResult<()> {
        self.frames.lock().pts.clear();
        Ok(())
    }

    fn stop(&mut self) -> DeviceResult<()> {
        require_started(self.started, DeviceOperation::Stop)?;
        self.started = false;
        Ok(())
    }

    fn release(&mut self) -> DeviceResult<()> {
        self.started = false;
        self.config = None;
        Ok(())
    }
}

impl VideoCodecDevice for PassthroughVideoDevice {
    fn configure(&mut self, config: &VideoEncoderConfig) -> DeviceResult<()> {
        if config.width == 0 || config.height == 0 {
            return Err(DeviceError::new(DeviceOperation::Configure, "zero frame size"));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn create_input_surface(&mut self) -> DeviceResult<Box<dyn InputSurface>> {
        let frame_rate = match &self.config {
            Some(config) => config.frame_rate.max(1),
            None => {
                return Err(DeviceError::new(
                    DeviceOperation::CreateSurface,
                    "device not configured",
                ))
            }
        };
        Ok(Box::new(PassthroughSurface {
            frames: self.frames.clone(),
            clock: self.clock,
            frame_interval: Duration::from_secs(1) / frame_rate,
            next_present: None,
            current: false,
            released: false,
        }))
    }
}

/// Surface that timestamps every swap with the media clock
///
/// `swap_buffers` blocks until the next frame slot at the configured frame
/// rate, the way a display-synced swap does. A swap that comes in late is
/// presented immediately and the cadence restarts from there, so a render
/// thread coming back from a pause does not catch up on missed slots.
#[derive(Debug)]
pub struct PassthroughSurface {
    frames: Arc<Mutex<PresentedFrames>>,
    clock: MediaClock,
    frame_interval: Duration,
    next_present: Option<Instant>,
    current: bool,
    released: bool,
}

impl InputSurface for PassthroughSurface {
    fn make_current(&mut self) -> RenderResult<()> {
        if self.released {
            return Err(RenderError::SurfaceReleased);
        }
        self.current = true;
        Ok(())
    }

    fn swap_buffers(&mut self) -> RenderResult<()> {
        if self.released {
            return Err(RenderError::SurfaceReleased);
        }
        if !self.current {
            return Err(RenderError::ContextUnavailable {
                reason: "swap before make_current".to_string(),
            });
        }

        let now = Instant::now();
        let presented_at = match self.next_present {
            Some(slot) if slot > now => {
                thread::sleep(slot - now);
                slot
            }
            _ => now,
        };
        self.next_present = Some(presented_at + self.frame_interval);

        let mut frames = self.frames.lock();
        frames.pts.push_back(self.clock.now_us());
        frames.presented += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.current = false;
        self.released = true;
    }
}

const PASSTHROUGH_AUDIO_SLOTS: usize = 8;

/// Audio device passing PCM through as little-endian bytes
#[derive(Debug)]
pub struct PassthroughAudioDevice {
    mime: String,
    config: Option<AudioEncoderConfig>,
    pending: VecDeque<(Bytes, i64)>,
    slots: OutputSlots,
    started: bool,
    format_sent: bool,
}

impl PassthroughAudioDevice {
    /// Create an unconfigured device
    pub fn new(mime: &str) -> Self {
        Self {
            mime: mime.to_string(),
            config: None,
            pending: VecDeque::new(),
            slots: OutputSlots::default(),
            started: false,
            format_sent: false,
        }
    }
}

impl CodecDevice for PassthroughAudioDevice {
    fn name(&self) -> &str {
        "passthrough-audio"
    }

    fn start(&mut self) -> DeviceResult<()> {
        if self.config.is_none() {
            return Err(DeviceError::new(DeviceOperation::Start, "device not configured"));
        }
        self.started = true;
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> DeviceResult<DequeueOutcome> {
        require_started(self.started, DeviceOperation::DequeueOutput)?;
        let config = match &self.config {
            Some(config) => config,
            None => return Ok(DequeueOutcome::TryAgainLater),
        };
        if self.pending.is_empty() {
            return Ok(DequeueOutcome::TryAgainLater);
        }

        if !self.format_sent {
            self.format_sent = true;
            let bit_rate = config.sample_rate * config.channels as u32 * 16;
            let format = StreamFormat::audio(&self.mime, config.sample_rate, config.channels)
                .with_bit_rate(bit_rate);
            return Ok(DequeueOutcome::FormatChanged(format));
        }

        match self.pending.pop_front() {
            Some((payload, pts_us)) => Ok(DequeueOutcome::Buffer(OutputBuffer {
                index: self.slots.acquire(),
                payload,
                pts_us,
                flags: SampleFlags::key_frame(),
            })),
            None => Ok(DequeueOutcome::TryAgainLater),
        }
    }

    fn release_output(&mut self, index: usize) -> DeviceResult<()> {
        self.slots.release(index)
    }

    fn flush(&mut self) -> DeviceResult<()> {
        self.pending.clear();
        Ok(())
    }

    fn stop(&mut self) -> DeviceResult<()> {
        require_started(self.started, DeviceOperation::Stop)?;
        self.started = false;
        Ok(())
    }

    fn release(&mut self) -> DeviceResult<()> {
        self.started = false;
        self.config = None;
        Ok(())
    }
}

impl AudioCodecDevice for PassthroughAudioDevice {
    fn configure(&mut self, config: &AudioEncoderConfig) -> DeviceResult<()> {
        if config.sample_rate == 0 || config.channels == 0 {
            return Err(DeviceError::new(
                DeviceOperation::Configure,
                "sample rate and channel count must be non-zero",
            ));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn queue_input(&mut self, chunk: &PcmChunk) -> DeviceResult<bool> {
        require_started(self.started, DeviceOperation::QueueInput)?;
        if self.pending.len() >= PASSTHROUGH_AUDIO_SLOTS {
            return Ok(false);
        }
        self.pending.push_back((chunk.to_le_bytes(), chunk.pts_us));
        Ok(true)
    }
}

#[cfg(feature = "opus")]
pub use self::opus::{OpusAudioDevice, OpusCodecFactory};

#[cfg(feature = "opus")]
mod opus {
    use super::*;
    use audiopus::{coder::Encoder as OpusEncoder, Application, Bitrate, Channels, SampleRate};

    const MAX_PACKET: usize = 4000;
    const FRAME_MS: u32 = 20;

    /// Factory for [`OpusAudioDevice`]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct OpusCodecFactory;

    impl CodecFactory for OpusCodecFactory {
        fn name(&self) -> &str {
            "opus"
        }

        fn create_audio_device(&self, _mime: &str) -> DeviceResult<Box<dyn AudioCodecDevice>> {
            Ok(Box::new(OpusAudioDevice::default()))
        }
    }

    /// Opus encoder producing 20 ms packets
    #[derive(Default)]
    pub struct OpusAudioDevice {
        encoder: Option<OpusEncoder>,
        config: Option<AudioEncoderConfig>,
        residual: Vec<i16>,
        residual_pts: Option<i64>,
        packets: VecDeque<(Bytes, i64)>,
        slots: OutputSlots,
        started: bool,
        format_sent: bool,
    }

    impl OpusAudioDevice {
        fn frame_samples(config: &AudioEncoderConfig) -> usize {
            (config.sample_rate * FRAME_MS / 1000) as usize * config.channels as usize
        }
    }

    impl CodecDevice for OpusAudioDevice {
        fn name(&self) -> &str {
            "opus"
        }

        fn start(&mut self) -> DeviceResult<()> {
            if self.encoder.is_none() {
                return Err(DeviceError::new(DeviceOperation::Start, "device not configured"));
            }
            self.started = true;
            Ok(())
        }

        fn dequeue_output(&mut self, _timeout: Duration) -> DeviceResult<DequeueOutcome> {
            require_started(self.started, DeviceOperation::DequeueOutput)?;
            let config = match &self.config {
                Some(config) => config,
                None => return Ok(DequeueOutcome::TryAgainLater),
            };
            if self.packets.is_empty() {
                return Ok(DequeueOutcome::TryAgainLater);
            }
            if !self.format_sent {
                self.format_sent = true;
                let format = StreamFormat::audio(avrec_core::MIME_AUDIO_OPUS, config.sample_rate, config.channels)
                    .with_bit_rate(config.bit_rate);
                return Ok(DequeueOutcome::FormatChanged(format));
            }
            match self.packets.pop_front() {
                Some((payload, pts_us)) => Ok(DequeueOutcome::Buffer(OutputBuffer {
                    index: self.slots.acquire(),
                    payload,
                    pts_us,
                    flags: SampleFlags::key_frame(),
                })),
                None => Ok(DequeueOutcome::TryAgainLater),
            }
        }

        fn release_output(&mut self, index: usize) -> DeviceResult<()> {
            self.slots.release(index)
        }

        fn flush(&mut self) -> DeviceResult<()> {
            self.residual.clear();
            self.residual_pts = None;
            self.packets.clear();
            Ok(())
        }

        fn stop(&mut self) -> DeviceResult<()> {
            require_started(self.started, DeviceOperation::Stop)?;
            self.started = false;
            Ok(())
        }

        fn release(&mut self) -> DeviceResult<()> {
            self.started = false;
            self.encoder = None;
            Ok(())
        }
    }

    impl AudioCodecDevice for OpusAudioDevice {
        fn configure(&mut self, config: &AudioEncoderConfig) -> DeviceResult<()> {
            let sample_rate = match config.sample_rate {
                8000 => SampleRate::Hz8000,
                12000 => SampleRate::Hz12000,
                16000 => SampleRate::Hz16000,
                24000 => SampleRate::Hz24000,
                48000 => SampleRate::Hz48000,
                other => {
                    return Err(DeviceError::new(
                        DeviceOperation::Configure,
                        format!("unsupported Opus sample rate: {}", other),
                    ))
                }
            };
            let channels = match config.channels {
                1 => Channels::Mono,
                2 => Channels::Stereo,
                other => {
                    return Err(DeviceError::new(
                        DeviceOperation::Configure,
                        format!("Opus supports 1 or 2 channels, got {}", other),
                    ))
                }
            };

            let mut encoder = OpusEncoder::new(sample_rate, channels, Application::Audio)
                .map_err(|e| DeviceError::new(DeviceOperation::Configure, format!("{:?}", e)))?;
            encoder
                .set_bitrate(Bitrate::BitsPerSecond(config.bit_rate as i32))
                .map_err(|e| DeviceError::new(DeviceOperation::Configure, format!("{:?}", e)))?;

            self.encoder = Some(encoder);
            self.config = Some(config.clone());
            Ok(())
        }

        fn queue_input(&mut self, chunk: &PcmChunk) -> DeviceResult<bool> {
            require_started(self.started, DeviceOperation::QueueInput)?;
            let (encoder, config) = match (&self.encoder, &self.config) {
                (Some(encoder), Some(config)) => (encoder, config),
                _ => return Err(DeviceError::new(DeviceOperation::QueueInput, "device released")),
            };

            if self.residual_pts.is_none() {
                self.residual_pts = Some(chunk.pts_us);
            }
            self.residual.extend_from_slice(&chunk.samples);

            let frame_samples = Self::frame_samples(config);
            let frame_us = FRAME_MS as i64 * 1000;
            while self.residual.len() >= frame_samples {
                let mut packet = vec![0u8; MAX_PACKET];
                let len = encoder
                    .encode(&self.residual[..frame_samples], &mut packet)
                    .map_err(|e| DeviceError::new(DeviceOperation::QueueInput, format!("{:?}", e)))?;
                packet.truncate(len);

                let pts_us = self.residual_pts.unwrap_or(chunk.pts_us);
                self.packets.push_back((Bytes::from(packet), pts_us));
                self.residual_pts = Some(pts_us + frame_us);
                self.residual.drain(..frame_samples);
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_config() -> VideoEncoderConfig {
        VideoEncoderConfig {
            mime: MIME_VIDEO_PASSTHROUGH.to_string(),
            frame_rate: 10,
            i_frame_interval_secs: 1,
            ..VideoEncoderConfig::new(320, 240)
        }
    }

    #[test]
    fn test_unknown_mime_is_unsupported() {
        let registry = CodecRegistry::with_defaults(MediaClock::new());
        let config = VideoEncoderConfig::default();
        let error = match registry.video_device(&config) {
            Ok(_) => panic!("video/avc should not be registered"),
            Err(error) => error,
        };
        assert_eq!(error.code(), Some(avrec_core::ErrorCode::UnsupportedType));
        assert!(registry.supports(MIME_AUDIO_RAW));
    }

    #[test]
    fn test_passthrough_video_device_flow() {
        let registry = CodecRegistry::with_defaults(MediaClock::new());
        let mut device = registry.video_device(&video_config()).unwrap();
        device.configure(&video_config()).unwrap();
        let mut surface = device.create_input_surface().unwrap();
        device.start().unwrap();

        assert!(matches!(
            device.dequeue_output(Duration::ZERO).unwrap(),
            DequeueOutcome::TryAgainLater
        ));
        assert!(surface.swap_buffers().is_err());

        surface.make_current().unwrap();
        for _ in 0..12 {
            surface.swap_buffers().unwrap();
        }

        assert!(matches!(
            device.dequeue_output(Duration::ZERO).unwrap(),
            DequeueOutcome::FormatChanged(_)
        ));
        let mut key_frames = 0;
        let mut buffers = 0;
        while let DequeueOutcome::Buffer(buffer) = device.dequeue_output(Duration::ZERO).unwrap() {
            if buffer.flags.key_frame {
                key_frames += 1;
            }
            assert_eq!(buffer.payload.len(), 16);
            device.release_output(buffer.index).unwrap();
            buffers += 1;
        }
        assert_eq!(buffers, 12);
        assert_eq!(key_frames, 2);
        assert!(device.release_output(999).is_err());

        surface.release();
        assert!(surface.swap_buffers().is_err());
        device.stop().unwrap();
        device.release().unwrap();
    }

    #[test]
    fn test_passthrough_swap_paces_to_frame_rate() {
        let mut device = PassthroughVideoDevice::new(MIME_VIDEO_PASSTHROUGH, MediaClock::new());
        device
            .configure(&VideoEncoderConfig {
                frame_rate: 50,
                ..video_config()
            })
            .unwrap();
        let mut surface = device.create_input_surface().unwrap();
        surface.make_current().unwrap();

        let started = Instant::now();
        for _ in 0..6 {
            surface.swap_buffers().unwrap();
        }
        // first swap is immediate, the next five wait 20ms each
        assert!(started.elapsed() >= Duration::from_millis(100));

        // a late swap is not followed by a burst of catch-up frames
        thread::sleep(Duration::from_millis(100));
        surface.swap_buffers().unwrap();
        let resumed = Instant::now();
        surface.swap_buffers().unwrap();
        assert!(resumed.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_passthrough_audio_backpressure() {
        let mut device = PassthroughAudioDevice::new(MIME_AUDIO_RAW);
        let chunk = PcmChunk {
            samples: vec![0; 64],
            channels: 1,
            sample_rate: 8_000,
            pts_us: 0,
        };
        assert!(device.queue_input(&chunk).is_err());

        device
            .configure(&AudioEncoderConfig {
                mime: MIME_AUDIO_RAW.to_string(),
                sample_rate: 8_000,
                ..AudioEncoderConfig::default()
            })
            .unwrap();
        device.start().unwrap();

        for _ in 0..PASSTHROUGH_AUDIO_SLOTS {
            assert!(device.queue_input(&chunk).unwrap());
        }
        assert!(!device.queue_input(&chunk).unwrap());

        match device.dequeue_output(Duration::ZERO).unwrap() {
            DequeueOutcome::FormatChanged(format) => {
                assert_eq!(format.kind(), StreamKind::Audio);
                assert_eq!(format.bit_rate, Some(8_000 * 16));
            }
            other => panic!("expected format change, got {:?}", other),
        }
        match device.dequeue_output(Duration::ZERO).unwrap() {
            DequeueOutcome::Buffer(buffer) => assert_eq!(buffer.payload.len(), 128),
            other => panic!("expected buffer, got {:?}", other),
        }
        assert!(device.queue_input(&chunk).unwrap());
    }
}
