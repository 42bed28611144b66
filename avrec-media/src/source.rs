//! Raw PCM sources feeding the audio pipeline

use crate::error::{MediaError, MediaResult};
use avrec_core::{AudioEncoderConfig, MediaClock};
use bytes::{BufMut, Bytes, BytesMut};
use std::f32::consts::TAU;

/// Interleaved 16-bit PCM with its capture timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    /// Interleaved samples
    pub samples: Vec<i16>,
    /// Channel count
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Capture time of the first frame, microseconds
    pub pts_us: i64,
}

impl PcmChunk {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration covered by the chunk
    pub fn duration_us(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as i64 * 1_000_000 / self.sample_rate as i64
    }

    /// Little-endian byte representation
    pub fn to_le_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            buf.put_i16_le(*sample);
        }
        buf.freeze()
    }
}

/// Producer of raw audio for the audio encoder
///
/// `read` must not block for long: the audio drain thread calls it on every
/// loop iteration and returns to its pause/stop checks in between.
pub trait PcmSource: Send {
    /// Begin capturing
    fn start(&mut self) -> MediaResult<()>;

    /// Next chunk if one is ready
    fn read(&mut self) -> MediaResult<Option<PcmChunk>>;

    /// Continue after a pause
    ///
    /// Runs on the audio drain thread once the pipeline is released from a
    /// pause. Audio captured while paused must not come out of `read`
    /// afterwards; sources that keep capturing in the background drop it here.
    fn resume(&mut self) {}

    /// Stop capturing
    fn stop(&mut self);
}

/// Sine tone generator paced by a media clock
///
/// Produces chunks only as fast as real time allows, so timestamps line up
/// with a video device driven by the same clock.
#[derive(Debug)]
pub struct ToneSource {
    clock: MediaClock,
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    frequency_hz: f32,
    amplitude: f32,
    start_us: Option<i64>,
    produced_frames: u64,
}

impl ToneSource {
    /// Create a 440 Hz tone matching an encoder configuration
    pub fn new(config: &AudioEncoderConfig, clock: MediaClock) -> Self {
        Self {
            clock,
            sample_rate: config.sample_rate,
            channels: config.channels,
            chunk_frames: config.chunk_frames,
            frequency_hz: 440.0,
            amplitude: 0.25,
            start_us: None,
            produced_frames: 0,
        }
    }

    /// Change the tone frequency
    pub fn with_frequency(mut self, frequency_hz: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    fn frame_pts(&self, start_us: i64, frame: u64) -> i64 {
        start_us + (frame as i64 * 1_000_000) / self.sample_rate as i64
    }
}

impl PcmSource for ToneSource {
    fn start(&mut self) -> MediaResult<()> {
        if self.sample_rate == 0 || self.channels == 0 || self.chunk_frames == 0 {
            return Err(MediaError::Source {
                reason: "tone source needs a sample rate, channels and chunk size".to_string(),
            });
        }
        self.start_us = Some(self.clock.now_us());
        self.produced_frames = 0;
        Ok(())
    }

    fn read(&mut self) -> MediaResult<Option<PcmChunk>> {
        let start_us = match self.start_us {
            Some(start_us) => start_us,
            None => {
                return Err(MediaError::Source {
                    reason: "read before start".to_string(),
                })
            }
        };

        let elapsed_us = (self.clock.now_us() - start_us).max(0) as u64;
        let due_frames = elapsed_us * self.sample_rate as u64 / 1_000_000;
        if due_frames < self.produced_frames + self.chunk_frames as u64 {
            return Ok(None);
        }

        let first = self.produced_frames;
        let step = TAU * self.frequency_hz / self.sample_rate as f32;
        let mut samples = Vec::with_capacity(self.chunk_frames * self.channels as usize);
        for frame in first..first + self.chunk_frames as u64 {
            let phase = (frame % self.sample_rate as u64) as f32 * step;
            let value = (phase.sin() * self.amplitude * i16::MAX as f32) as i16;
            for _ in 0..self.channels {
                samples.push(value);
            }
        }
        self.produced_frames += self.chunk_frames as u64;

        Ok(Some(PcmChunk {
            samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
            pts_us: self.frame_pts(start_us, first),
        }))
    }

    fn resume(&mut self) {
        if self.start_us.is_some() {
            self.start_us = Some(self.clock.now_us());
            self.produced_frames = 0;
        }
    }

    fn stop(&mut self) {
        self.start_us = None;
    }
}
