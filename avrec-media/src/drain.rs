//! Encoder output drain loop
//!
//! One drain thread per pipeline polls its codec device. Every iteration
//! first feeds pending input, then drains all ready output with zero-timeout
//! polls until the device reports nothing is ready, and only then returns to
//! the pause and stop checks. The thread owns the device and always flushes,
//! stops and releases it on the way out.
//!
//! A pass that forwards nothing goes back to the pause check after a short
//! [`IDLE_BACKOFF`] sleep instead of spinning. It only yields the CPU; no
//! output is ever waited for, and pause and halt are seen within one backoff.
//!
//! After every pause the feeder gets a [`InputFeeder::resumed`] call before
//! it feeds again, even when the pause was too short for this thread to park.

use crate::device::{AudioCodecDevice, CodecDevice, DequeueOutcome, OutputBuffer};
use crate::pipeline::EncodedStreamSink;
use crate::source::{PcmChunk, PcmSource};
use avrec_core::{
    EncodedSample, PauseGate, PtsRebaser, RecorderError, RecorderResult, StreamFormat, StreamKind,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn, Span};

/// Sleep after a pass that forwarded nothing
pub const IDLE_BACKOFF: Duration = Duration::from_micros(500);

/// Pushes raw input into a device ahead of each drain
pub trait InputFeeder<D: ?Sized>: Send {
    /// Feed whatever input is ready
    fn feed(&mut self, device: &mut D) -> RecorderResult<()>;

    /// The pipeline came back from a pause
    fn resumed(&mut self) {}

    /// Release input resources when the loop exits
    fn close(&mut self) {}
}

/// Input for surface-fed devices; frames arrive from the render thread
#[derive(Debug, Default)]
pub struct SurfaceInput;

impl<D: ?Sized> InputFeeder<D> for SurfaceInput {
    fn feed(&mut self, _device: &mut D) -> RecorderResult<()> {
        Ok(())
    }
}

/// Input read from a PCM source and queued on an audio device
pub struct PcmInput {
    source: Box<dyn PcmSource>,
    held: Option<PcmChunk>,
}

impl PcmInput {
    /// Wrap a started source
    pub fn new(source: Box<dyn PcmSource>) -> Self {
        Self { source, held: None }
    }
}

impl<D: AudioCodecDevice + ?Sized> InputFeeder<D> for PcmInput {
    fn feed(&mut self, device: &mut D) -> RecorderResult<()> {
        let chunk = match self.held.take() {
            Some(chunk) => chunk,
            None => match self.source.read()? {
                Some(chunk) => chunk,
                None => return Ok(()),
            },
        };

        let accepted = device
            .queue_input(&chunk)
            .map_err(|e| RecorderError::device(StreamKind::Audio, e))?;
        if !accepted {
            trace!(pts_us = chunk.pts_us, "No input slot free, holding chunk");
            self.held = Some(chunk);
        }
        Ok(())
    }

    fn resumed(&mut self) {
        self.source.resume();
    }

    fn close(&mut self) {
        self.source.stop();
    }
}

/// Drain loop for one pipeline
pub struct DrainLoop<D: CodecDevice + ?Sized, F: InputFeeder<D>> {
    kind: StreamKind,
    device: Box<D>,
    feeder: F,
    gate: Arc<PauseGate>,
    rebaser: Arc<PtsRebaser>,
    sink: Arc<dyn EncodedStreamSink>,
    span: Span,
    format_seen: bool,
    forwarded: u64,
    pauses_seen: u64,
}

impl<D: CodecDevice + ?Sized, F: InputFeeder<D>> DrainLoop<D, F> {
    /// Create a drain loop over a started device
    pub fn new(
        kind: StreamKind,
        device: Box<D>,
        feeder: F,
        gate: Arc<PauseGate>,
        rebaser: Arc<PtsRebaser>,
        sink: Arc<dyn EncodedStreamSink>,
        span: Span,
    ) -> Self {
        Self {
            kind,
            device,
            feeder,
            gate,
            rebaser,
            sink,
            span,
            format_seen: false,
            forwarded: 0,
            pauses_seen: 0,
        }
    }

    /// Run until the gate is halted, then shut the device down
    pub fn run(mut self) {
        let span = self.span.clone();
        let _entered = span.enter();
        info!(stream = %self.kind, device = self.device.name(), "Drain thread started");

        while self.gate.is_running() {
            if self.gate.wait_while_paused() {
                continue;
            }
            if !self.catch_up_on_pauses() {
                continue;
            }

            match self.step() {
                Ok(0) => thread::sleep(IDLE_BACKOFF),
                Ok(_) => {}
                Err(e) => {
                    error!(stream = %self.kind, "Encoder output failed: {}", e);
                    self.gate.halt();
                    self.sink.on_failure(e);
                }
            }
        }

        self.shutdown();
    }

    /// Tell the feeder about pauses it has not seen yet
    ///
    /// Returns `false` while a pause is still in effect so the caller parks
    /// before feeding.
    fn catch_up_on_pauses(&mut self) -> bool {
        let pauses = self.gate.pause_count();
        if pauses == self.pauses_seen {
            return true;
        }
        if self.gate.is_paused() {
            return false;
        }
        debug!(stream = %self.kind, "Resuming input after pause");
        self.pauses_seen = pauses;
        self.feeder.resumed();
        true
    }

    /// One iteration: feed input, then drain output
    pub fn step(&mut self) -> RecorderResult<usize> {
        self.feeder.feed(&mut *self.device)?;
        self.drain_once()
    }

    /// Forward every buffer the device has ready
    ///
    /// Polls with a zero timeout until the device reports nothing is ready
    /// and returns how many samples reached the sink.
    pub fn drain_once(&mut self) -> RecorderResult<usize> {
        let mut forwarded = 0;
        loop {
            match self.dequeue()? {
                DequeueOutcome::TryAgainLater => break,
                DequeueOutcome::FormatChanged(format) => self.handle_format(format)?,
                DequeueOutcome::Buffer(buffer) => {
                    let index = buffer.index;
                    let result = self.forward(buffer);
                    self.device
                        .release_output(index)
                        .map_err(|e| RecorderError::device(self.kind, e))?;
                    if result? {
                        forwarded += 1;
                    }
                }
            }
        }
        self.forwarded += forwarded as u64;
        Ok(forwarded)
    }

    /// Total samples forwarded so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    fn dequeue(&mut self) -> RecorderResult<DequeueOutcome> {
        self.device
            .dequeue_output(Duration::ZERO)
            .map_err(|e| RecorderError::device(self.kind, e))
    }

    fn handle_format(&mut self, format: StreamFormat) -> RecorderResult<()> {
        if self.format_seen {
            warn!(stream = %self.kind, mime = %format.mime, "Ignoring repeated output format change");
            return Ok(());
        }
        if format.kind() != self.kind {
            return Err(RecorderError::EncodeFailed {
                stream: self.kind,
                reason: format!("device reported a {} format", format.kind()),
            });
        }
        info!(stream = %self.kind, mime = %format.mime, "Output format available");
        self.format_seen = true;
        self.sink.on_format_changed(format)
    }

    fn forward(&mut self, buffer: OutputBuffer) -> RecorderResult<bool> {
        if !self.format_seen {
            return Err(RecorderError::EncodeFailed {
                stream: self.kind,
                reason: "output buffer before format change".to_string(),
            });
        }
        if buffer.flags.codec_config {
            debug!(stream = %self.kind, len = buffer.payload.len(), "Skipping codec config buffer");
            return Ok(false);
        }
        if buffer.payload.is_empty() {
            return Ok(false);
        }

        let pts_us = match self.rebaser.rebase(self.kind, buffer.pts_us) {
            Some(pts_us) => pts_us,
            None => {
                trace!(stream = %self.kind, pts_us = buffer.pts_us, "Dropping sample before origin");
                return Ok(false);
            }
        };

        let sample = EncodedSample::new(self.kind, buffer.payload, pts_us, buffer.flags);
        self.sink.on_encoded(sample)?;
        Ok(true)
    }

    fn shutdown(mut self) {
        self.feeder.close();

        if let Err(e) = self.device.flush() {
            warn!(stream = %self.kind, "Device flush failed: {}", e);
        }
        if let Err(e) = self.device.stop() {
            warn!(stream = %self.kind, "Device stop failed: {}", e);
        }
        if let Err(e) = self.device.release() {
            warn!(stream = %self.kind, "Device release failed: {}", e);
        }
        info!(
            stream = %self.kind,
            samples = self.forwarded,
            "Drain thread finished"
        );
    }
}
