//! Audio encode pipeline
//!
//! A single drain thread reads PCM from the source, queues it on the codec
//! device and drains encoded frames in the same loop.

use crate::device::AudioCodecDevice;
use crate::drain::{DrainLoop, PcmInput};
use crate::pipeline::{join_worker, shut_down_device, spawn_worker, EncodeContext, MediaEncoder};
use crate::source::PcmSource;
use avrec_core::{AudioEncoderConfig, PauseGate, RecorderError, RecorderResult, StreamKind};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, info_span, warn};

/// PCM-fed audio encoder with its drain thread
pub struct AudioEncoder {
    config: AudioEncoderConfig,
    device: Option<Box<dyn AudioCodecDevice>>,
    source: Option<Box<dyn PcmSource>>,
    gate: Arc<PauseGate>,
    drain_thread: Option<JoinHandle<()>>,
}

impl AudioEncoder {
    /// Configure the device
    pub fn prepare(
        config: AudioEncoderConfig,
        mut device: Box<dyn AudioCodecDevice>,
        source: Box<dyn PcmSource>,
    ) -> RecorderResult<Self> {
        config.validate()?;

        device
            .configure(&config)
            .map_err(|e| RecorderError::device(StreamKind::Audio, e))?;

        info!(
            device = device.name(),
            mime = %config.mime,
            sample_rate = config.sample_rate,
            channels = config.channels,
            bit_rate = config.bit_rate,
            "Audio encoder prepared"
        );

        Ok(Self {
            config,
            device: Some(device),
            source: Some(source),
            gate: Arc::new(PauseGate::new()),
            drain_thread: None,
        })
    }

    /// Encoder configuration
    pub fn config(&self) -> &AudioEncoderConfig {
        &self.config
    }

    fn release_device(mut device: Box<dyn AudioCodecDevice>) {
        if let Err(e) = device.release() {
            warn!("Audio device release failed: {}", e);
        }
    }
}

impl MediaEncoder for AudioEncoder {
    fn kind(&self) -> StreamKind {
        StreamKind::Audio
    }

    fn gate(&self) -> &Arc<PauseGate> {
        &self.gate
    }

    fn start(&mut self, context: EncodeContext) -> RecorderResult<()> {
        let (mut device, mut source) = match (self.device.take(), self.source.take()) {
            (Some(device), Some(source)) => (device, source),
            _ => {
                return Err(RecorderError::InvalidState {
                    expected: "prepared audio encoder".to_string(),
                    actual: "already started".to_string(),
                })
            }
        };

        if let Err(e) = device.start() {
            Self::release_device(device);
            return Err(RecorderError::StartFailed {
                reason: format!("audio {}", e),
            });
        }
        if let Err(e) = source.start() {
            shut_down_device(&mut *device, StreamKind::Audio);
            return Err(RecorderError::StartFailed {
                reason: e.to_string(),
            });
        }

        self.gate.start();

        let drain = DrainLoop::new(
            StreamKind::Audio,
            device,
            PcmInput::new(source),
            self.gate.clone(),
            context.rebaser,
            context.sink,
            info_span!(parent: &context.span, "audio_drain"),
        );
        match spawn_worker("avrec-audio-drain", move || drain.run()) {
            Ok(handle) => self.drain_thread = Some(handle),
            Err(e) => {
                self.gate.halt();
                return Err(e);
            }
        }

        info!("Audio pipeline started");
        Ok(())
    }

    fn stop(&mut self) {
        self.gate.halt();
        join_worker(self.drain_thread.take(), StreamKind::Audio, "drain");
        if let Some(device) = self.device.take() {
            Self::release_device(device);
        }
        self.source = None;
    }
}

impl Drop for AudioEncoder {
    fn drop(&mut self) {
        self.stop();
    }
}
