//! Video encode pipeline
//!
//! Two threads per session: the render thread draws frames onto the codec's
//! input surface and presents them, the drain thread pulls encoded access
//! units out of the device. Both share one [`PauseGate`].
//!
//! The render loop does not pace itself. It draws and presents as fast as
//! the surface accepts frames; a device whose `swap_buffers` blocks until the
//! encoder wants the next frame sets the frame rate.

use crate::device::VideoCodecDevice;
use crate::drain::{DrainLoop, SurfaceInput};
use crate::pipeline::{join_worker, shut_down_device, spawn_worker, EncodeContext, EncodedStreamSink, MediaEncoder};
use crate::render::{FrameRenderer, InputSurface, RenderResult};
use avrec_core::{PauseGate, RecorderError, RecorderResult, StreamKind, VideoEncoderConfig};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, info_span, warn};

/// Surface-fed video encoder with its render and drain threads
pub struct VideoEncoder {
    config: VideoEncoderConfig,
    device: Option<Box<dyn VideoCodecDevice>>,
    surface: Option<Box<dyn InputSurface>>,
    renderer: Option<Box<dyn FrameRenderer>>,
    gate: Arc<PauseGate>,
    render_thread: Option<JoinHandle<()>>,
    drain_thread: Option<JoinHandle<()>>,
}

impl VideoEncoder {
    /// Configure the device and create its input surface
    pub fn prepare(
        config: VideoEncoderConfig,
        mut device: Box<dyn VideoCodecDevice>,
        renderer: Box<dyn FrameRenderer>,
    ) -> RecorderResult<Self> {
        config.validate()?;

        device
            .configure(&config)
            .map_err(|e| RecorderError::device(StreamKind::Video, e))?;
        let surface = match device.create_input_surface() {
            Ok(surface) => surface,
            Err(e) => {
                if let Err(release) = device.release() {
                    warn!("Video device release after failed prepare: {}", release);
                }
                return Err(RecorderError::device(StreamKind::Video, e));
            }
        };

        info!(
            device = device.name(),
            mime = %config.mime,
            width = config.width,
            height = config.height,
            frame_rate = config.frame_rate,
            bit_rate = config.effective_bit_rate(),
            "Video encoder prepared"
        );

        Ok(Self {
            config,
            device: Some(device),
            surface: Some(surface),
            renderer: Some(renderer),
            gate: Arc::new(PauseGate::new()),
            render_thread: None,
            drain_thread: None,
        })
    }

    /// Encoder configuration
    pub fn config(&self) -> &VideoEncoderConfig {
        &self.config
    }

    /// Release resources of an encoder that never started
    fn release_unstarted(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.release();
        }
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.release() {
                warn!("Video device release failed: {}", e);
            }
        }
    }
}

impl MediaEncoder for VideoEncoder {
    fn kind(&self) -> StreamKind {
        StreamKind::Video
    }

    fn gate(&self) -> &Arc<PauseGate> {
        &self.gate
    }

    fn start(&mut self, context: EncodeContext) -> RecorderResult<()> {
        let (mut device, surface, renderer) =
            match (self.device.take(), self.surface.take(), self.renderer.take()) {
                (Some(device), Some(surface), Some(renderer)) => (device, surface, renderer),
                _ => {
                    return Err(RecorderError::InvalidState {
                        expected: "prepared video encoder".to_string(),
                        actual: "already started".to_string(),
                    })
                }
            };

        if let Err(e) = device.start() {
            self.device = Some(device);
            self.surface = Some(surface);
            self.release_unstarted();
            return Err(RecorderError::StartFailed {
                reason: format!("video {}", e),
            });
        }

        self.gate.start();

        let render = RenderLoop {
            surface,
            renderer,
            gate: self.gate.clone(),
            sink: context.sink.clone(),
            width: self.config.width,
            height: self.config.height,
        };
        let span = info_span!(parent: &context.span, "video_render");
        let spawned = spawn_worker("avrec-video-render", move || {
            let _entered = span.enter();
            render.run()
        });
        match spawned {
            Ok(handle) => self.render_thread = Some(handle),
            Err(e) => {
                self.gate.halt();
                shut_down_device(&mut *device, StreamKind::Video);
                return Err(e);
            }
        }

        let drain = DrainLoop::new(
            StreamKind::Video,
            device,
            SurfaceInput,
            self.gate.clone(),
            context.rebaser,
            context.sink,
            info_span!(parent: &context.span, "video_drain"),
        );
        match spawn_worker("avrec-video-drain", move || drain.run()) {
            Ok(handle) => self.drain_thread = Some(handle),
            Err(e) => {
                self.stop();
                return Err(e);
            }
        }

        info!("Video pipeline started");
        Ok(())
    }

    fn stop(&mut self) {
        self.gate.halt();
        join_worker(self.render_thread.take(), StreamKind::Video, "render");
        join_worker(self.drain_thread.take(), StreamKind::Video, "drain");
        self.release_unstarted();
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RenderLoop {
    surface: Box<dyn InputSurface>,
    renderer: Box<dyn FrameRenderer>,
    gate: Arc<PauseGate>,
    sink: Arc<dyn EncodedStreamSink>,
    width: u32,
    height: u32,
}

impl RenderLoop {
    fn run(mut self) {
        let mut context_ready = false;

        while self.gate.is_running() {
            if self.gate.wait_while_paused() {
                continue;
            }

            if let Err(e) = self.render_frame(&mut context_ready) {
                error!("Render thread failed: {}", e);
                self.gate.halt();
                self.sink.on_failure(RecorderError::EncodeFailed {
                    stream: StreamKind::Video,
                    reason: e.to_string(),
                });
            }
        }

        if context_ready {
            self.renderer.on_context_destroyed();
        }
        self.surface.release();
        info!("Render thread finished");
    }

    fn render_frame(&mut self, context_ready: &mut bool) -> RenderResult<()> {
        if !*context_ready {
            self.surface.make_current()?;
            self.renderer.on_context_created();
            self.renderer.on_surface_changed(self.width, self.height);
            *context_ready = true;
        }
        self.renderer.on_draw_frame()?;
        self.surface.swap_buffers()
    }
}
