//! Recording session controller
//!
//! A [`Recorder`] owns one video pipeline, one audio pipeline and the muxer
//! they share, all bound to a single output file. It sequences
//! `prepare -> start -> (pause | resume)* -> stop` and is the only place
//! where internal failures become public [`RecorderEvent`]s.
//!
//! A recorder is single use: once it reaches `Stopped` or `Failed` a new one
//! has to be built for the next recording.

use crate::config::RecorderConfig;
use crate::event::{self, RecorderEvent, RecorderEvents};
use crate::session::{Session, TrackRouter, TrackSink};
use avrec_core::{
    AudioEncoderConfig, MediaClock, PipelineState, PtsRebaser, RecorderError, RecorderResult,
    StreamKind, VideoEncoderConfig,
};
use avrec_media::{
    AudioEncoder, CodecRegistry, EncodeContext, FrameRenderer, MediaEncoder, MediaError, Muxer,
    PcmSource, RenderResult, ToneSource, VideoEncoder,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

/// Outcome of a completed recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    /// Finished container file
    pub output: PathBuf,
    /// Recorded duration in microseconds
    pub duration_us: i64,
    /// Video samples in the file
    pub video_samples: u64,
    /// Audio samples in the file
    pub audio_samples: u64,
    /// Size of the container in bytes
    pub bytes_written: u64,
}

/// Builder for [`Recorder`]
///
/// Frame rendering, PCM capture and codec devices are all pluggable. Left
/// unset, the recorder draws nothing into the video surface, records a test
/// tone and uses [`CodecRegistry::with_defaults`]. A custom registry and
/// audio source should share the recorder's [`MediaClock`] so both streams
/// are stamped on the same timeline.
pub struct RecorderBuilder {
    config: RecorderConfig,
    registry: Option<CodecRegistry>,
    clock: MediaClock,
    renderer: Option<Box<dyn FrameRenderer>>,
    audio_source: Option<Box<dyn PcmSource>>,
}

impl RecorderBuilder {
    /// Start from a configuration
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            registry: None,
            clock: MediaClock::new(),
            renderer: None,
            audio_source: None,
        }
    }

    /// Set the output file
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    /// Set video encoder settings
    pub fn video(mut self, video: VideoEncoderConfig) -> Self {
        self.config.video = video;
        self
    }

    /// Set audio encoder settings
    pub fn audio(mut self, audio: AudioEncoderConfig) -> Self {
        self.config.audio = audio;
        self
    }

    /// Use a custom codec registry
    pub fn codec_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Clock shared by the default devices and audio source
    pub fn clock(mut self, clock: MediaClock) -> Self {
        self.clock = clock;
        self
    }

    /// Renderer drawing each video frame
    pub fn renderer(mut self, renderer: impl FrameRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    /// PCM source feeding the audio encoder
    pub fn audio_source(mut self, source: impl PcmSource + 'static) -> Self {
        self.audio_source = Some(Box::new(source));
        self
    }

    /// Create the recorder and its event stream
    pub fn build(self) -> (Recorder, RecorderEvents) {
        let id = Uuid::new_v4();
        let (sender, events) = event::channel();
        let clock = self.clock;

        let registry = self
            .registry
            .unwrap_or_else(|| CodecRegistry::with_defaults(clock));
        let renderer = self
            .renderer
            .unwrap_or_else(|| Box::new(|| -> RenderResult<()> { Ok(()) }));
        let audio_source = self
            .audio_source
            .unwrap_or_else(|| Box::new(ToneSource::new(&self.config.audio, clock)));

        let recorder = Recorder {
            id,
            span: info_span!("recorder", session = %id),
            config: self.config,
            registry,
            renderer: Some(renderer),
            audio_source: Some(audio_source),
            session: Arc::new(Session::new(id, sender)),
            rebaser: Arc::new(PtsRebaser::new()),
            pipelines: Vec::new(),
            router: None,
            output_created: false,
        };
        (recorder, events)
    }
}

/// Controller for one recording session
pub struct Recorder {
    id: Uuid,
    span: Span,
    config: RecorderConfig,
    registry: CodecRegistry,
    renderer: Option<Box<dyn FrameRenderer>>,
    audio_source: Option<Box<dyn PcmSource>>,
    session: Arc<Session>,
    rebaser: Arc<PtsRebaser>,
    pipelines: Vec<Box<dyn MediaEncoder>>,
    router: Option<Arc<TrackRouter>>,
    output_created: bool,
}

impl Recorder {
    /// Create a recorder with default collaborators
    pub fn new(config: RecorderConfig) -> (Self, RecorderEvents) {
        RecorderBuilder::new(config).build()
    }

    /// Start building a recorder
    pub fn builder(config: RecorderConfig) -> RecorderBuilder {
        RecorderBuilder::new(config)
    }

    /// Session id, also attached to every log line of the session
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current session state
    pub fn state(&self) -> PipelineState {
        self.session.state()
    }

    /// Session configuration
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Output container path
    pub fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    /// Configure both encoders and create the output file
    ///
    /// On failure the session moves to `Failed`, a `Failed` event is emitted
    /// and the error is returned.
    pub fn prepare(&mut self) -> RecorderResult<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        self.session.state().expect_one_of(&[PipelineState::Idle])?;

        if let Err(e) = self.prepare_session() {
            self.abort(e.clone());
            return Err(e);
        }

        self.session
            .transition(&[PipelineState::Idle], PipelineState::Prepared, || {}, None)?;
        info!(output = %self.config.output_path.display(), "Recording prepared");
        Ok(())
    }

    fn prepare_session(&mut self) -> RecorderResult<()> {
        self.config.validate()?;

        let video_device = self.registry.video_device(&self.config.video)?;
        let audio_device = self.registry.audio_device(&self.config.audio)?;

        let path = self.config.output_path.clone();
        let muxer = match Muxer::create(&path, 2) {
            Ok(muxer) => muxer,
            Err(MediaError::Io { source }) => return Err(RecorderError::create_file(path, source)),
            Err(e) => return Err(e.into()),
        };
        self.output_created = true;
        self.router = Some(Arc::new(TrackRouter::new(
            muxer,
            self.config.pending_sample_limit,
        )));

        let renderer = self.renderer.take().ok_or_else(|| already_consumed("renderer"))?;
        let video = VideoEncoder::prepare(self.config.video.clone(), video_device, renderer)?;
        self.pipelines.push(Box::new(video));

        let source = self
            .audio_source
            .take()
            .ok_or_else(|| already_consumed("audio source"))?;
        let audio = AudioEncoder::prepare(self.config.audio.clone(), audio_device, source)?;
        self.pipelines.push(Box::new(audio));

        Ok(())
    }

    /// Start both pipelines
    pub fn start(&mut self) -> RecorderResult<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        self.session.state().expect_one_of(&[PipelineState::Prepared])?;
        let router = match &self.router {
            Some(router) => router.clone(),
            None => return Err(already_consumed("muxer")),
        };

        for index in 0..self.pipelines.len() {
            let pipeline = &mut self.pipelines[index];
            let kind = pipeline.kind();
            self.session.register_gate(pipeline.gate().clone());

            let mut sink = TrackSink::new(kind, self.session.clone(), router.clone());
            if kind == StreamKind::Video {
                sink = sink.with_progress(self.config.progress_interval_ms);
            }
            let context = EncodeContext {
                rebaser: self.rebaser.clone(),
                sink: Arc::new(sink),
                span: span.clone(),
            };

            if let Err(e) = pipeline.start(context) {
                drop(router);
                self.abort(e.clone());
                return Err(e);
            }
        }
        drop(router);

        let started = self.session.transition(
            &[PipelineState::Prepared],
            PipelineState::Running,
            || {},
            Some(RecorderEvent::Started),
        );
        if let Err(e) = started {
            // a worker failed before the session was marked running
            let error = self.session.failure().unwrap_or(e);
            self.stop_pipelines();
            self.discard_output();
            return Err(error);
        }

        info!("Recording started");
        Ok(())
    }

    /// Park both pipelines
    pub fn pause(&mut self) -> RecorderResult<()> {
        let pipelines = &self.pipelines;
        self.session.transition(
            &[PipelineState::Running],
            PipelineState::Paused,
            || pipelines.iter().for_each(|pipeline| pipeline.pause()),
            Some(RecorderEvent::Paused),
        )?;
        Ok(())
    }

    /// Wake both pipelines
    pub fn resume(&mut self) -> RecorderResult<()> {
        let pipelines = &self.pipelines;
        self.session.transition(
            &[PipelineState::Paused],
            PipelineState::Running,
            || pipelines.iter().for_each(|pipeline| pipeline.resume()),
            Some(RecorderEvent::Resumed),
        )?;
        Ok(())
    }

    /// Stop both pipelines and finalize the container
    ///
    /// Blocks until every worker thread has released its device. Emits
    /// exactly one of `Completed` or `Failed`; a recording with no samples
    /// on either track fails with `ERROR_ENCODE_FAILED` and leaves no file.
    pub fn stop(&mut self) -> RecorderResult<RecordingSummary> {
        let span = self.span.clone();
        let _entered = span.enter();

        let stopping = self.session.transition(
            &[
                PipelineState::Prepared,
                PipelineState::Running,
                PipelineState::Paused,
            ],
            PipelineState::Stopping,
            || {},
            None,
        );
        if let Err(e) = stopping {
            self.reap();
            return Err(e);
        }

        self.stop_pipelines();

        if let Some(failure) = self.session.failure() {
            self.discard_output();
            return Err(failure);
        }

        match self.finalize() {
            Ok(summary) => {
                self.session.transition(
                    &[PipelineState::Stopping],
                    PipelineState::Stopped,
                    || {},
                    Some(RecorderEvent::Completed {
                        output: summary.output.clone(),
                    }),
                )?;
                info!(
                    duration_us = summary.duration_us,
                    video_samples = summary.video_samples,
                    audio_samples = summary.audio_samples,
                    bytes = summary.bytes_written,
                    "Recording completed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.session.fail(e.clone());
                self.discard_output();
                Err(e)
            }
        }
    }

    /// Abandon the recording and delete the partial output
    pub fn cancel(&mut self) -> RecorderResult<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        let stopping = self.session.transition(
            &[
                PipelineState::Prepared,
                PipelineState::Running,
                PipelineState::Paused,
            ],
            PipelineState::Stopping,
            || {},
            None,
        );
        if let Err(e) = stopping {
            self.reap();
            return Err(e);
        }

        self.stop_pipelines();
        self.discard_output();

        let cancelled = self.session.transition(
            &[PipelineState::Stopping],
            PipelineState::Stopped,
            || {},
            Some(RecorderEvent::Cancelled),
        );
        match cancelled {
            Ok(_) => {
                info!("Recording cancelled");
                Ok(())
            }
            Err(e) => Err(self.session.failure().unwrap_or(e)),
        }
    }

    fn finalize(&mut self) -> RecorderResult<RecordingSummary> {
        let router = match self.router.take() {
            Some(router) => router,
            None => return Err(already_consumed("muxer")),
        };

        for kind in [StreamKind::Video, StreamKind::Audio] {
            if !router.has_stream(kind) {
                return Err(RecorderError::EncodeFailed {
                    stream: kind,
                    reason: "no output was produced".to_string(),
                });
            }
        }

        let stats = router.finish()?;
        let video_samples = stats.samples(StreamKind::Video);
        let audio_samples = stats.samples(StreamKind::Audio);
        for (kind, samples) in [
            (StreamKind::Video, video_samples),
            (StreamKind::Audio, audio_samples),
        ] {
            if samples == 0 {
                return Err(RecorderError::EncodeFailed {
                    stream: kind,
                    reason: "no samples were recorded".to_string(),
                });
            }
        }

        Ok(RecordingSummary {
            output: self.config.output_path.clone(),
            duration_us: stats.duration_us(),
            video_samples,
            audio_samples,
            bytes_written: stats.bytes_written,
        })
    }

    fn abort(&mut self, error: RecorderError) {
        self.session.fail(error);
        self.stop_pipelines();
        self.discard_output();
    }

    /// Halt and join every pipeline; devices are released on return
    fn stop_pipelines(&mut self) {
        for pipeline in self.pipelines.iter_mut() {
            pipeline.stop();
        }
        self.pipelines.clear();
    }

    /// Join whatever is left after a terminal state was reached
    fn reap(&mut self) {
        self.stop_pipelines();
        if self.session.state() == PipelineState::Failed {
            self.discard_output();
        }
    }

    fn discard_output(&mut self) {
        // close the file before removing it
        self.router = None;
        if !self.output_created {
            return;
        }
        self.output_created = false;

        match std::fs::remove_file(&self.config.output_path) {
            Ok(()) => debug!(output = %self.config.output_path.display(), "Partial output removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                output = %self.config.output_path.display(),
                "Failed to remove partial output: {}", e
            ),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        match self.session.state() {
            PipelineState::Prepared | PipelineState::Running | PipelineState::Paused => {
                if let Err(e) = self.cancel() {
                    warn!(session = %self.id, "Cancel on drop failed: {}", e);
                }
            }
            _ => self.reap(),
        }
    }
}

fn already_consumed(what: &str) -> RecorderError {
    RecorderError::InvalidState {
        expected: format!("{} available", what),
        actual: "consumed by an earlier prepare".to_string(),
    }
}
