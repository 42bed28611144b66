//! Integration tests for the encode pipelines
//!
//! Pipelines run on real threads with the passthrough devices, or with
//! wrappers that inject failures into a device.

use avrec_core::*;
use avrec_media::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// TEST HELPERS
// ============================================================================

#[derive(Default)]
struct CollectingSink {
    formats: Mutex<Vec<StreamFormat>>,
    samples: Mutex<Vec<EncodedSample>>,
    failures: Mutex<Vec<RecorderError>>,
}

impl EncodedStreamSink for CollectingSink {
    fn on_format_changed(&self, format: StreamFormat) -> RecorderResult<()> {
        self.formats.lock().push(format);
        Ok(())
    }

    fn on_encoded(&self, sample: EncodedSample) -> RecorderResult<()> {
        self.samples.lock().push(sample);
        Ok(())
    }

    fn on_failure(&self, error: RecorderError) {
        self.failures.lock().push(error);
    }
}

fn context(sink: Arc<CollectingSink>, rebaser: Arc<PtsRebaser>) -> EncodeContext {
    EncodeContext {
        rebaser,
        sink,
        span: tracing::Span::none(),
    }
}

fn video_config() -> VideoEncoderConfig {
    VideoEncoderConfig {
        mime: MIME_VIDEO_PASSTHROUGH.to_string(),
        frame_rate: 60,
        ..VideoEncoderConfig::new(320, 240)
    }
}

fn audio_config() -> AudioEncoderConfig {
    AudioEncoderConfig {
        mime: MIME_AUDIO_RAW.to_string(),
        sample_rate: 16_000,
        chunk_frames: 160,
        ..AudioEncoderConfig::default()
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Wraps a device to count lifecycle calls and fail dequeue on demand
struct InstrumentedVideoDevice {
    inner: PassthroughVideoDevice,
    fail_dequeue: Arc<AtomicBool>,
    released: Arc<AtomicUsize>,
}

impl CodecDevice for InstrumentedVideoDevice {
    fn name(&self) -> &str {
        "instrumented-video"
    }

    fn start(&mut self) -> DeviceResult<()> {
        self.inner.start()
    }

    fn dequeue_output(&mut self, timeout: Duration) -> DeviceResult<DequeueOutcome> {
        if self.fail_dequeue.load(Ordering::SeqCst) {
            return Err(DeviceError::new(DeviceOperation::DequeueOutput, "hardware fault"));
        }
        self.inner.dequeue_output(timeout)
    }

    fn release_output(&mut self, index: usize) -> DeviceResult<()> {
        self.inner.release_output(index)
    }

    fn flush(&mut self) -> DeviceResult<()> {
        self.inner.flush()
    }

    fn stop(&mut self) -> DeviceResult<()> {
        self.inner.stop()
    }

    fn release(&mut self) -> DeviceResult<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release()
    }
}

impl VideoCodecDevice for InstrumentedVideoDevice {
    fn configure(&mut self, config: &VideoEncoderConfig) -> DeviceResult<()> {
        self.inner.configure(config)
    }

    fn create_input_surface(&mut self) -> DeviceResult<Box<dyn InputSurface>> {
        self.inner.create_input_surface()
    }
}

struct CountingRenderer {
    frames: Arc<AtomicUsize>,
    lifecycle: Arc<Mutex<Vec<&'static str>>>,
}

impl FrameRenderer for CountingRenderer {
    fn on_context_created(&mut self) {
        self.lifecycle.lock().push("created");
    }

    fn on_surface_changed(&mut self, _width: u32, _height: u32) {
        self.lifecycle.lock().push("changed");
    }

    fn on_draw_frame(&mut self) -> RenderResult<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_context_destroyed(&mut self) {
        self.lifecycle.lock().push("destroyed");
    }
}

// ============================================================================
// VIDEO PIPELINE TESTS
// ============================================================================

#[test]
fn test_video_pipeline_encodes_and_stops() {
    let clock = MediaClock::new();
    let frames = Arc::new(AtomicUsize::new(0));
    let lifecycle = Arc::new(Mutex::new(Vec::new()));
    let renderer = CountingRenderer {
        frames: frames.clone(),
        lifecycle: lifecycle.clone(),
    };

    let device = Box::new(PassthroughVideoDevice::new(MIME_VIDEO_PASSTHROUGH, clock));
    let mut encoder = VideoEncoder::prepare(video_config(), device, Box::new(renderer)).unwrap();

    let sink = Arc::new(CollectingSink::default());
    encoder
        .start(context(sink.clone(), Arc::new(PtsRebaser::new())))
        .unwrap();

    assert!(wait_for(|| sink.samples.lock().len() >= 5));
    encoder.stop();

    assert_eq!(sink.formats.lock().len(), 1);
    assert!(sink.failures.lock().is_empty());
    assert_eq!(
        *lifecycle.lock(),
        vec!["created", "changed", "destroyed"]
    );

    let samples = sink.samples.lock();
    assert_eq!(samples[0].pts_us(), 0);
    assert!(samples[0].flags().key_frame);
    assert!(samples.windows(2).all(|pair| pair[0].pts_us() <= pair[1].pts_us()));
    assert!(samples.len() <= frames.load(Ordering::SeqCst));
}

#[test]
fn test_paused_pipeline_produces_nothing() {
    let clock = MediaClock::new();
    let device = Box::new(PassthroughVideoDevice::new(MIME_VIDEO_PASSTHROUGH, clock));
    let renderer = || -> RenderResult<()> { Ok(()) };
    let mut encoder = VideoEncoder::prepare(video_config(), device, Box::new(renderer)).unwrap();

    let sink = Arc::new(CollectingSink::default());
    encoder
        .start(context(sink.clone(), Arc::new(PtsRebaser::new())))
        .unwrap();
    assert!(wait_for(|| !sink.samples.lock().is_empty()));

    encoder.pause();
    // let in-flight iterations settle
    thread::sleep(Duration::from_millis(50));
    let paused_count = sink.samples.lock().len();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(sink.samples.lock().len(), paused_count);

    encoder.resume();
    assert!(wait_for(|| sink.samples.lock().len() > paused_count));

    let started = Instant::now();
    encoder.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_stop_while_paused_releases_device() {
    let released = Arc::new(AtomicUsize::new(0));
    let device = Box::new(InstrumentedVideoDevice {
        inner: PassthroughVideoDevice::new(MIME_VIDEO_PASSTHROUGH, MediaClock::new()),
        fail_dequeue: Arc::new(AtomicBool::new(false)),
        released: released.clone(),
    });
    let renderer = || -> RenderResult<()> { Ok(()) };
    let mut encoder = VideoEncoder::prepare(video_config(), device, Box::new(renderer)).unwrap();

    let sink = Arc::new(CollectingSink::default());
    encoder
        .start(context(sink.clone(), Arc::new(PtsRebaser::new())))
        .unwrap();
    encoder.pause();
    thread::sleep(Duration::from_millis(20));

    encoder.stop();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_device_fault_reports_failure_and_halts() {
    let fail = Arc::new(AtomicBool::new(false));
    let released = Arc::new(AtomicUsize::new(0));
    let device = Box::new(InstrumentedVideoDevice {
        inner: PassthroughVideoDevice::new(MIME_VIDEO_PASSTHROUGH, MediaClock::new()),
        fail_dequeue: fail.clone(),
        released: released.clone(),
    });
    let renderer = || -> RenderResult<()> { Ok(()) };
    let mut encoder = VideoEncoder::prepare(video_config(), device, Box::new(renderer)).unwrap();

    let sink = Arc::new(CollectingSink::default());
    encoder
        .start(context(sink.clone(), Arc::new(PtsRebaser::new())))
        .unwrap();
    assert!(wait_for(|| !sink.samples.lock().is_empty()));

    fail.store(true, Ordering::SeqCst);
    assert!(wait_for(|| !sink.failures.lock().is_empty()));
    assert!(wait_for(|| !encoder.gate().is_running()));

    encoder.stop();
    let failures = sink.failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].code(), Some(ErrorCode::EncodeFailed));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_render_failure_reports_encode_error() {
    let device = Box::new(PassthroughVideoDevice::new(
        MIME_VIDEO_PASSTHROUGH,
        MediaClock::new(),
    ));
    let mut drawn = 0;
    let renderer = move || -> RenderResult<()> {
        drawn += 1;
        if drawn > 3 {
            return Err(RenderError::DrawFailed {
                reason: "shader compile".to_string(),
            });
        }
        Ok(())
    };
    let mut encoder = VideoEncoder::prepare(video_config(), device, Box::new(renderer)).unwrap();

    let sink = Arc::new(CollectingSink::default());
    encoder
        .start(context(sink.clone(), Arc::new(PtsRebaser::new())))
        .unwrap();
    assert!(wait_for(|| !sink.failures.lock().is_empty()));
    encoder.stop();

    let failures = sink.failures.lock();
    assert_eq!(failures[0].code(), Some(ErrorCode::EncodeFailed));
    assert!(failures[0].to_string().contains("shader compile"));
}

#[test]
fn test_start_twice_is_rejected() {
    let device = Box::new(PassthroughVideoDevice::new(
        MIME_VIDEO_PASSTHROUGH,
        MediaClock::new(),
    ));
    let renderer = || -> RenderResult<()> { Ok(()) };
    let mut encoder = VideoEncoder::prepare(video_config(), device, Box::new(renderer)).unwrap();
    let sink = Arc::new(CollectingSink::default());
    let rebaser = Arc::new(PtsRebaser::new());

    encoder.start(context(sink.clone(), rebaser.clone())).unwrap();
    let error = encoder.start(context(sink, rebaser)).unwrap_err();
    assert!(matches!(error, RecorderError::InvalidState { .. }));
    encoder.stop();
}

#[test]
fn test_prepare_rejects_bad_config() {
    let device = Box::new(PassthroughVideoDevice::new(
        MIME_VIDEO_PASSTHROUGH,
        MediaClock::new(),
    ));
    let renderer = || -> RenderResult<()> { Ok(()) };
    let config = VideoEncoderConfig {
        frame_rate: 0,
        ..video_config()
    };
    let error = match VideoEncoder::prepare(config, device, Box::new(renderer)) {
        Ok(_) => panic!("zero frame rate accepted"),
        Err(error) => error,
    };
    assert_eq!(error.code(), Some(ErrorCode::EncoderPrepareFailed));
}

// ============================================================================
// AUDIO PIPELINE TESTS
// ============================================================================

#[test]
fn test_audio_waits_for_video_origin() {
    let clock = MediaClock::new();
    let rebaser = Arc::new(PtsRebaser::new());
    let source = Box::new(ToneSource::new(&audio_config(), clock));
    let device = Box::new(PassthroughAudioDevice::new(MIME_AUDIO_RAW));
    let mut encoder = AudioEncoder::prepare(audio_config(), device, source).unwrap();

    let sink = Arc::new(CollectingSink::default());
    encoder.start(context(sink.clone(), rebaser.clone())).unwrap();

    // no video origin yet, everything is dropped
    thread::sleep(Duration::from_millis(60));
    assert!(sink.samples.lock().is_empty());
    assert_eq!(sink.formats.lock().len(), 1);

    assert_eq!(rebaser.rebase(StreamKind::Video, clock.now_us()), Some(0));
    assert!(wait_for(|| sink.samples.lock().len() >= 3));
    encoder.stop();

    let samples = sink.samples.lock();
    assert!(samples.iter().all(|s| s.kind() == StreamKind::Audio));
    assert!(samples.iter().all(|s| s.len() == 160 * 2));
    assert!(samples.windows(2).all(|pair| pair[0].pts_us() <= pair[1].pts_us()));
}

#[test]
fn test_audio_source_failure_is_start_failure() {
    let config = audio_config();
    let source = Box::new(ToneSource::new(
        &AudioEncoderConfig {
            chunk_frames: 0,
            ..config.clone()
        },
        MediaClock::new(),
    ));
    let device = Box::new(PassthroughAudioDevice::new(MIME_AUDIO_RAW));
    let mut encoder = AudioEncoder::prepare(config, device, source).unwrap();

    let sink = Arc::new(CollectingSink::default());
    let error = encoder
        .start(context(sink, Arc::new(PtsRebaser::new())))
        .unwrap_err();
    assert_eq!(error.code(), Some(ErrorCode::StartFailed));
    assert!(!encoder.gate().is_running());
}
