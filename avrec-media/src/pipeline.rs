//! Contract between encode pipelines and the session that owns them

use crate::device::CodecDevice;
use avrec_core::{EncodedSample, PauseGate, PtsRebaser, RecorderError, RecorderResult, StreamFormat, StreamKind};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, warn, Span};

/// Receiver of one stream's encoder output
///
/// Each pipeline gets its own sink, so implementations know which stream a
/// call belongs to without inspecting it.
pub trait EncodedStreamSink: Send + Sync {
    /// The device reported its output format
    fn on_format_changed(&self, format: StreamFormat) -> RecorderResult<()>;

    /// A rebased encoded sample is ready
    fn on_encoded(&self, sample: EncodedSample) -> RecorderResult<()>;

    /// The pipeline hit an unrecoverable error and is shutting down
    fn on_failure(&self, error: RecorderError);
}

/// Everything a pipeline needs from its session when it starts
#[derive(Clone)]
pub struct EncodeContext {
    /// Rebaser shared by all pipelines of the session
    pub rebaser: Arc<PtsRebaser>,
    /// Output sink for this pipeline
    pub sink: Arc<dyn EncodedStreamSink>,
    /// Parent span for worker thread logs
    pub span: Span,
}

/// A running encode pipeline
pub trait MediaEncoder: Send {
    /// Stream this pipeline produces
    fn kind(&self) -> StreamKind;

    /// Pause gate controlling the pipeline's threads
    fn gate(&self) -> &Arc<PauseGate>;

    /// Start the device and spawn worker threads
    fn start(&mut self, context: EncodeContext) -> RecorderResult<()>;

    /// Park worker threads
    fn pause(&self) {
        self.gate().pause();
    }

    /// Wake parked worker threads
    fn resume(&self) {
        self.gate().resume();
    }

    /// Halt worker threads and wait until the device is released
    fn stop(&mut self);
}

pub(crate) fn join_worker(handle: Option<JoinHandle<()>>, stream: StreamKind, role: &str) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            error!(stream = %stream, role, "Worker thread panicked");
        }
    }
}

/// Stop and release a started device that no drain thread took over
pub(crate) fn shut_down_device<D: CodecDevice + ?Sized>(device: &mut D, stream: StreamKind) {
    if let Err(e) = device.stop() {
        warn!(stream = %stream, "Device stop failed: {}", e);
    }
    if let Err(e) = device.release() {
        warn!(stream = %stream, "Device release failed: {}", e);
    }
}

pub(crate) fn spawn_worker<F>(name: &str, body: F) -> RecorderResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| RecorderError::StartFailed {
            reason: format!("failed to spawn {}: {}", name, e),
        })
}
