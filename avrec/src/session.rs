//! Shared state of a recording session
//!
//! [`Session`] is the only state the controller shares with worker threads:
//! the authoritative [`PipelineState`], the event sender and the pause gates
//! of every pipeline. [`TrackSink`] routes one stream's encoder output into
//! the muxer.

use crate::event::{EventSender, RecorderEvent};
use avrec_core::{
    EncodedSample, PauseGate, PipelineState, RecorderError, RecorderResult, StreamFormat,
    StreamKind,
};
use avrec_media::{EncodedStreamSink, MediaError, Muxer, MuxerStats};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub(crate) struct Session {
    id: Uuid,
    state: Mutex<PipelineState>,
    failure: Mutex<Option<RecorderError>>,
    gates: Mutex<Vec<Arc<PauseGate>>>,
    events: EventSender,
}

impl Session {
    pub(crate) fn new(id: Uuid, events: EventSender) -> Self {
        Self {
            id,
            state: Mutex::new(PipelineState::Idle),
            failure: Mutex::new(None),
            gates: Mutex::new(Vec::new()),
            events,
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub(crate) fn failure(&self) -> Option<RecorderError> {
        self.failure.lock().clone()
    }

    pub(crate) fn register_gate(&self, gate: Arc<PauseGate>) {
        self.gates.lock().push(gate);
    }

    /// Move from one of `allowed` to `next`, running `change` under the state lock
    ///
    /// `event` is emitted only if the transition happened.
    pub(crate) fn transition<F>(
        &self,
        allowed: &[PipelineState],
        next: PipelineState,
        change: F,
        event: Option<RecorderEvent>,
    ) -> RecorderResult<PipelineState>
    where
        F: FnOnce(),
    {
        let mut state = self.state.lock();
        state.expect_one_of(allowed)?;
        change();
        let previous = state.transition(next)?;
        debug!(session = %self.id, from = %previous, to = %next, "State changed");
        if let Some(event) = event {
            self.events.send(event);
        }
        Ok(previous)
    }

    /// Move to `Failed` and deliver the error, unless already terminal
    ///
    /// Halts every registered pipeline so paused workers wake and exit.
    /// Returns `false` when a terminal event was already delivered.
    pub(crate) fn fail(&self, error: RecorderError) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            debug!(session = %self.id, "Ignoring failure after terminal state: {}", error);
            return false;
        }

        let previous = *state;
        *state = PipelineState::Failed;
        for gate in self.gates.lock().iter() {
            gate.halt();
        }

        let code = error.code().unwrap_or(avrec_core::ErrorCode::EncodeFailed);
        error!(session = %self.id, from = %previous, code = code.as_i32(), "Recording failed: {}", error);
        *self.failure.lock() = Some(error.clone());
        self.events.send(RecorderEvent::Failed { code, error });
        true
    }

    /// Emit a progress event while the session is live
    pub(crate) fn progress(&self, elapsed_ms: u64) {
        let state = self.state.lock();
        if matches!(*state, PipelineState::Running | PipelineState::Paused) {
            self.events.send(RecorderEvent::Progress { elapsed_ms });
        }
    }
}

#[derive(Default)]
struct RouterState {
    tracks: HashMap<StreamKind, usize>,
    pending: VecDeque<EncodedSample>,
}

/// Muxer front end holding samples until every stream has a format
pub(crate) struct TrackRouter {
    muxer: Muxer,
    state: Mutex<RouterState>,
    pending_limit: usize,
}

impl TrackRouter {
    pub(crate) fn new(muxer: Muxer, pending_limit: usize) -> Self {
        Self {
            muxer,
            state: Mutex::new(RouterState::default()),
            pending_limit,
        }
    }

    fn add_stream(&self, format: StreamFormat) -> RecorderResult<()> {
        let mut state = self.state.lock();
        let kind = format.kind();
        let index = self.muxer.add_stream(format)?;
        state.tracks.insert(kind, index);

        if self.muxer.is_started() && !state.pending.is_empty() {
            debug!(samples = state.pending.len(), "Flushing samples held for muxer start");
            while let Some(sample) = state.pending.pop_front() {
                let index = Self::track(&state.tracks, sample.kind())?;
                self.muxer.write_sample(index, sample)?;
            }
        }
        Ok(())
    }

    fn write(&self, sample: EncodedSample) -> RecorderResult<()> {
        let mut state = self.state.lock();
        if self.muxer.is_started() {
            let index = Self::track(&state.tracks, sample.kind())?;
            return self.muxer.write_sample(index, sample).map_err(Into::into);
        }

        if state.pending.len() >= self.pending_limit {
            return Err(RecorderError::EncodeFailed {
                stream: sample.kind(),
                reason: format!(
                    "{} samples waiting for the muxer to start",
                    state.pending.len()
                ),
            });
        }
        state.pending.push_back(sample);
        Ok(())
    }

    fn track(tracks: &HashMap<StreamKind, usize>, kind: StreamKind) -> RecorderResult<usize> {
        tracks.get(&kind).copied().ok_or_else(|| RecorderError::MuxerFailed {
            reason: format!("no {} track", kind),
        })
    }

    pub(crate) fn has_stream(&self, kind: StreamKind) -> bool {
        self.state.lock().tracks.contains_key(&kind)
    }

    pub(crate) fn finish(&self) -> Result<MuxerStats, MediaError> {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            warn!(samples = state.pending.len(), "Discarding samples that never reached the muxer");
            state.pending.clear();
        }
        self.muxer.finish()
    }
}

/// Sink for one stream, wired into the session and its muxer
pub(crate) struct TrackSink {
    kind: StreamKind,
    session: Arc<Session>,
    router: Arc<TrackRouter>,
    progress: Option<ProgressTicker>,
}

impl TrackSink {
    pub(crate) fn new(kind: StreamKind, session: Arc<Session>, router: Arc<TrackRouter>) -> Self {
        Self {
            kind,
            session,
            router,
            progress: None,
        }
    }

    /// Report progress from this stream's timeline
    pub(crate) fn with_progress(mut self, interval_ms: u64) -> Self {
        self.progress = Some(ProgressTicker::new(interval_ms));
        self
    }
}

impl EncodedStreamSink for TrackSink {
    fn on_format_changed(&self, format: StreamFormat) -> RecorderResult<()> {
        info!(stream = %self.kind, mime = %format.mime, "Adding stream to muxer");
        self.router.add_stream(format)
    }

    fn on_encoded(&self, sample: EncodedSample) -> RecorderResult<()> {
        let pts_us = sample.pts_us();
        self.router.write(sample)?;

        if let Some(ticker) = &self.progress {
            if let Some(elapsed_ms) = ticker.advance(pts_us) {
                self.session.progress(elapsed_ms);
            }
        }
        Ok(())
    }

    fn on_failure(&self, error: RecorderError) {
        self.session.fail(error);
    }
}

/// Fires once each time the timeline crosses the next interval boundary
struct ProgressTicker {
    interval_us: i64,
    next_us: AtomicI64,
}

impl ProgressTicker {
    fn new(interval_ms: u64) -> Self {
        let interval_us = (interval_ms.max(1) * 1000) as i64;
        Self {
            interval_us,
            next_us: AtomicI64::new(interval_us),
        }
    }

    fn advance(&self, pts_us: i64) -> Option<u64> {
        let next = self.next_us.load(Ordering::Relaxed);
        if pts_us < next {
            return None;
        }
        let following = (pts_us / self.interval_us + 1) * self.interval_us;
        self.next_us.store(following, Ordering::Relaxed);
        Some((pts_us / 1000) as u64)
    }
}
