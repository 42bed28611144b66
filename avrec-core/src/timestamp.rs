//! Presentation timestamp handling
//!
//! Both streams of a session are shifted onto a common zero point: the
//! timestamp of the first video access unit. Video is authoritative because
//! frame production, not audio capture, decides when the recording visibly
//! begins.

use crate::sample::StreamKind;
use parking_lot::Mutex;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct RebaseState {
    origin_us: Option<i64>,
    last_video_us: Option<i64>,
    last_audio_us: Option<i64>,
}

/// Shifts timestamps of both streams so the first video sample is at zero
///
/// One rebaser is shared by the video and audio drain threads of a session.
#[derive(Debug, Default)]
pub struct PtsRebaser {
    state: Mutex<RebaseState>,
}

impl PtsRebaser {
    /// Create a rebaser with no origin yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Session origin, once the first video sample has been seen
    pub fn origin_us(&self) -> Option<i64> {
        self.state.lock().origin_us
    }

    /// Rebase one timestamp
    ///
    /// Returns `None` when the sample has to be dropped: audio that precedes
    /// the first video frame, or arrives before it is known. Output is
    /// non-decreasing per stream; a device timestamp that goes backwards is
    /// held at the previous value.
    pub fn rebase(&self, kind: StreamKind, pts_us: i64) -> Option<i64> {
        let mut state = self.state.lock();

        let origin = match (kind, state.origin_us) {
            (_, Some(origin)) => origin,
            (StreamKind::Video, None) => {
                debug!(origin_us = pts_us, "Recording pts origin established");
                state.origin_us = Some(pts_us);
                pts_us
            }
            (StreamKind::Audio, None) => return None,
        };

        let rebased = pts_us - origin;
        if rebased < 0 {
            return None;
        }

        let last = match kind {
            StreamKind::Video => &mut state.last_video_us,
            StreamKind::Audio => &mut state.last_audio_us,
        };
        let rebased = match *last {
            Some(previous) if rebased < previous => {
                debug!(stream = %kind, pts_us, previous, "Non-monotonic timestamp held");
                previous
            }
            _ => rebased,
        };
        *last = Some(rebased);
        Some(rebased)
    }
}

/// Monotonic microsecond clock shared by devices and sources of one session
#[derive(Debug, Clone, Copy)]
pub struct MediaClock {
    epoch: Instant,
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaClock {
    /// Start a clock at the current instant
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Microseconds since the clock was created
    pub fn now_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }
}
