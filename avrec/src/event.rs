//! Event system for recording sessions
//!
//! Worker threads never call user code. Every notification is posted as a
//! [`RecorderEvent`] into an unbounded channel and consumed by the host on
//! its own thread, either as an async stream or by dispatching to a
//! [`RecorderCallback`].

use avrec_core::{ErrorCode, RecorderError};
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Session events, in the order they happened
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Recording started
    Started,
    /// Recorded time advanced
    Progress {
        /// Recorded time in milliseconds
        elapsed_ms: u64,
    },
    /// Recording paused
    Paused,
    /// Recording resumed
    Resumed,
    /// Recording was cancelled and the output discarded
    Cancelled,
    /// Recording finished and the output file is complete
    Completed {
        /// Finished container file
        output: PathBuf,
    },
    /// Recording failed
    Failed {
        /// Public error code
        code: ErrorCode,
        /// Underlying error
        error: RecorderError,
    },
}

impl RecorderEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            RecorderEvent::Started => "started",
            RecorderEvent::Progress { .. } => "progress",
            RecorderEvent::Paused => "paused",
            RecorderEvent::Resumed => "resumed",
            RecorderEvent::Cancelled => "cancelled",
            RecorderEvent::Completed { .. } => "completed",
            RecorderEvent::Failed { .. } => "failed",
        }
    }

    /// Whether this event ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecorderEvent::Cancelled | RecorderEvent::Completed { .. } | RecorderEvent::Failed { .. }
        )
    }

    /// Invoke the matching callback method
    pub fn deliver(&self, callback: &mut dyn RecorderCallback) {
        match self {
            RecorderEvent::Started => callback.on_start(),
            RecorderEvent::Progress { elapsed_ms } => callback.on_progress(*elapsed_ms),
            RecorderEvent::Paused => callback.on_pause(),
            RecorderEvent::Resumed => callback.on_resume(),
            RecorderEvent::Cancelled => callback.on_cancel(),
            RecorderEvent::Completed { output } => callback.on_complete(output),
            RecorderEvent::Failed { code, error } => callback.on_failed(*code, error),
        }
    }
}

/// Callback-style consumer of session events
///
/// Every method has an empty default, so implementors override only what
/// they need.
pub trait RecorderCallback {
    /// Recording started
    fn on_start(&mut self) {}

    /// Recorded time advanced
    fn on_progress(&mut self, _elapsed_ms: u64) {}

    /// Recording paused
    fn on_pause(&mut self) {}

    /// Recording resumed
    fn on_resume(&mut self) {}

    /// Recording cancelled
    fn on_cancel(&mut self) {}

    /// Output file complete
    fn on_complete(&mut self, _output: &Path) {}

    /// Recording failed
    fn on_failed(&mut self, _code: ErrorCode, _error: &RecorderError) {}
}

/// Sending half used by the session
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    sender: mpsc::UnboundedSender<RecorderEvent>,
}

impl EventSender {
    pub(crate) fn send(&self, event: RecorderEvent) {
        let event_type = event.event_type();
        if self.sender.send(event).is_err() {
            debug!(event = event_type, "Event dropped, receiver closed");
        }
    }
}

/// Create a connected sender and event stream
pub(crate) fn channel() -> (EventSender, RecorderEvents) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSender { sender }, RecorderEvents { receiver })
}

/// Stream of session events for async iteration
#[derive(Debug)]
pub struct RecorderEvents {
    receiver: mpsc::UnboundedReceiver<RecorderEvent>,
}

impl RecorderEvents {
    /// Get the next event from the stream
    ///
    /// Returns `None` once the recorder is dropped and every event was read.
    pub async fn next(&mut self) -> Option<RecorderEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<RecorderEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Deliver every pending event to `callback` on the calling thread
    ///
    /// Returns the number of events delivered.
    pub fn dispatch(&mut self, callback: &mut dyn RecorderCallback) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.receiver.try_recv() {
            debug!(event = event.event_type(), "Dispatching event");
            event.deliver(callback);
            delivered += 1;
        }
        delivered
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for RecorderEvents {
    type Item = RecorderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[derive(Default)]
    struct Log(Vec<String>);

    impl RecorderCallback for Log {
        fn on_start(&mut self) {
            self.0.push("start".into());
        }
        fn on_progress(&mut self, elapsed_ms: u64) {
            self.0.push(format!("progress {}", elapsed_ms));
        }
        fn on_complete(&mut self, output: &Path) {
            self.0.push(format!("complete {}", output.display()));
        }
        fn on_failed(&mut self, code: ErrorCode, _error: &RecorderError) {
            self.0.push(format!("failed {}", code.as_i32()));
        }
    }

    #[test]
    fn test_dispatch_calls_matching_methods() {
        let (sender, mut events) = channel();
        sender.send(RecorderEvent::Started);
        sender.send(RecorderEvent::Progress { elapsed_ms: 100 });
        sender.send(RecorderEvent::Paused);
        sender.send(RecorderEvent::Completed {
            output: PathBuf::from("out.avrc"),
        });

        let mut log = Log::default();
        assert_eq!(events.dispatch(&mut log), 4);
        assert_eq!(log.0, vec!["start", "progress 100", "complete out.avrc"]);
        assert_eq!(events.dispatch(&mut log), 0);
    }

    #[test]
    fn test_terminal_events() {
        assert!(RecorderEvent::Cancelled.is_terminal());
        assert!(!RecorderEvent::Paused.is_terminal());
        let failed = RecorderEvent::Failed {
            code: ErrorCode::MuxerFailed,
            error: RecorderError::MuxerFailed {
                reason: "disk full".into(),
            },
        };
        assert!(failed.is_terminal());
        assert_eq!(failed.event_type(), "failed");
    }

    #[tokio::test]
    async fn test_stream_ends_when_sender_dropped() {
        let (sender, mut events) = channel();
        sender.send(RecorderEvent::Started);
        sender.send(RecorderEvent::Resumed);
        drop(sender);

        let collected: Vec<&'static str> = (&mut events).map(|e| e.event_type()).collect().await;
        assert_eq!(collected, vec!["started", "resumed"]);
        assert!(events.try_next().is_err());
    }

    #[test]
    fn test_next_receives_events_from_worker_threads() {
        let (sender, mut events) = channel();
        let worker = std::thread::spawn(move || {
            sender.send(RecorderEvent::Progress { elapsed_ms: 250 });
        });

        let event = tokio_test::block_on(events.next());
        worker.join().unwrap();
        assert!(matches!(event, Some(RecorderEvent::Progress { elapsed_ms: 250 })));
        assert!(tokio_test::block_on(events.next()).is_none());
    }
}
