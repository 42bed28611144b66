//! Recording session state machine

use crate::error::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// Created, nothing allocated
    Idle,
    /// Devices configured and output file created
    Prepared,
    /// Worker threads encoding
    Running,
    /// Worker threads parked
    Paused,
    /// Shutting down
    Stopping,
    /// Finished successfully (or cancelled)
    Stopped,
    /// Finished with an unrecoverable error
    Failed,
}

impl PipelineState {
    /// Whether the session has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Failed)
    }

    /// Whether encoder threads are alive in this state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PipelineState::Running | PipelineState::Paused | PipelineState::Stopping
        )
    }

    /// Check whether `next` is reachable from this state
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (*self, next) {
            (Stopped, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Idle, Prepared) => true,
            (Prepared, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Prepared, Stopping) | (Running, Stopping) | (Paused, Stopping) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&mut self, next: PipelineState) -> RecorderResult<PipelineState> {
        if !self.can_transition_to(next) {
            return Err(RecorderError::InvalidState {
                expected: format!("a state that can move to {}", next),
                actual: self.to_string(),
            });
        }
        let previous = *self;
        *self = next;
        Ok(previous)
    }

    /// Fail with `InvalidState` unless the current state is one of `allowed`
    pub fn expect_one_of(&self, allowed: &[PipelineState]) -> RecorderResult<()> {
        if allowed.contains(self) {
            return Ok(());
        }
        Err(RecorderError::InvalidState {
            expected: allowed
                .iter()
                .map(|state| state.to_string())
                .collect::<Vec<_>>()
                .join(" | "),
            actual: self.to_string(),
        })
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
