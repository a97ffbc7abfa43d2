use serde::Serialize;

use crate::error::ErrorKind;

/// Observable lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Waiting on the device permission decision
    Requesting,
    Recording,
    /// A finished artifact is bound
    Stopped,
    Error(ErrorKind),
}

impl SessionState {
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }
}

/// What the UI renders from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub elapsed_seconds: u64,
    pub has_artifact: bool,
    pub artifact_bytes: usize,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            elapsed_seconds: 0,
            has_artifact: false,
            artifact_bytes: 0,
        }
    }
}
