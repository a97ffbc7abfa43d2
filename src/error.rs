use serde::Serialize;
use thiserror::Error;

/// Whether a failed submission is worth retrying as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Network trouble, timeouts, server overload
    Transient,
    /// The endpoint rejected the artifact
    Permanent,
}

/// Errors surfaced by the capture core and its orchestration layer
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No usable audio input device: {0}")]
    DeviceUnavailable(String),

    #[error("Audio encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Submission failed ({class:?}): {message}")]
    SubmissionFailure { class: FailureClass, message: String },

    #[error("Nothing to submit: {0}")]
    NothingToSubmit(&'static str),

    #[error("A submission is already in flight")]
    SubmissionInProgress,

    #[error("No recording bound for playback")]
    NothingToPlay,

    #[error("Playback failed: {0}")]
    PlaybackFailure(String),

    #[error("Capture session has been torn down")]
    SessionClosed,
}

/// Copyable tag carried by the `Error` session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    EncodingFailure,
    SubmissionFailure,
    PlaybackFailure,
    InvalidRequest,
}

/// What the UI should offer after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Persistent banner, no record retry until the user grants access
    NeedsPermission,
    /// Terminal until an input device is connected
    NoDevice,
    /// Inline error, recording may be retried
    RetryRecording,
    /// Recording is preserved, submission may be retried
    RetrySubmit,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            CaptureError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            CaptureError::EncodingFailure(_) => ErrorKind::EncodingFailure,
            CaptureError::SubmissionFailure { .. } => ErrorKind::SubmissionFailure,
            CaptureError::PlaybackFailure(_) => ErrorKind::PlaybackFailure,
            CaptureError::NothingToSubmit(_)
            | CaptureError::SubmissionInProgress
            | CaptureError::NothingToPlay
            | CaptureError::SessionClosed => ErrorKind::InvalidRequest,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        CaptureError::SubmissionFailure {
            class: FailureClass::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        CaptureError::SubmissionFailure {
            class: FailureClass::Permanent,
            message: message.into(),
        }
    }
}

impl ErrorKind {
    pub fn recovery(self) -> Option<Recovery> {
        match self {
            ErrorKind::PermissionDenied => Some(Recovery::NeedsPermission),
            ErrorKind::DeviceUnavailable => Some(Recovery::NoDevice),
            ErrorKind::EncodingFailure => Some(Recovery::RetryRecording),
            ErrorKind::SubmissionFailure => Some(Recovery::RetrySubmit),
            ErrorKind::PlaybackFailure | ErrorKind::InvalidRequest => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_classes_are_distinct() {
        assert_eq!(
            CaptureError::PermissionDenied("no".into()).kind().recovery(),
            Some(Recovery::NeedsPermission)
        );
        assert_eq!(
            CaptureError::DeviceUnavailable("no microphone".into())
                .kind()
                .recovery(),
            Some(Recovery::NoDevice)
        );
        assert_eq!(
            CaptureError::EncodingFailure("boom".into()).kind().recovery(),
            Some(Recovery::RetryRecording)
        );
        assert_eq!(
            CaptureError::transient("timeout").kind().recovery(),
            Some(Recovery::RetrySubmit)
        );
        assert_eq!(CaptureError::SessionClosed.kind().recovery(), None);
    }
}
