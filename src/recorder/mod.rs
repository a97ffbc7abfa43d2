//! One question's recorder: the operation set the questionnaire page uses
//!
//! `QuestionRecorder` binds a `CaptureSession`, a `PlaybackController` and
//! a `Submitter` to a single question. Recording and playback never overlap;
//! a failed submission keeps the recording so it can be retried.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::audio::FinishedArtifact;
use crate::error::CaptureError;
use crate::playback::PlaybackController;
use crate::session::{format_elapsed, CaptureSession, SessionState};
use crate::submit::{Submission, SubmissionReceipt, Submitter};

/// Everything the UI needs to render one question's controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecorderSnapshot {
    pub question_id: String,
    pub state: SessionState,
    pub elapsed_seconds: u64,
    /// `MM:SS`
    pub elapsed_display: String,
    pub has_artifact: bool,
    pub is_playing: bool,
    pub is_submitting: bool,
}

pub struct QuestionRecorder {
    question_id: String,
    user_id: Option<String>,
    session: CaptureSession,
    playback: PlaybackController,
    submitter: Arc<dyn Submitter>,
    submit_lock: Mutex<()>,
    submitting: AtomicBool,
}

impl QuestionRecorder {
    pub fn new(
        question_id: impl Into<String>,
        session: CaptureSession,
        playback: PlaybackController,
        submitter: Arc<dyn Submitter>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            user_id: None,
            session,
            playback,
            submitter,
            submit_lock: Mutex::new(()),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        let session = self.session.snapshot();
        RecorderSnapshot {
            question_id: self.question_id.clone(),
            state: session.state,
            elapsed_seconds: session.elapsed_seconds,
            elapsed_display: format_elapsed(session.elapsed_seconds),
            has_artifact: session.has_artifact,
            is_playing: self.playback.is_playing(),
            is_submitting: self.submitting.load(Ordering::SeqCst),
        }
    }

    /// Start recording; playback of any earlier take is released first
    pub async fn start(&self) -> Result<(), CaptureError> {
        if self.submitting.load(Ordering::SeqCst) {
            return Err(CaptureError::SubmissionInProgress);
        }
        self.playback.clear().await;
        self.session.start().await
    }

    /// Stop recording and bind the result for playback
    pub async fn stop(&self) -> Result<Option<FinishedArtifact>, CaptureError> {
        let artifact = self.session.stop().await?;
        if let Some(artifact) = &artifact {
            self.playback.bind(artifact.clone()).await;
        }
        Ok(artifact)
    }

    /// Discard the recording: stop playback, revoke its reference, clear it
    ///
    /// Refused while a submission is in flight; a failed upload keeps the take.
    pub async fn reset(&self) -> Result<(), CaptureError> {
        let _guard = self
            .submit_lock
            .try_lock()
            .map_err(|_| CaptureError::SubmissionInProgress)?;
        self.discard().await;
        Ok(())
    }

    async fn discard(&self) {
        if matches!(
            self.session.state(),
            SessionState::Requesting | SessionState::Recording
        ) {
            warn!("Reset ignored for {} while recording", self.question_id);
            return;
        }
        self.playback.clear().await;
        self.session.reset().await;
    }

    pub async fn play(&self) -> Result<(), CaptureError> {
        if self.session.state() != SessionState::Stopped {
            return Err(CaptureError::NothingToPlay);
        }
        self.playback.play().await
    }

    pub async fn stop_playback(&self) {
        self.playback.stop().await;
    }

    /// Submit the finished recording
    ///
    /// On success the recorder returns to `Idle`. On failure the session
    /// stays `Stopped` with the artifact intact.
    pub async fn submit(&self) -> Result<SubmissionReceipt, CaptureError> {
        let _guard = self
            .submit_lock
            .try_lock()
            .map_err(|_| CaptureError::SubmissionInProgress)?;

        if self.session.state() != SessionState::Stopped {
            return Err(CaptureError::NothingToSubmit("no finished recording"));
        }
        let artifact = self
            .session
            .artifact()
            .await
            .ok_or(CaptureError::NothingToSubmit("no finished recording"))?;
        if artifact.is_empty() {
            return Err(CaptureError::NothingToSubmit("recording is empty"));
        }

        self.playback.stop().await;

        let submission = Submission {
            question_id: self.question_id.clone(),
            user_id: self.user_id.clone(),
            artifact,
        };

        self.submitting.store(true, Ordering::SeqCst);
        let result = self.submitter.submit(&submission).await;
        self.submitting.store(false, Ordering::SeqCst);

        match result {
            Ok(receipt) => {
                info!(
                    "Answer for {} accepted as {}",
                    self.question_id, receipt.id
                );
                let current = self.session.artifact().await.map(|a| a.id);
                if current == Some(submission.artifact.id) {
                    self.discard().await;
                }
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    "Answer for {} not accepted, recording kept: {}",
                    self.question_id, e
                );
                Err(e)
            }
        }
    }

    /// Release everything; safe to call more than once
    pub async fn teardown(&self) {
        self.playback.clear().await;
        self.session.teardown().await;
    }
}
