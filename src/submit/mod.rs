//! Hands finished recordings to the response endpoint
//!
//! - `Submitter`: the collaborator seam used by `QuestionRecorder`
//! - `HttpSubmitter`: multipart upload to `/api/responses`

mod http_client;

pub use http_client::HttpSubmitter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::FinishedArtifact;
use crate::error::CaptureError;

/// One answer on its way to the endpoint
#[derive(Debug, Clone)]
pub struct Submission {
    pub question_id: String,
    pub user_id: Option<String>,
    pub artifact: FinishedArtifact,
}

impl Submission {
    /// Upload file name, e.g. `question_q1.webm`
    pub fn file_name(&self) -> String {
        format!(
            "question_{}.{}",
            self.question_id,
            self.artifact.file_extension()
        )
    }
}

/// What the endpoint stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub id: String,
    pub question_id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_size: usize,
    pub timestamp: DateTime<Utc>,
}

/// External submission endpoint
#[async_trait::async_trait]
pub trait Submitter: Send + Sync {
    /// Deliver the artifact
    ///
    /// Failures are `CaptureError::SubmissionFailure` classified as
    /// transient or permanent.
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, CaptureError>;
}
