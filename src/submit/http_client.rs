use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use super::{Submission, SubmissionReceipt, Submitter};
use crate::error::CaptureError;

/// Uploads answers as `multipart/form-data`
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: SubmissionReceipt,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpSubmitter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn form(submission: &Submission) -> Result<Form, CaptureError> {
        let audio = Part::bytes(submission.artifact.bytes.to_vec())
            .file_name(submission.file_name())
            .mime_str(&submission.artifact.content_type)
            .map_err(|e| {
                CaptureError::permanent(format!(
                    "invalid content type {:?}: {}",
                    submission.artifact.content_type, e
                ))
            })?;

        let mut form = Form::new()
            .part("audio", audio)
            .text("questionId", submission.question_id.clone());
        if let Some(user_id) = &submission.user_id {
            form = form.text("userId", user_id.clone());
        }

        Ok(form)
    }
}

/// Whether a status is worth retrying unchanged
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait::async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, CaptureError> {
        info!(
            "Uploading {} ({} bytes) to {}",
            submission.file_name(),
            submission.artifact.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(Self::form(submission)?)
            .send()
            .await
            .map_err(|e| CaptureError::transient(format!("upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            warn!("Endpoint rejected {}: {} ({})", submission.file_name(), status, detail);

            let message = format!("{}: {}", status, detail);
            return Err(if is_transient_status(status) {
                CaptureError::transient(message)
            } else {
                CaptureError::permanent(message)
            });
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| CaptureError::transient(format!("unreadable endpoint response: {}", e)))?;

        info!("Stored as response {}", body.data.id);
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::PAYLOAD_TOO_LARGE));
    }
}
