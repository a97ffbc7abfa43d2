use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;

/// One uploaded answer held by the server
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    pub file_name: String,
    pub content_type: String,
    pub audio: Bytes,
    pub timestamp: DateTime<Utc>,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Uploaded responses, oldest first
    pub responses: Arc<RwLock<Vec<StoredResponse>>>,

    /// Request body cap for uploads
    pub max_upload_bytes: usize,

    /// Unset means transcription answers with a mock
    pub transcription_api_key: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(Vec::new())),
            max_upload_bytes: 25 * 1024 * 1024,
            transcription_api_key: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.server.max_upload_bytes,
            transcription_api_key: config.transcription.api_key.clone(),
            ..Self::new()
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
