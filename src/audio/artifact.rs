use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// The immutable result of one completed recording
#[derive(Debug, Clone)]
pub struct FinishedArtifact {
    pub id: Uuid,
    pub bytes: Bytes,
    pub content_type: String,
    /// Elapsed timer value when recording stopped
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
}

impl FinishedArtifact {
    pub fn new(bytes: Bytes, content_type: impl Into<String>, duration_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes,
            content_type: content_type.into(),
            duration_secs,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension matching the content type
    pub fn file_extension(&self) -> &'static str {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
            "audio/mp4" => "m4a",
            "audio/mpeg" => "mp3",
            "audio/l16" => "pcm",
            _ => "bin",
        }
    }
}

/// Temporary reference handed to a playback sink
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of outstanding artifact references
///
/// Every `create` must be paired with a `revoke`; nothing is released
/// implicitly. `outstanding()` exposes leaks.
#[derive(Clone, Default)]
pub struct ObjectUrls {
    inner: Arc<Mutex<HashMap<ObjectUrl, FinishedArtifact>>>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, artifact: &FinishedArtifact) -> ObjectUrl {
        let url = ObjectUrl(format!("blob:audioform/{}", Uuid::new_v4()));
        let mut urls = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        urls.insert(url.clone(), artifact.clone());
        debug!("Created {} for artifact {} ({} bytes)", url, artifact.id, artifact.len());
        url
    }

    pub fn resolve(&self, url: &ObjectUrl) -> Option<FinishedArtifact> {
        let urls = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        urls.get(url).cloned()
    }

    /// Returns false if the reference was already revoked
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let mut urls = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match urls.remove(url) {
            Some(_) => {
                debug!("Revoked {}", url);
                true
            }
            None => {
                warn!("Revoke of unknown reference {}", url);
                false
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
