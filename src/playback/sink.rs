use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::{ObjectUrl, ObjectUrls};
use crate::error::CaptureError;

/// Audio output
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `url` from the beginning
    ///
    /// The returned receiver fires when playback reaches the end on its own.
    async fn play(&self, url: &ObjectUrl) -> Result<oneshot::Receiver<()>, CaptureError>;

    /// Pause and rewind
    fn stop(&self);

    /// Drop decode/streaming state for the current source
    fn unload(&self);
}

/// Sink without an output device: "plays" for the artifact's recorded duration
///
/// Used by the CLI on headless machines.
pub struct TimedSink {
    urls: ObjectUrls,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl TimedSink {
    pub fn new(urls: ObjectUrls) -> Self {
        Self {
            urls,
            current: Mutex::new(None),
        }
    }

    fn cancel(&self) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match current.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl AudioSink for TimedSink {
    async fn play(&self, url: &ObjectUrl) -> Result<oneshot::Receiver<()>, CaptureError> {
        let artifact = self
            .urls
            .resolve(url)
            .ok_or_else(|| CaptureError::PlaybackFailure(format!("{} is not a live reference", url)))?;

        self.cancel();

        let (done_tx, done_rx) = oneshot::channel();
        let duration = Duration::from_secs(artifact.duration_secs);
        info!("Playing {} bytes for {:?}", artifact.len(), duration);

        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = done_tx.send(());
        });
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);

        Ok(done_rx)
    }

    fn stop(&self) {
        if self.cancel() {
            debug!("Playback stopped");
        }
    }

    fn unload(&self) {
        self.cancel();
    }
}
