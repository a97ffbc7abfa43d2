//! Replays a finished recording
//!
//! Exactly one of three states holds: nothing bound, bound and stopped,
//! bound and playing. Rebinding or clearing while playing stops playback
//! and revokes the previous artifact's temporary reference first.

mod sink;

pub use sink::{AudioSink, TimedSink};

use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::{FinishedArtifact, ObjectUrl, ObjectUrls};
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No artifact bound
    Empty,
    /// Bound, not playing
    Ready,
    Playing,
}

/// Play/stop control over one bound artifact
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<PlaybackShared>,
}

struct PlaybackShared {
    sink: Arc<dyn AudioSink>,
    urls: ObjectUrls,
    inner: Mutex<PlaybackInner>,
    state_tx: watch::Sender<PlaybackState>,
}

struct PlaybackInner {
    bound: Option<Bound>,
    playing: bool,
    /// Bumped whenever playback stops; end-of-track signals compare against it
    generation: u64,
    watcher: Option<JoinHandle<()>>,
}

struct Bound {
    artifact: FinishedArtifact,
    url: ObjectUrl,
}

impl PlaybackInner {
    fn state(&self) -> PlaybackState {
        match (&self.bound, self.playing) {
            (None, _) => PlaybackState::Empty,
            (Some(_), false) => PlaybackState::Ready,
            (Some(_), true) => PlaybackState::Playing,
        }
    }
}

impl PlaybackShared {
    fn publish(&self, inner: &PlaybackInner) {
        self.state_tx.send_replace(inner.state());
    }

    fn halt(&self, inner: &mut PlaybackInner) {
        if inner.playing {
            self.sink.stop();
            inner.playing = false;
        }
        inner.generation += 1;
        if let Some(watcher) = inner.watcher.take() {
            watcher.abort();
        }
    }

    /// Stop, unload, revoke; in that order
    fn release_bound(&self, inner: &mut PlaybackInner) {
        self.halt(inner);
        if let Some(bound) = inner.bound.take() {
            self.sink.unload();
            self.urls.revoke(&bound.url);
            debug!("Unbound artifact {}", bound.artifact.id);
        }
    }
}

impl PlaybackController {
    pub fn new(sink: Arc<dyn AudioSink>, urls: ObjectUrls) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Empty);
        Self {
            shared: Arc::new(PlaybackShared {
                sink,
                urls,
                inner: Mutex::new(PlaybackInner {
                    bound: None,
                    playing: false,
                    generation: 0,
                    watcher: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.shared.state_tx.subscribe()
    }

    pub async fn bound_artifact(&self) -> Option<FinishedArtifact> {
        let inner = self.shared.inner.lock().await;
        inner.bound.as_ref().map(|b| b.artifact.clone())
    }

    /// Bind a new artifact, releasing the previous one
    pub async fn bind(&self, artifact: FinishedArtifact) {
        let mut inner = self.shared.inner.lock().await;
        self.shared.release_bound(&mut inner);

        let url = self.shared.urls.create(&artifact);
        debug!("Bound artifact {} as {}", artifact.id, url);
        inner.bound = Some(Bound { artifact, url });
        self.shared.publish(&inner);
    }

    /// Stop playback and release the bound artifact
    pub async fn clear(&self) {
        let mut inner = self.shared.inner.lock().await;
        self.shared.release_bound(&mut inner);
        self.shared.publish(&inner);
    }

    /// Start playing; a no-op while already playing
    pub async fn play(&self) -> Result<(), CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        let url = match (&inner.bound, inner.playing) {
            (None, _) => return Err(CaptureError::NothingToPlay),
            (Some(_), true) => return Ok(()),
            (Some(bound), false) => bound.url.clone(),
        };

        let finished = self.shared.sink.play(&url).await?;
        inner.playing = true;
        inner.generation += 1;
        inner.watcher = Some(spawn_watcher(
            Arc::downgrade(&self.shared),
            inner.generation,
            finished,
        ));
        self.shared.publish(&inner);
        info!("Playback started");

        Ok(())
    }

    /// Stop and rewind; the artifact stays bound
    pub async fn stop(&self) {
        let mut inner = self.shared.inner.lock().await;
        self.shared.halt(&mut inner);
        self.shared.publish(&inner);
    }
}

fn spawn_watcher(
    shared: Weak<PlaybackShared>,
    generation: u64,
    finished: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if finished.await.is_err() {
            // Sink dropped the signal: playback was cut short, not completed
            return;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().await;
        if inner.generation == generation && inner.playing {
            inner.playing = false;
            inner.watcher = None;
            shared.publish(&inner);
            info!("Playback finished");
        }
    })
}
