use futures::FutureExt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::state::{SessionSnapshot, SessionState};
use super::timer::TickTimer;
use crate::audio::{
    AnalysisTap, AudioBackend, ChunkAssembler, DeviceStream, Encoder, EncoderEvent,
    FinishedArtifact,
};
use crate::error::CaptureError;
use crate::visualizer::{FrameSink, VisualizationHandle};

/// One recording attempt's state machine
///
/// `Idle → Requesting → Recording → Stopped`, with `Error` reachable from
/// `Requesting` and `Recording`, and `reset` returning to `Idle`. The
/// session owns the device stream, encoder, analysis tap, timer and
/// visualization loop while recording and releases all of them, in one
/// fixed order, on every way out of `Recording`.
///
/// Cloning is cheap; clones drive the same session.
#[derive(Clone)]
pub struct CaptureSession {
    shared: Arc<Shared>,
}

struct Shared {
    config: SessionConfig,
    backend: Arc<dyn AudioBackend>,
    frame_sink: Option<Arc<dyn FrameSink>>,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

struct Inner {
    phase: Phase,
    elapsed_seconds: u64,
    /// Bumped on every start and on teardown; stale callbacks compare against it
    attempt: u64,
    closed: bool,
}

enum Phase {
    Idle,
    Requesting {
        stop_requested: bool,
        abandon: Arc<Notify>,
    },
    Recording(ActiveCapture),
    /// `stop` is flushing the encoder; observable as `Recording`
    Finalizing {
        /// Cuts the flush short and releases the capture
        abort: Arc<Notify>,
        /// Set once the capture has been released
        released: watch::Receiver<bool>,
    },
    Stopped(FinishedArtifact),
    Error(CaptureError),
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        let state = match &self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Requesting { .. } => SessionState::Requesting,
            Phase::Recording(_) | Phase::Finalizing { .. } => SessionState::Recording,
            Phase::Stopped(_) => SessionState::Stopped,
            Phase::Error(e) => SessionState::Error(e.kind()),
        };
        let artifact_bytes = match &self.phase {
            Phase::Stopped(artifact) => Some(artifact.len()),
            _ => None,
        };

        SessionSnapshot {
            state,
            elapsed_seconds: self.elapsed_seconds,
            has_artifact: artifact_bytes.is_some(),
            artifact_bytes: artifact_bytes.unwrap_or(0),
        }
    }

    fn is_recording(&self, attempt: u64) -> bool {
        self.attempt == attempt && matches!(self.phase, Phase::Recording(_))
    }
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(inner.snapshot());
    }

    /// Encoder pipeline broke mid-recording
    async fn fail_recording(&self, attempt: u64, error: CaptureError) {
        let mut inner = self.inner.lock().await;
        if !inner.is_recording(attempt) {
            debug!("Ignoring encoder failure for stale attempt {}", attempt);
            return;
        }

        let previous = std::mem::replace(&mut inner.phase, Phase::Error(error.clone()));
        if let Phase::Recording(mut active) = previous {
            error!("Recording failed: {}; releasing device", error);
            // The collector is the caller; detach rather than abort it
            drop(active.collector.take());
            active.abandon().await;
        }
        self.publish(&inner);
    }
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn AudioBackend>, config: SessionConfig) -> Self {
        Self::build(backend, config, None)
    }

    /// Session whose visualization loop draws into `sink` while recording
    pub fn with_frame_sink(
        backend: Arc<dyn AudioBackend>,
        config: SessionConfig,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self::build(backend, config, Some(sink))
    }

    fn build(
        backend: Arc<dyn AudioBackend>,
        config: SessionConfig,
        frame_sink: Option<Arc<dyn FrameSink>>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                config,
                backend,
                frame_sink,
                inner: Mutex::new(Inner {
                    phase: Phase::Idle,
                    elapsed_seconds: 0,
                    attempt: 0,
                    closed: false,
                }),
                snapshot_tx,
            }),
        }
    }

    /// Watch state changes (state, elapsed time, artifact presence)
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.snapshot_tx.borrow().state
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.shared.snapshot_tx.borrow().elapsed_seconds
    }

    /// The finished recording, present only in `Stopped`
    pub async fn artifact(&self) -> Option<FinishedArtifact> {
        match &self.shared.inner.lock().await.phase {
            Phase::Stopped(artifact) => Some(artifact.clone()),
            _ => None,
        }
    }

    /// The error that put the session into `Error`
    pub async fn last_error(&self) -> Option<CaptureError> {
        match &self.shared.inner.lock().await.phase {
            Phase::Error(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Request the device and start recording
    ///
    /// No-op while a request or recording is already in progress. Starting
    /// from `Stopped` discards the previous artifact. Acquisition failures
    /// move the session to `Error` and are also returned.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let (attempt, abandon) = {
            let mut inner = self.shared.inner.lock().await;
            if inner.closed {
                return Err(CaptureError::SessionClosed);
            }

            match &inner.phase {
                Phase::Requesting { .. } | Phase::Recording(_) | Phase::Finalizing { .. } => {
                    warn!("Recording already started");
                    return Ok(());
                }
                Phase::Stopped(artifact) => {
                    info!("Discarding artifact {} for a new recording", artifact.id);
                }
                Phase::Idle | Phase::Error(_) => {}
            }

            inner.attempt += 1;
            inner.elapsed_seconds = 0;
            let abandon = Arc::new(Notify::new());
            inner.phase = Phase::Requesting {
                stop_requested: false,
                abandon: Arc::clone(&abandon),
            };
            self.shared.publish(&inner);
            (inner.attempt, abandon)
        };

        info!(
            "Requesting audio input from {} backend (attempt {})",
            self.shared.backend.name(),
            attempt
        );

        let acquired = tokio::select! {
            result = self.shared.backend.acquire() => Some(result),
            _ = abandon.notified() => None,
        };

        let mut inner = self.shared.inner.lock().await;
        let current = inner.attempt == attempt && matches!(inner.phase, Phase::Requesting { .. });

        let mut device = match acquired {
            None => {
                info!("Device request abandoned");
                return Ok(());
            }
            Some(Err(e)) => {
                warn!("Device acquisition failed: {}", e);
                if current {
                    inner.phase = Phase::Error(e.clone());
                    self.shared.publish(&inner);
                }
                return Err(e);
            }
            Some(Ok(device)) => device,
        };

        let stop_requested = match &inner.phase {
            Phase::Requesting { stop_requested, .. } if current => *stop_requested,
            _ => true,
        };
        if stop_requested {
            warn!(
                "Device {} granted after recording was cancelled; releasing it",
                device.id()
            );
            device.release();
            if current {
                inner.phase = Phase::Idle;
                self.shared.publish(&inner);
            }
            return Ok(());
        }

        match self.begin_capture(device, attempt).await {
            Ok(active) => {
                info!("Recording started on device {}", active.device.id());
                inner.phase = Phase::Recording(active);
                self.shared.publish(&inner);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                inner.phase = Phase::Error(e.clone());
                self.shared.publish(&inner);
                Err(e)
            }
        }
    }

    /// Stop recording and produce the artifact
    ///
    /// During `Requesting` this records a stop intent: a device granted
    /// afterwards is released immediately. Otherwise a no-op unless
    /// recording.
    pub async fn stop(&self) -> Result<Option<FinishedArtifact>, CaptureError> {
        let abort = Arc::new(Notify::new());
        let (released_tx, released_rx) = watch::channel(false);
        let (active, attempt, elapsed) = {
            let mut inner = self.shared.inner.lock().await;

            if let Phase::Requesting { stop_requested, .. } = &mut inner.phase {
                info!("Stop requested while waiting for device permission");
                *stop_requested = true;
                return Ok(None);
            }

            let finalizing = Phase::Finalizing {
                abort: Arc::clone(&abort),
                released: released_rx,
            };
            let active = match std::mem::replace(&mut inner.phase, finalizing) {
                Phase::Recording(active) => active,
                other => {
                    inner.phase = other;
                    debug!("Recording not active");
                    return Ok(None);
                }
            };
            self.shared.publish(&inner);
            (active, inner.attempt, inner.elapsed_seconds)
        };

        info!("Stopping recording after {}s", elapsed);
        let result = active
            .finish(self.shared.config.finalize_timeout, elapsed, &abort)
            .await;
        let _ = released_tx.send(true);

        let mut inner = self.shared.inner.lock().await;
        if inner.attempt != attempt || !matches!(inner.phase, Phase::Finalizing { .. }) {
            info!("Session torn down while finalizing; discarding recording");
            return Ok(None);
        }

        match result {
            Ok(artifact) => {
                info!(
                    "Recording stopped: {} bytes of {} ({}s)",
                    artifact.len(),
                    artifact.content_type,
                    artifact.duration_secs
                );
                inner.phase = Phase::Stopped(artifact.clone());
                self.shared.publish(&inner);
                Ok(Some(artifact))
            }
            Err(e) => {
                error!("Failed to finalize recording: {}", e);
                inner.phase = Phase::Error(e.clone());
                self.shared.publish(&inner);
                Err(e)
            }
        }
    }

    /// Return to `Idle` from `Stopped` or `Error`, dropping the artifact
    ///
    /// Ignored while a request or recording is in progress.
    pub async fn reset(&self) {
        let mut inner = self.shared.inner.lock().await;
        match &inner.phase {
            Phase::Requesting { .. } | Phase::Recording(_) | Phase::Finalizing { .. } => {
                warn!("Reset ignored while recording; stop first");
                return;
            }
            Phase::Stopped(artifact) => debug!("Clearing artifact {}", artifact.id),
            Phase::Idle | Phase::Error(_) => {}
        }

        inner.phase = Phase::Idle;
        inner.elapsed_seconds = 0;
        self.shared.publish(&inner);
    }

    /// Release everything and refuse further use
    ///
    /// Safe to call repeatedly; only the first call releases anything. A
    /// `stop` still flushing the encoder is cut short, and this returns only
    /// after it has released the device.
    pub async fn teardown(&self) {
        let pending_release = {
            let mut inner = self.shared.inner.lock().await;
            if inner.closed {
                debug!("Capture session already torn down");
                return;
            }
            inner.closed = true;
            inner.attempt += 1;

            let pending_release = match std::mem::replace(&mut inner.phase, Phase::Idle) {
                Phase::Requesting { abandon, .. } => {
                    abandon.notify_one();
                    None
                }
                Phase::Recording(active) => {
                    active.abandon().await;
                    None
                }
                // `stop` owns the capture; it releases it once aborted
                Phase::Finalizing { abort, released } => {
                    abort.notify_one();
                    Some(released)
                }
                Phase::Idle | Phase::Stopped(_) | Phase::Error(_) => None,
            };

            inner.elapsed_seconds = 0;
            self.shared.publish(&inner);
            pending_release
        };

        if let Some(mut released) = pending_release {
            debug!("Waiting for the finalizing stop to release the device");
            // A dropped sender means `stop` was cancelled and `Drop` released
            let _ = released.wait_for(|released| *released).await;
        }
        info!("Capture session torn down");
    }

    pub async fn is_closed(&self) -> bool {
        self.shared.inner.lock().await.closed
    }

    async fn begin_capture(
        &self,
        device: Box<dyn DeviceStream>,
        attempt: u64,
    ) -> Result<ActiveCapture, CaptureError> {
        let config = &self.shared.config;
        // From here on, dropping `active` releases whatever was acquired
        let mut active = ActiveCapture::new(device, config.content_type.clone());

        let tap = active.device.open_analysis_tap(config.fft_size)?;
        active.tap = Some(Arc::clone(&tap));

        let mut encoder = active.device.open_encoder()?;
        let chunks = encoder.start().await?;
        if let Some(content_type) = encoder.content_type() {
            active.content_type = content_type;
        }
        active.encoder = Some(encoder);

        active.collector = Some(self.spawn_collector(chunks, attempt));
        active.timer = Some(self.spawn_timer(attempt));
        active.visualizer = self.shared.frame_sink.as_ref().map(|sink| {
            VisualizationHandle::spawn(tap, Arc::clone(sink), config.panel, config.frame_interval)
        });

        Ok(active)
    }

    fn spawn_collector(
        &self,
        chunks: mpsc::Receiver<EncoderEvent>,
        attempt: u64,
    ) -> JoinHandle<Result<ChunkAssembler, CaptureError>> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            let result = ChunkAssembler::new().collect(chunks).await;
            if let Err(e) = &result {
                if let Some(shared) = shared.upgrade() {
                    shared.fail_recording(attempt, e.clone()).await;
                }
            }
            result
        })
    }

    fn spawn_timer(&self, attempt: u64) -> TickTimer {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        TickTimer::spawn(self.shared.config.timer_period, move || {
            let shared = shared.clone();
            async move {
                let Some(shared) = shared.upgrade() else {
                    return false;
                };
                let mut inner = shared.inner.lock().await;
                if !inner.is_recording(attempt) {
                    return false;
                }
                inner.elapsed_seconds += 1;
                shared.publish(&inner);
                true
            }
            .boxed()
        })
    }
}

/// Resources held while recording
///
/// Release order on every path: timer, visualization loop, encoder,
/// analysis tap, device. `Drop` runs the same sequence synchronously for
/// paths that never reach `finish` or `abandon`.
struct ActiveCapture {
    device: Box<dyn DeviceStream>,
    device_released: bool,
    tap: Option<Arc<dyn AnalysisTap>>,
    encoder: Option<Box<dyn Encoder>>,
    content_type: String,
    collector: Option<JoinHandle<Result<ChunkAssembler, CaptureError>>>,
    timer: Option<TickTimer>,
    visualizer: Option<VisualizationHandle>,
}

impl ActiveCapture {
    fn new(device: Box<dyn DeviceStream>, content_type: String) -> Self {
        Self {
            device,
            device_released: false,
            tap: None,
            encoder: None,
            content_type,
            collector: None,
            timer: None,
            visualizer: None,
        }
    }

    /// Stop the timer, then the visualization loop, waiting for its last frame
    async fn halt(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
        if let Some(visualizer) = self.visualizer.take() {
            let frames = visualizer.stop().await;
            debug!("Visualizer rendered {} frames", frames);
        }
    }

    /// Normal stop: flush the encoder and assemble the artifact
    ///
    /// A notification on `abort` cuts the flush short; the capture is then
    /// released and `SessionClosed` returned.
    async fn finish(
        mut self,
        timeout: Duration,
        duration_secs: u64,
        abort: &Notify,
    ) -> Result<FinishedArtifact, CaptureError> {
        self.halt().await;

        let collected = tokio::select! {
            biased;
            _ = abort.notified() => {
                info!("Encoder flush aborted");
                Err(CaptureError::SessionClosed)
            }
            result = self.flush(timeout) => result,
        };

        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        self.release_inputs();

        let assembler = collected?;
        let bytes = assembler.into_bytes();
        if bytes.is_empty() {
            warn!("Encoder produced no data; recording is empty");
        }

        Ok(FinishedArtifact::new(
            bytes,
            self.content_type.clone(),
            duration_secs,
        ))
    }

    /// Stop the encoder and wait, up to `timeout`, for its remaining chunks
    async fn flush(&mut self, timeout: Duration) -> Result<ChunkAssembler, CaptureError> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.stop().await?;
        }

        let Some(collector) = self.collector.as_mut() else {
            return Err(CaptureError::EncodingFailure(
                "chunk collector is not running".to_string(),
            ));
        };

        match tokio::time::timeout(timeout, collector).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CaptureError::EncodingFailure(format!(
                "chunk collector failed: {}",
                join_error
            ))),
            Err(_) => Err(CaptureError::EncodingFailure(format!(
                "encoder did not flush within {:?}",
                timeout
            ))),
        }
    }

    /// Error or teardown: release everything, keep nothing
    async fn abandon(mut self) {
        self.halt().await;
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        if let Some(encoder) = self.encoder.as_mut() {
            if let Err(e) = encoder.stop().await {
                warn!("Encoder stop during release failed: {}", e);
            }
        }
        self.release_inputs();
    }

    fn release_inputs(&mut self) {
        self.encoder = None;
        if let Some(tap) = self.tap.take() {
            tap.release();
        }
        if !self.device_released {
            self.device.release();
            self.device_released = true;
            debug!("Device {} released", self.device.id());
        }
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
        self.visualizer = None;
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
        self.release_inputs();
    }
}
