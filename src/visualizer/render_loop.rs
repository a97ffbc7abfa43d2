use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::layout::{layout_bars, Frame, PanelSize};
use crate::audio::AnalysisTap;

/// Receives rendered frames
///
/// The visualization loop is the only writer while it runs.
pub trait FrameSink: Send + Sync {
    fn render(&self, frame: &Frame);
}

/// Keeps the most recent frame, for headless use and tests
#[derive(Default)]
pub struct FrameBuffer {
    last: Mutex<Option<Frame>>,
    frames: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

impl FrameSink for FrameBuffer {
    fn render(&self, frame: &Frame) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame.clone());
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle to a running visualization loop
pub struct VisualizationHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<u64>>,
}

impl VisualizationHandle {
    /// Spawn the per-frame sampler
    ///
    /// Each tick pulls a snapshot from `tap`, lays it out for `panel` and
    /// hands the frame to `sink`. The loop ends on `stop` or as soon as the
    /// tap reports it has been released.
    pub fn spawn(
        tap: Arc<dyn AnalysisTap>,
        sink: Arc<dyn FrameSink>,
        panel: PanelSize,
        frame_interval: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut snapshot = vec![0u8; tap.frequency_bin_count()];
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut frames = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                        if !tap.read_frequency_data(&mut snapshot) {
                            warn!("Analysis tap released under a running visualizer");
                            break;
                        }
                        sink.render(&layout_bars(&snapshot, panel));
                        frames += 1;
                    }
                }
            }

            debug!("Visualization loop ended after {} frames", frames);
            frames
        });

        Self {
            stop_tx,
            task: Some(task),
        }
    }

    /// Stop the loop and wait until its last frame has been rendered
    ///
    /// Returns the number of frames rendered.
    pub async fn stop(mut self) -> u64 {
        let _ = self.stop_tx.send(true);
        match self.task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for VisualizationHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
