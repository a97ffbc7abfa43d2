// Test doubles shared by the integration tests
//
// `MockBackend` hands out devices whose encoder is driven by the test:
// chunks and failures are pushed through the backend handle. Every release
// is counted and appended to an ordered event log.

#![allow(dead_code)]

use async_trait::async_trait;
use audioform::audio::{
    AnalysisTap, AudioBackend, DeviceStream, EncodedChunk, Encoder, EncoderEvent,
};
use audioform::{CaptureError, Submission, SubmissionReceipt, Submitter};
use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    Grant,
    Deny,
    Unavailable,
}

#[derive(Default)]
struct EncoderControl {
    tx: Option<mpsc::Sender<EncoderEvent>>,
    sequence: u64,
    flush: Option<Bytes>,
    stall_flush: bool,
}

#[derive(Default)]
struct Counters {
    acquired: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    released: AtomicUsize,
    taps_released: AtomicUsize,
    encoders_stopped: AtomicUsize,
    events: Mutex<Vec<&'static str>>,
}

impl Counters {
    fn log(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct MockBackend {
    mode: Mutex<AcquireMode>,
    gate: Option<Arc<Notify>>,
    fail_encoder_open: AtomicBool,
    counters: Arc<Counters>,
    control: Arc<Mutex<EncoderControl>>,
}

impl MockBackend {
    pub fn granting() -> Arc<Self> {
        Arc::new(Self::with_mode(AcquireMode::Grant, None))
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self::with_mode(AcquireMode::Deny, None))
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::with_mode(AcquireMode::Unavailable, None))
    }

    /// Acquisition blocks until `open_gate`, like a pending permission prompt
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::with_mode(AcquireMode::Grant, Some(Arc::new(Notify::new()))))
    }

    fn with_mode(mode: AcquireMode, gate: Option<Arc<Notify>>) -> Self {
        Self {
            mode: Mutex::new(mode),
            gate,
            fail_encoder_open: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            control: Arc::new(Mutex::new(EncoderControl::default())),
        }
    }

    pub fn set_mode(&self, mode: AcquireMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn fail_encoder_open(&self) {
        self.fail_encoder_open.store(true, Ordering::SeqCst);
    }

    /// Deliver one encoded chunk from the running encoder
    pub fn push_chunk(&self, data: &[u8]) -> bool {
        let mut control = self.control.lock().unwrap();
        let sequence = control.sequence;
        let Some(tx) = control.tx.clone() else {
            return false;
        };
        control.sequence += 1;
        tx.try_send(EncoderEvent::Chunk(EncodedChunk {
            sequence,
            data: Bytes::copy_from_slice(data),
        }))
        .is_ok()
    }

    /// Chunk emitted by the encoder when it is asked to stop
    pub fn set_flush_chunk(&self, data: &[u8]) {
        self.control.lock().unwrap().flush = Some(Bytes::copy_from_slice(data));
    }

    /// The encoder acknowledges `stop` but never closes its channel
    pub fn stall_flush(&self) {
        self.control.lock().unwrap().stall_flush = true;
    }

    pub fn fail_encoder(&self, reason: &str) -> bool {
        let tx = self.control.lock().unwrap().tx.clone();
        match tx {
            Some(tx) => tx.try_send(EncoderEvent::Failed(reason.to_string())).is_ok(),
            None => false,
        }
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn taps_released(&self) -> usize {
        self.counters.taps_released.load(Ordering::SeqCst)
    }

    pub fn encoders_stopped(&self) -> usize {
        self.counters.encoders_stopped.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.counters.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioBackend for MockBackend {
    async fn acquire(&self) -> Result<Box<dyn DeviceStream>, CaptureError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let mode = *self.mode.lock().unwrap();
        match mode {
            AcquireMode::Deny => Err(CaptureError::PermissionDenied("user declined".into())),
            AcquireMode::Unavailable => {
                Err(CaptureError::DeviceUnavailable("no input device".into()))
            }
            AcquireMode::Grant => {
                let n = self.counters.acquired.fetch_add(1, Ordering::SeqCst) + 1;
                let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.counters.max_live.fetch_max(live, Ordering::SeqCst);
                self.counters.log("device_acquire");

                Ok(Box::new(MockDevice {
                    id: format!("mock-{}", n),
                    released: false,
                    fail_encoder_open: self.fail_encoder_open.load(Ordering::SeqCst),
                    counters: Arc::clone(&self.counters),
                    control: Arc::clone(&self.control),
                }))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockDevice {
    id: String,
    released: bool,
    fail_encoder_open: bool,
    counters: Arc<Counters>,
    control: Arc<Mutex<EncoderControl>>,
}

impl DeviceStream for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn open_encoder(&self) -> Result<Box<dyn Encoder>, CaptureError> {
        if self.fail_encoder_open {
            return Err(CaptureError::EncodingFailure("unsupported format".into()));
        }
        Ok(Box::new(MockEncoder {
            counters: Arc::clone(&self.counters),
            control: Arc::clone(&self.control),
        }))
    }

    fn open_analysis_tap(&self, fft_size: usize) -> Result<Arc<dyn AnalysisTap>, CaptureError> {
        Ok(Arc::new(MockTap {
            bins: fft_size / 2,
            released: AtomicBool::new(false),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        self.counters.log("device_release");
    }

    fn is_live(&self) -> bool {
        !self.released
    }
}

struct MockEncoder {
    counters: Arc<Counters>,
    control: Arc<Mutex<EncoderControl>>,
}

#[async_trait]
impl Encoder for MockEncoder {
    async fn start(&mut self) -> Result<mpsc::Receiver<EncoderEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel(64);
        let mut control = self.control.lock().unwrap();
        control.tx = Some(tx);
        control.sequence = 0;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.counters.encoders_stopped.fetch_add(1, Ordering::SeqCst);
        self.counters.log("encoder_stop");

        let mut control = self.control.lock().unwrap();
        if control.stall_flush {
            return Ok(());
        }
        if let (Some(tx), Some(flush)) = (control.tx.take(), control.flush.take()) {
            let sequence = control.sequence;
            control.sequence += 1;
            let _ = tx.try_send(EncoderEvent::Chunk(EncodedChunk {
                sequence,
                data: flush,
            }));
        }
        Ok(())
    }

    fn content_type(&self) -> Option<String> {
        Some("audio/webm".to_string())
    }
}

/// Reports a constant mid-level spectrum
struct MockTap {
    bins: usize,
    released: AtomicBool,
    counters: Arc<Counters>,
}

impl AnalysisTap for MockTap {
    fn frequency_bin_count(&self) -> usize {
        self.bins
    }

    fn read_frequency_data(&self, out: &mut [u8]) -> bool {
        if self.is_released() {
            return false;
        }
        out.fill(128);
        true
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.counters.taps_released.fetch_add(1, Ordering::SeqCst);
            self.counters.log("tap_release");
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Accepts every submission and keeps a copy
#[derive(Default)]
pub struct RecordingSubmitter {
    pub received: Mutex<Vec<Submission>>,
}

impl RecordingSubmitter {
    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Submitter for RecordingSubmitter {
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, CaptureError> {
        self.received.lock().unwrap().push(submission.clone());
        Ok(SubmissionReceipt {
            id: format!("resp-{}", self.count()),
            question_id: submission.question_id.clone(),
            user_id: submission
                .user_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
            file_name: submission.file_name(),
            file_size: submission.artifact.len(),
            timestamp: Utc::now(),
        })
    }
}

/// Rejects every submission with a transient failure
#[derive(Default)]
pub struct FailingSubmitter {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Submitter for FailingSubmitter {
    async fn submit(&self, _submission: &Submission) -> Result<SubmissionReceipt, CaptureError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CaptureError::transient("503 Service Unavailable"))
    }
}

/// Holds every submission until released
pub struct SlowSubmitter {
    pub release: Notify,
    pub inner: RecordingSubmitter,
    reject: bool,
}

impl SlowSubmitter {
    pub fn new() -> Self {
        Self {
            release: Notify::new(),
            inner: RecordingSubmitter::default(),
            reject: false,
        }
    }

    /// Rejects each submission once released
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl Submitter for SlowSubmitter {
    async fn submit(&self, submission: &Submission) -> Result<SubmissionReceipt, CaptureError> {
        self.release.notified().await;
        if self.reject {
            return Err(CaptureError::transient("503 Service Unavailable"));
        }
        self.inner.submit(submission).await
    }
}
