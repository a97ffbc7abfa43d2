// Replay audio backend
//
// Stands in for a microphone on machines without one (CLI demos, CI): the
// "device" plays a WAV file or a sine tone in real time, broadcasting
// frames to the encoder and the analysis tap exactly like a live input.

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::analysis::{AnalysisTap, SpectrumAnalyzer};
use super::backend::{
    AudioBackend, AudioBackendConfig, AudioFrame, DeviceStream, EncodedChunk, Encoder,
    EncoderEvent,
};
use super::file::AudioFile;
use crate::error::CaptureError;

/// Where replayed audio comes from
#[derive(Debug, Clone)]
pub enum ReplaySource {
    /// WAV file, played once and followed by silence
    File(PathBuf),
    /// Endless sine tone
    Tone { frequency_hz: f32, amplitude: f32 },
}

/// Replay backend
pub struct ReplayBackend {
    source: ReplaySource,
    config: AudioBackendConfig,
    deny_permission: bool,
    live_streams: Arc<AtomicUsize>,
}

impl ReplayBackend {
    pub fn new(source: ReplaySource, config: AudioBackendConfig) -> Self {
        Self {
            source,
            config,
            deny_permission: false,
            live_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Refuse every acquisition, as a user declining the permission prompt would
    pub fn deny_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    /// Streams acquired and not yet released
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    fn load_samples(&self) -> Result<(Vec<i16>, bool), CaptureError> {
        match &self.source {
            ReplaySource::File(path) => {
                if !path.exists() {
                    return Err(CaptureError::DeviceUnavailable(format!(
                        "replay file not found: {}",
                        path.display()
                    )));
                }
                let audio = AudioFile::open(path)
                    .map_err(|e| CaptureError::DeviceUnavailable(format!("{:#}", e)))?;
                let (samples, rate) = audio.decimate_to(self.config.sample_rate);
                if rate != self.config.sample_rate {
                    warn!(
                        "Replay file is {}Hz, device runs at {}Hz; pitch will differ",
                        rate, self.config.sample_rate
                    );
                }
                Ok((samples, false))
            }
            ReplaySource::Tone {
                frequency_hz,
                amplitude,
            } => {
                let rate = self.config.sample_rate as f32;
                let samples = (0..self.config.sample_rate)
                    .map(|n| {
                        let phase = 2.0 * std::f32::consts::PI * frequency_hz * n as f32 / rate;
                        (phase.sin() * amplitude.clamp(0.0, 1.0) * i16::MAX as f32) as i16
                    })
                    .collect();
                Ok((samples, true))
            }
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for ReplayBackend {
    async fn acquire(&self) -> Result<Box<dyn DeviceStream>, CaptureError> {
        if self.deny_permission {
            return Err(CaptureError::PermissionDenied(
                "replay backend is configured to deny access".to_string(),
            ));
        }

        let (samples, looping) = self.load_samples()?;
        let stream = ReplayStream::start(
            samples,
            looping,
            self.config.clone(),
            Arc::clone(&self.live_streams),
        );

        Ok(Box::new(stream))
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// A running replay "device"
pub struct ReplayStream {
    id: String,
    config: AudioBackendConfig,
    frames_tx: Option<broadcast::Sender<AudioFrame>>,
    pump: Option<JoinHandle<()>>,
    live_streams: Arc<AtomicUsize>,
}

impl ReplayStream {
    fn start(
        samples: Vec<i16>,
        looping: bool,
        config: AudioBackendConfig,
        live_streams: Arc<AtomicUsize>,
    ) -> Self {
        let id = format!("replay-{}", &Uuid::new_v4().to_string()[..8]);
        let (frames_tx, _) = broadcast::channel(64);

        let frame_len = (config.sample_rate as u64 * config.frame_duration_ms / 1000).max(1) as usize;
        let period = std::time::Duration::from_millis(config.frame_duration_ms.max(1));
        let sample_rate = config.sample_rate;
        let tx = frames_tx.clone();

        let pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut cursor = 0usize;
            let mut timestamp_ms = 0u64;

            loop {
                ticker.tick().await;

                let mut frame = Vec::with_capacity(frame_len);
                while frame.len() < frame_len {
                    if cursor >= samples.len() {
                        if looping && !samples.is_empty() {
                            cursor = 0;
                        } else {
                            frame.resize(frame_len, 0);
                            break;
                        }
                    }
                    let take = (frame_len - frame.len()).min(samples.len() - cursor);
                    frame.extend_from_slice(&samples[cursor..cursor + take]);
                    cursor += take;
                }

                // No subscribers yet is fine; frames are simply not heard
                let _ = tx.send(AudioFrame {
                    samples: frame,
                    sample_rate,
                    timestamp_ms,
                });
                timestamp_ms += period.as_millis() as u64;
            }
        });

        live_streams.fetch_add(1, Ordering::SeqCst);
        info!("Replay stream {} acquired ({}Hz)", id, config.sample_rate);

        Self {
            id,
            config,
            frames_tx: Some(frames_tx),
            pump: Some(pump),
            live_streams,
        }
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<AudioFrame>, CaptureError> {
        self.frames_tx
            .as_ref()
            .map(|tx| tx.subscribe())
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("stream {} released", self.id)))
    }
}

impl DeviceStream for ReplayStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn open_encoder(&self) -> Result<Box<dyn Encoder>, CaptureError> {
        Ok(Box::new(PcmEncoder::new(
            self.subscribe()?,
            self.config.sample_rate,
            self.config.chunk_duration_ms,
        )))
    }

    fn open_analysis_tap(&self, fft_size: usize) -> Result<Arc<dyn AnalysisTap>, CaptureError> {
        let analyzer = Arc::new(SpectrumAnalyzer::new(fft_size)?);
        let mut frames = self.subscribe()?;
        let feed = Arc::clone(&analyzer);

        tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => {
                        if feed.is_released() {
                            break;
                        }
                        feed.push_samples(&frame.samples);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Analysis feed stopped");
        });

        Ok(analyzer)
    }

    fn release(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            self.frames_tx = None;
            self.live_streams.fetch_sub(1, Ordering::SeqCst);
            info!("Replay stream {} released", self.id);
        }
    }

    fn is_live(&self) -> bool {
        self.pump.is_some()
    }
}

impl Drop for ReplayStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Emits raw little-endian PCM on a fixed timeslice
pub struct PcmEncoder {
    frames: Option<broadcast::Receiver<AudioFrame>>,
    sample_rate: u32,
    chunk_samples: usize,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PcmEncoder {
    pub fn new(
        frames: broadcast::Receiver<AudioFrame>,
        sample_rate: u32,
        chunk_duration_ms: u64,
    ) -> Self {
        let chunk_samples = (sample_rate as u64 * chunk_duration_ms / 1000).max(1) as usize;
        Self {
            frames: Some(frames),
            sample_rate,
            chunk_samples,
            stop_tx: None,
            task: None,
        }
    }
}

fn pcm_bytes(samples: &[i16]) -> Bytes {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>().into()
}

#[async_trait::async_trait]
impl Encoder for PcmEncoder {
    async fn start(&mut self) -> Result<mpsc::Receiver<EncoderEvent>, CaptureError> {
        let mut frames = self
            .frames
            .take()
            .ok_or_else(|| CaptureError::EncodingFailure("encoder already started".to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let chunk_samples = self.chunk_samples;

        let task = tokio::spawn(async move {
            let mut pending: Vec<i16> = Vec::with_capacity(chunk_samples * 2);
            let mut sequence = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    frame = frames.recv() => match frame {
                        Ok(frame) => {
                            pending.extend_from_slice(&frame.samples);
                            while pending.len() >= chunk_samples {
                                let data = pcm_bytes(&pending[..chunk_samples]);
                                pending.drain(..chunk_samples);
                                let chunk = EncodedChunk { sequence, data };
                                sequence += 1;
                                if tx.send(EncoderEvent::Chunk(chunk)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("PCM encoder fell behind, {} frames dropped", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            if !pending.is_empty() {
                let chunk = EncodedChunk {
                    sequence,
                    data: pcm_bytes(&pending),
                };
                let _ = tx.send(EncoderEvent::Chunk(chunk)).await;
            }
            debug!("PCM encoder flushed after {} chunks", sequence + 1);
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        Ok(())
    }

    fn content_type(&self) -> Option<String> {
        Some(format!("audio/L16;rate={};channels=1", self.sample_rate))
    }
}

impl Drop for PcmEncoder {
    fn drop(&mut self) {
        // Never stopped: nobody is waiting for a flush
        if self.stop_tx.is_some() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}
