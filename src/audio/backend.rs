use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::analysis::AnalysisTap;
use crate::error::CaptureError;

/// Audio sample data (16-bit PCM, mono)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since the device was acquired
    pub timestamp_ms: u64,
}

/// One fragment of encoded audio delivered during recording
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Position in the encoder's output, starting at 0
    pub sequence: u64,
    pub data: Bytes,
}

/// Events pushed by an encoder while it runs
///
/// The channel closing after `Encoder::stop` marks the end of the sequence.
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    Chunk(EncodedChunk),
    Failed(String),
}

/// Configuration for audio backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate of the frames the device produces
    pub sample_rate: u32,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
    /// Encoder timeslice: how much audio goes into one chunk
    pub chunk_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_duration_ms: 20,
            chunk_duration_ms: 1000,
        }
    }
}

/// Device acquisition
///
/// Implementations:
/// - `ReplayBackend`: streams a WAV file or a test tone in real time
/// - browser/platform bindings live outside this crate
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Request exclusive audio input
    ///
    /// May wait indefinitely on a permission decision. Fails with
    /// `PermissionDenied` or `DeviceUnavailable`.
    async fn acquire(&self) -> Result<Box<dyn DeviceStream>, CaptureError>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// A live, exclusively owned input stream
pub trait DeviceStream: Send + Sync {
    /// Identifier for log correlation
    fn id(&self) -> &str;

    /// Attach an encoder to this stream
    fn open_encoder(&self) -> Result<Box<dyn Encoder>, CaptureError>;

    /// Attach a frequency analysis tap to this stream
    fn open_analysis_tap(&self, fft_size: usize) -> Result<Arc<dyn AnalysisTap>, CaptureError>;

    /// Stop all underlying tracks
    fn release(&mut self);

    fn is_live(&self) -> bool;
}

/// Live encoding pipeline bound to one stream
#[async_trait::async_trait]
pub trait Encoder: Send {
    /// Start encoding
    ///
    /// Returns a channel receiver that will receive chunks in order
    async fn start(&mut self) -> Result<mpsc::Receiver<EncoderEvent>, CaptureError>;

    /// Ask the encoder to flush; the channel closes after the final chunk
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Container type of the produced bytes, if the encoder knows it
    fn content_type(&self) -> Option<String> {
        None
    }
}
