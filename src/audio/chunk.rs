use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{EncodedChunk, EncoderEvent};
use crate::error::CaptureError;

/// Summary of what the assembler received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Non-empty chunks appended
    pub chunks: usize,
    /// Zero-length chunks skipped
    pub empty_chunks: usize,
    /// Sequence numbers that never arrived
    pub missing_chunks: u64,
    pub total_bytes: usize,
}

/// Buffers encoded chunks in arrival order
///
/// The final payload is the plain concatenation of every non-empty chunk.
/// Sequence gaps are tolerated (the artifact is simply shorter) but logged.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    chunks: Vec<Bytes>,
    next_sequence: u64,
    stats: ChunkStats,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk
    pub fn push(&mut self, chunk: EncodedChunk) {
        if chunk.sequence > self.next_sequence {
            let missing = chunk.sequence - self.next_sequence;
            warn!(
                "Encoder skipped {} chunk(s) before sequence {}; recording will be truncated",
                missing, chunk.sequence
            );
            self.stats.missing_chunks += missing;
        } else if chunk.sequence < self.next_sequence {
            warn!(
                "Chunk {} arrived after {}; appending in arrival order",
                chunk.sequence,
                self.next_sequence.saturating_sub(1)
            );
        }
        self.next_sequence = self.next_sequence.max(chunk.sequence + 1);

        if chunk.data.is_empty() {
            self.stats.empty_chunks += 1;
            return;
        }

        self.stats.chunks += 1;
        self.stats.total_bytes += chunk.data.len();
        self.chunks.push(chunk.data);
    }

    /// Drain an encoder channel until it closes
    ///
    /// An `EncoderEvent::Failed` aborts collection and discards the buffer.
    pub async fn collect(mut self, mut rx: mpsc::Receiver<EncoderEvent>) -> Result<Self, CaptureError> {
        debug!("Chunk collection started");

        while let Some(event) = rx.recv().await {
            match event {
                EncoderEvent::Chunk(chunk) => self.push(chunk),
                EncoderEvent::Failed(reason) => {
                    warn!(
                        "Encoder failed after {} chunk(s): {}",
                        self.stats.chunks, reason
                    );
                    return Err(CaptureError::EncodingFailure(reason));
                }
            }
        }

        info!(
            "Chunk collection complete: {} chunks, {} bytes",
            self.stats.chunks, self.stats.total_bytes
        );

        Ok(self)
    }

    pub fn stats(&self) -> &ChunkStats {
        &self.stats
    }

    /// Concatenate everything received
    pub fn into_bytes(self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut out = BytesMut::with_capacity(self.stats.total_bytes);
                for chunk in &self.chunks {
                    out.extend_from_slice(chunk);
                }
                out.freeze()
            }
        }
    }
}
