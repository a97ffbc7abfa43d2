//! Audio collaborators consumed by the capture session
//!
//! - `backend`: device acquisition, live streams and encoders
//! - `analysis`: frequency taps for the visualizer
//! - `chunk`: ordered assembly of encoded chunks
//! - `artifact`: finished recordings and their temporary references
//! - `replay`: a file/tone-driven device for machines without a microphone

pub mod analysis;
pub mod artifact;
pub mod backend;
pub mod chunk;
pub mod file;
pub mod replay;

pub use analysis::{AnalysisTap, SpectrumAnalyzer};
pub use artifact::{FinishedArtifact, ObjectUrl, ObjectUrls};
pub use backend::{
    AudioBackend, AudioBackendConfig, AudioFrame, DeviceStream, EncodedChunk, Encoder,
    EncoderEvent,
};
pub use chunk::{ChunkAssembler, ChunkStats};
pub use file::AudioFile;
pub use replay::{PcmEncoder, ReplayBackend, ReplaySource, ReplayStream};
