pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod questionnaire;
pub mod recorder;
pub mod session;
pub mod submit;
pub mod visualizer;

pub use audio::{
    AnalysisTap, AudioBackend, AudioBackendConfig, AudioFile, AudioFrame, DeviceStream,
    EncodedChunk, Encoder, EncoderEvent, FinishedArtifact, ObjectUrl, ObjectUrls, ReplayBackend,
    ReplaySource, SpectrumAnalyzer,
};
pub use config::Config;
pub use error::{CaptureError, ErrorKind, FailureClass, Recovery};
pub use http::{create_router, AppState};
pub use playback::{AudioSink, PlaybackController, PlaybackState, TimedSink};
pub use questionnaire::{default_questions, Question, Questionnaire};
pub use recorder::{QuestionRecorder, RecorderSnapshot};
pub use session::{format_elapsed, CaptureSession, SessionConfig, SessionSnapshot, SessionState};
pub use submit::{HttpSubmitter, Submission, SubmissionReceipt, Submitter};
pub use visualizer::{layout_bars, Bar, Frame, FrameBuffer, FrameSink, PanelSize};
