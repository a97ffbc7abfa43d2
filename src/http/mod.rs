//! HTTP API for collecting recorded answers
//!
//! - POST /api/responses - Upload one answer (multipart)
//! - GET /api/responses?userId= - List stored answers
//! - GET /api/audio/:id - Fetch stored audio
//! - POST /api/transcribe - Placeholder transcription
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, StoredResponse};
