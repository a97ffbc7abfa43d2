//! Capture session management
//!
//! This module provides the `CaptureSession` state machine that manages:
//! - Device acquisition and cancellation of pending requests
//! - The encoder pipeline and artifact assembly
//! - The elapsed-time timer and the visualization loop
//! - Resource release on stop, error and teardown

mod config;
mod session;
mod state;
mod timer;

pub use config::SessionConfig;
pub use session::CaptureSession;
pub use state::{SessionSnapshot, SessionState};
pub use timer::{format_elapsed, TickTimer};
