use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::visualizer::PanelSize;

/// Configuration for a capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Artifact content type when the encoder does not declare one
    pub content_type: String,

    /// Analysis FFT size; snapshots carry half as many buckets
    pub fft_size: usize,

    /// Elapsed-time resolution
    pub timer_period: Duration,

    /// Visualization refresh interval (~60 fps)
    pub frame_interval: Duration,

    /// How long `stop` waits for the encoder to flush
    pub finalize_timeout: Duration,

    /// Visualization panel dimensions
    pub panel: PanelSize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            content_type: "audio/webm".to_string(),
            fft_size: 256,
            timer_period: Duration::from_secs(1),
            frame_interval: Duration::from_millis(16),
            finalize_timeout: Duration::from_secs(5),
            panel: PanelSize::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            content_type: config.capture.content_type.clone(),
            fft_size: config.capture.fft_size,
            timer_period: Duration::from_millis(config.capture.timer_period_ms),
            frame_interval: Duration::from_millis(config.capture.frame_interval_ms),
            finalize_timeout: Duration::from_millis(config.capture.finalize_timeout_ms),
            panel: PanelSize {
                width: config.visualization.panel_width,
                height: config.visualization.panel_height,
            },
        }
    }
}
