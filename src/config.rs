use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub visualization: VisualizationConfig,
    pub submission: SubmissionConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub content_type: String,
    pub fft_size: usize,
    pub timer_period_ms: u64,
    pub frame_interval_ms: u64,
    pub finalize_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisualizationConfig {
    pub panel_width: f32,
    pub panel_height: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    pub endpoint: String,
    pub user_id: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionConfig {
    pub api_key: Option<String>,
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// over built-in defaults, then apply `AUDIOFORM__SECTION__KEY` overrides
    ///
    /// A missing file is not an error.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("AUDIOFORM").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("service.name", "audioform")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 3000)?
            .set_default("capture.content_type", "audio/webm")?
            .set_default("capture.fft_size", 256)?
            .set_default("capture.timer_period_ms", 1000)?
            .set_default("capture.frame_interval_ms", 16)?
            .set_default("capture.finalize_timeout_ms", 5000)?
            .set_default("visualization.panel_width", 500.0)?
            .set_default("visualization.panel_height", 96.0)?
            .set_default("submission.endpoint", "http://127.0.0.1:3000/api/responses")?
            .set_default("submission.timeout_secs", 30)?
            .set_default("server.max_upload_bytes", 25 * 1024 * 1024)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "audioform".to_string(),
                http: HttpConfig {
                    bind: "127.0.0.1".to_string(),
                    port: 3000,
                },
            },
            capture: CaptureConfig {
                content_type: "audio/webm".to_string(),
                fft_size: 256,
                timer_period_ms: 1000,
                frame_interval_ms: 16,
                finalize_timeout_ms: 5000,
            },
            visualization: VisualizationConfig {
                panel_width: 500.0,
                panel_height: 96.0,
            },
            submission: SubmissionConfig {
                endpoint: "http://127.0.0.1:3000/api/responses".to_string(),
                user_id: None,
                timeout_secs: 30,
            },
            server: ServerConfig {
                max_upload_bytes: 25 * 1024 * 1024,
            },
            transcription: TranscriptionConfig::default(),
        }
    }
}
