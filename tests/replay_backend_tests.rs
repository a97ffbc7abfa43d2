// Integration tests for the replay device and WAV input
//
// These run a real capture session over replayed audio: a generated WAV
// file or a test tone, encoded as raw PCM.

use anyhow::Result;
use audioform::audio::AudioBackend;
use audioform::{
    AudioBackendConfig, AudioFile, CaptureError, CaptureSession, FrameBuffer, ReplayBackend,
    ReplaySource, SessionConfig, SessionState,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_tone_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    let total = (sample_rate as f32 * seconds) as u32;
    for n in 0..total {
        let t = n as f32 / sample_rate as f32;
        let sample = ((2.0 * std::f32::consts::PI * 1000.0 * t).sin() * 12000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_downmixes_stereo() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    write_tone_wav(&path, 16000, 2, 0.5)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.samples.len(), 8000, "Stereo frames should become mono samples");
    assert!((audio.duration_seconds - 0.5).abs() < 1e-6);
    assert!(audio.path.contains("stereo.wav"));
    Ok(())
}

#[test]
fn test_audio_file_decimates_to_device_rate() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("hifi.wav");
    write_tone_wav(&path, 48000, 1, 0.25)?;

    let audio = AudioFile::open(&path)?;
    let (samples, rate) = audio.decimate_to(16000);

    assert_eq!(rate, 16000);
    assert_eq!(samples.len(), 4000);

    // Never upsamples
    let (same, same_rate) = audio.decimate_to(96000);
    assert_eq!(same_rate, 48000);
    assert_eq!(same.len(), audio.samples.len());
    Ok(())
}

#[test]
fn test_audio_file_missing_is_an_error() {
    assert!(AudioFile::open("/nonexistent/answer.wav").is_err());
}

#[tokio::test]
async fn test_denying_backend_refuses_acquisition() -> Result<()> {
    let backend = ReplayBackend::new(
        ReplaySource::Tone {
            frequency_hz: 440.0,
            amplitude: 0.5,
        },
        AudioBackendConfig::default(),
    )
    .deny_permission();

    let result = backend.acquire().await;
    assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
    assert_eq!(backend.live_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_replay_file_is_unavailable_device() -> Result<()> {
    let backend = ReplayBackend::new(
        ReplaySource::File("/nonexistent/answer.wav".into()),
        AudioBackendConfig::default(),
    );

    let result = backend.acquire().await;
    assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_tone_recording_produces_pcm_artifact() -> Result<()> {
    let backend = Arc::new(ReplayBackend::new(
        ReplaySource::Tone {
            frequency_hz: 1000.0,
            amplitude: 0.5,
        },
        AudioBackendConfig::default(),
    ));
    let frames = Arc::new(FrameBuffer::new());
    let session =
        CaptureSession::with_frame_sink(backend.clone(), SessionConfig::default(), frames.clone());

    session.start().await?;
    assert_eq!(backend.live_streams(), 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(session.elapsed_seconds(), 2);

    let peak = frames.last_frame().map(|f| f.peak_height()).unwrap_or(0.0);
    assert!(peak > 0.0, "A 1kHz tone should light up the bars");

    let artifact = session.stop().await?.expect("artifact");
    assert_eq!(artifact.content_type, "audio/L16;rate=16000;channels=1");
    assert_eq!(artifact.file_extension(), "pcm");
    assert_eq!(artifact.len() % 2, 0, "Whole 16-bit samples only");

    // 2.5s of 16kHz mono, two bytes per sample
    let bytes_per_second = 16000 * 2;
    assert!(
        artifact.len() >= 2 * bytes_per_second && artifact.len() <= 3 * bytes_per_second,
        "Unexpected artifact size {}",
        artifact.len()
    );

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(backend.live_streams(), 0, "Stream released after stop");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_file_recording_replays_then_goes_silent() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("answer.wav");
    write_tone_wav(&path, 16000, 1, 0.5)?;

    let backend = Arc::new(ReplayBackend::new(
        ReplaySource::File(path),
        AudioBackendConfig::default(),
    ));
    let frames = Arc::new(FrameBuffer::new());
    let session =
        CaptureSession::with_frame_sink(backend.clone(), SessionConfig::default(), frames.clone());

    session.start().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let during = frames.last_frame().map(|f| f.peak_height()).unwrap_or(0.0);
    assert!(during > 0.0, "File audio should show while it plays");

    tokio::time::sleep(Duration::from_millis(1300)).await;
    let artifact = session.stop().await?.expect("artifact");

    // At least the file itself, padded with silence afterwards
    assert!(artifact.len() >= 8000 * 2);

    session.teardown().await;
    assert_eq!(backend.live_streams(), 0);
    Ok(())
}
