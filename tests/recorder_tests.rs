// Integration tests for the per-question recorder
//
// Covers the record → play → submit flow and how failed submissions keep
// the recording.

mod support;

use anyhow::Result;
use audioform::{
    CaptureError, CaptureSession, FailureClass, ObjectUrls, PlaybackController, PlaybackState,
    QuestionRecorder, SessionConfig, SessionState, Submitter, TimedSink,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{FailingSubmitter, MockBackend, RecordingSubmitter, SlowSubmitter};

struct Harness {
    backend: Arc<MockBackend>,
    urls: ObjectUrls,
    recorder: Arc<QuestionRecorder>,
}

fn harness(submitter: Arc<dyn Submitter>) -> Harness {
    let backend = MockBackend::granting();
    let urls = ObjectUrls::new();
    let session = CaptureSession::new(backend.clone(), SessionConfig::default());
    let playback = PlaybackController::new(Arc::new(TimedSink::new(urls.clone())), urls.clone());
    let recorder = QuestionRecorder::new("q1", session, playback, submitter).with_user_id("user123");

    Harness {
        backend,
        urls,
        recorder: Arc::new(recorder),
    }
}

async fn record(h: &Harness, data: &[u8]) -> Result<()> {
    h.recorder.start().await?;
    h.backend.push_chunk(data);
    h.recorder.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_successful_submit_resets_to_idle() -> Result<()> {
    let submitter = Arc::new(RecordingSubmitter::default());
    let h = harness(submitter.clone());

    record(&h, b"answer").await?;
    assert_eq!(h.recorder.snapshot().state, SessionState::Stopped);
    assert_eq!(h.urls.outstanding(), 1);

    let receipt = h.recorder.submit().await?;
    assert_eq!(receipt.question_id, "q1");
    assert_eq!(receipt.user_id, "user123");
    assert_eq!(receipt.file_name, "question_q1.webm");
    assert_eq!(receipt.file_size, 6);

    let sent = submitter.received.lock().unwrap()[0].clone();
    assert_eq!(&sent.artifact.bytes[..], b"answer");

    let snapshot = h.recorder.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.has_artifact);
    assert_eq!(snapshot.elapsed_display, "00:00");
    assert_eq!(h.urls.outstanding(), 0, "Reference revoked after submit");
    assert_eq!(h.recorder.playback().state(), PlaybackState::Empty);
    Ok(())
}

#[tokio::test]
async fn test_failed_submit_keeps_recording() -> Result<()> {
    let submitter = Arc::new(FailingSubmitter::default());
    let h = harness(submitter.clone());

    record(&h, b"answer").await?;
    let result = h.recorder.submit().await;

    match result {
        Err(CaptureError::SubmissionFailure { class, .. }) => {
            assert_eq!(class, FailureClass::Transient)
        }
        other => panic!("expected a submission failure, got {:?}", other),
    }

    let snapshot = h.recorder.snapshot();
    assert_eq!(snapshot.state, SessionState::Stopped, "Still Stopped after failure");
    assert!(snapshot.has_artifact);
    assert!(!snapshot.is_submitting);
    assert_eq!(h.urls.outstanding(), 1);

    // Retry sends the same artifact again
    assert!(h.recorder.submit().await.is_err());
    assert_eq!(submitter.attempts.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_submit_requires_a_finished_recording() -> Result<()> {
    let h = harness(Arc::new(RecordingSubmitter::default()));

    assert!(matches!(
        h.recorder.submit().await,
        Err(CaptureError::NothingToSubmit(_))
    ));

    h.recorder.start().await?;
    assert!(matches!(
        h.recorder.submit().await,
        Err(CaptureError::NothingToSubmit(_))
    ));

    // Stopped with zero bytes
    h.recorder.stop().await?;
    assert!(matches!(
        h.recorder.submit().await,
        Err(CaptureError::NothingToSubmit(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_submit_is_refused() -> Result<()> {
    let submitter = Arc::new(SlowSubmitter::new());
    let h = harness(submitter.clone());
    record(&h, b"answer").await?;

    let first = tokio::spawn({
        let recorder = Arc::clone(&h.recorder);
        async move { recorder.submit().await }
    });
    while !h.recorder.snapshot().is_submitting {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        h.recorder.submit().await,
        Err(CaptureError::SubmissionInProgress)
    ));
    assert!(matches!(
        h.recorder.start().await,
        Err(CaptureError::SubmissionInProgress)
    ));
    assert!(matches!(
        h.recorder.reset().await,
        Err(CaptureError::SubmissionInProgress)
    ));

    submitter.release.notify_one();
    first.await??;

    assert_eq!(submitter.inner.count(), 1, "Only one submission sent");
    assert_eq!(h.recorder.snapshot().state, SessionState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_reset_during_failed_submit_keeps_take() -> Result<()> {
    let submitter = Arc::new(SlowSubmitter::rejecting());
    let h = harness(submitter.clone());
    record(&h, b"answer").await?;

    let first = tokio::spawn({
        let recorder = Arc::clone(&h.recorder);
        async move { recorder.submit().await }
    });
    while !h.recorder.snapshot().is_submitting {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        h.recorder.reset().await,
        Err(CaptureError::SubmissionInProgress)
    ));
    assert!(h.recorder.snapshot().has_artifact);

    submitter.release.notify_one();
    assert!(first.await?.is_err());

    let snapshot = h.recorder.snapshot();
    assert_eq!(snapshot.state, SessionState::Stopped);
    assert!(snapshot.has_artifact, "Failed upload keeps the take");
    assert!(!snapshot.is_submitting);
    assert_eq!(h.urls.outstanding(), 1);

    // Once the upload has settled, reset goes through
    h.recorder.reset().await?;
    assert_eq!(h.recorder.snapshot().state, SessionState::Idle);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_play_then_record_again_stops_playback() -> Result<()> {
    let h = harness(Arc::new(RecordingSubmitter::default()));
    h.recorder.start().await?;
    h.backend.push_chunk(b"first");
    tokio::time::sleep(Duration::from_millis(2100)).await;
    h.recorder.stop().await?;

    h.recorder.play().await?;
    assert!(h.recorder.snapshot().is_playing);

    h.recorder.start().await?;
    assert!(!h.recorder.snapshot().is_playing, "Recording never overlaps playback");
    assert_eq!(h.urls.outstanding(), 0, "Old take's reference revoked");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    h.backend.push_chunk(b"second");
    h.recorder.stop().await?;

    let snapshot = h.recorder.snapshot();
    assert_eq!(snapshot.state, SessionState::Stopped);
    assert_eq!(snapshot.elapsed_display, "00:01");
    assert_eq!(
        h.recorder.playback().bound_artifact().await.map(|a| a.bytes.to_vec()),
        Some(b"second".to_vec())
    );
    Ok(())
}

#[tokio::test]
async fn test_play_requires_stopped_session() -> Result<()> {
    let h = harness(Arc::new(RecordingSubmitter::default()));

    assert!(matches!(h.recorder.play().await, Err(CaptureError::NothingToPlay)));

    h.recorder.start().await?;
    assert!(matches!(h.recorder.play().await, Err(CaptureError::NothingToPlay)));

    h.recorder.teardown().await;
    Ok(())
}

#[tokio::test]
async fn test_reset_discards_take() -> Result<()> {
    let h = harness(Arc::new(RecordingSubmitter::default()));
    record(&h, b"take").await?;

    h.recorder.reset().await?;

    let snapshot = h.recorder.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.has_artifact);
    assert_eq!(h.urls.outstanding(), 0);
    Ok(())
}

#[tokio::test]
async fn test_teardown_releases_device_and_references() -> Result<()> {
    let h = harness(Arc::new(RecordingSubmitter::default()));
    record(&h, b"take").await?;
    h.recorder.start().await?;

    h.recorder.teardown().await;
    h.recorder.teardown().await;

    assert_eq!(h.backend.live(), 0);
    assert_eq!(h.urls.outstanding(), 0);
    assert!(h.recorder.session().is_closed().await);
    Ok(())
}
