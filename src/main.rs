use anyhow::{Context, Result};
use audioform::{
    create_router, default_questions, format_elapsed, AppState, AudioBackend,
    AudioBackendConfig, CaptureSession, Config, FrameBuffer, HttpSubmitter, ObjectUrls,
    PlaybackController, PlaybackState, QuestionRecorder, Questionnaire, ReplayBackend,
    ReplaySource, SessionConfig, Submitter, TimedSink,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// AudioForm - spoken answers to a feedback questionnaire
#[derive(Parser)]
#[command(name = "audioform")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/audioform")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the response server
    Serve,

    /// Record answers with the replay device and submit them
    Record {
        /// Answer only this question
        #[arg(short, long)]
        question: Option<String>,

        /// Seconds to record per answer
        #[arg(short, long, default_value = "3")]
        seconds: u64,

        /// WAV file to replay instead of a test tone
        #[arg(long)]
        source: Option<PathBuf>,

        /// Play each answer back before submitting
        #[arg(long)]
        play: bool,

        /// Keep answers local
        #[arg(long)]
        no_submit: bool,
    },

    /// List the questions
    Questions {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("audioform=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("AudioForm v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match args.command {
        Command::Serve => serve(&cfg).await,
        Command::Record {
            question,
            seconds,
            source,
            play,
            no_submit,
        } => record(&cfg, question, seconds, source, play, !no_submit).await,
        Command::Questions { json } => {
            let questions = default_questions();
            if json {
                println!("{}", serde_json::to_string_pretty(&questions)?);
            } else {
                for question in questions {
                    println!("{}  {}", question.id, question.text);
                }
            }
            Ok(())
        }
    }
}

async fn serve(cfg: &Config) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let app = create_router(AppState::from_config(cfg));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

async fn record(
    cfg: &Config,
    only: Option<String>,
    seconds: u64,
    source: Option<PathBuf>,
    play: bool,
    submit: bool,
) -> Result<()> {
    let source = match source {
        Some(path) => ReplaySource::File(path),
        None => ReplaySource::Tone {
            frequency_hz: 440.0,
            amplitude: 0.4,
        },
    };
    let backend: Arc<dyn AudioBackend> =
        Arc::new(ReplayBackend::new(source, AudioBackendConfig::default()));

    let submitter: Arc<dyn Submitter> = Arc::new(HttpSubmitter::new(
        cfg.submission.endpoint.clone(),
        Duration::from_secs(cfg.submission.timeout_secs),
    )?);

    let mut questionnaire = Questionnaire::default();
    if let Some(id) = &only {
        if !questionnaire.questions().iter().any(|q| &q.id == id) {
            anyhow::bail!("Unknown question {}", id);
        }
    }

    let questions = questionnaire.questions().to_vec();
    for question in questions {
        if only.as_ref().map_or(false, |id| id != &question.id) {
            continue;
        }
        println!("\n{}: {}", question.id, question.text);

        let frames = Arc::new(FrameBuffer::new());
        let session = CaptureSession::with_frame_sink(
            Arc::clone(&backend),
            SessionConfig::from_config(cfg),
            frames.clone(),
        );
        let urls = ObjectUrls::new();
        let playback = PlaybackController::new(Arc::new(TimedSink::new(urls.clone())), urls);
        let mut recorder = QuestionRecorder::new(
            question.id.clone(),
            session,
            playback,
            Arc::clone(&submitter),
        );
        if let Some(user_id) = &cfg.submission.user_id {
            recorder = recorder.with_user_id(user_id.clone());
        }

        let outcome = answer(&recorder, &frames, seconds, play, submit).await;
        recorder.teardown().await;

        match outcome {
            Ok(Some(receipt)) => {
                println!("  accepted as {}", receipt.id);
                questionnaire.record_answer(receipt);
            }
            Ok(None) => {}
            Err(e) => {
                error!("Question {} not answered: {}", question.id, e);
                if let Some(recovery) = e.kind().recovery() {
                    warn!("Suggested recovery: {:?}", recovery);
                }
            }
        }
    }

    println!(
        "\n{} of {} answered ({:.0}%)",
        questionnaire.answered(),
        questionnaire.questions().len(),
        questionnaire.progress_percent()
    );
    Ok(())
}

async fn answer(
    recorder: &QuestionRecorder,
    frames: &FrameBuffer,
    seconds: u64,
    play: bool,
    submit: bool,
) -> Result<Option<audioform::SubmissionReceipt>, audioform::CaptureError> {
    recorder.start().await?;

    let mut snapshots = recorder.session().subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.state.is_recording() {
                    break;
                }
                let peak = frames.last_frame().map(|f| f.peak_height()).unwrap_or(0.0);
                println!(
                    "  recording {}  peak {:>5.1}px",
                    format_elapsed(snapshot.elapsed_seconds),
                    peak
                );
            }
        }
    }

    let Some(artifact) = recorder.stop().await? else {
        return Ok(None);
    };
    println!(
        "  recorded {} bytes of {} in {}",
        artifact.len(),
        artifact.content_type,
        format_elapsed(artifact.duration_secs)
    );

    if play {
        recorder.play().await?;
        let mut state = recorder.playback().subscribe();
        if state
            .wait_for(|s| *s != PlaybackState::Playing)
            .await
            .is_err()
        {
            warn!("Playback controller went away");
        }
    }

    if !submit {
        return Ok(None);
    }
    recorder.submit().await.map(Some)
}
