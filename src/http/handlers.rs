use super::state::{AppState, StoredResponse};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub id: String,
    pub question_id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_size: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub data: UploadData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub id: String,
    pub user_id: String,
    pub question_id: String,
    pub audio_url: String,
    pub file_size: usize,
    pub content_type: String,
    pub transcript_status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub responses: Vec<ResponseSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeResponse {
    pub success: bool,
    pub transcription: String,
    pub question_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

/// Fields pulled out of an answer upload
#[derive(Default)]
struct AnswerForm {
    audio: Option<(Bytes, Option<String>, Option<String>)>,
    question_id: Option<String>,
    user_id: Option<String>,
}

async fn read_answer_form(mut multipart: Multipart) -> Result<AnswerForm, MultipartError> {
    let mut form = AnswerForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                form.audio = Some((data, file_name, content_type));
            }
            Some("questionId") => form.question_id = Some(field.text().await?),
            Some("userId") => form.user_id = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(form)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn multipart_failure(e: MultipartError) -> Response {
    error!("Failed to read upload: {}", e);
    let status = e.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        error_response(status, "Audio file too large")
    } else {
        error_response(status, "Failed to process audio upload")
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/responses
/// Store one recorded answer
pub async fn upload_response(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_answer_form(multipart).await {
        Ok(form) => form,
        Err(e) => return multipart_failure(e),
    };

    let (Some((audio, file_name, content_type)), Some(question_id)) =
        (form.audio, form.question_id.filter(|q| !q.is_empty()))
    else {
        return error_response(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    let user_id = form
        .user_id
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "anonymous".to_string());

    let stored = StoredResponse {
        id: format!("resp-{}", uuid::Uuid::new_v4().simple()),
        user_id,
        question_id,
        file_name: file_name.unwrap_or_else(|| "audio".to_string()),
        content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
        audio,
        timestamp: Utc::now(),
    };

    info!(
        "Received audio response for question {} from user {} ({} bytes)",
        stored.question_id,
        stored.user_id,
        stored.audio.len()
    );

    let data = UploadData {
        id: stored.id.clone(),
        question_id: stored.question_id.clone(),
        user_id: stored.user_id.clone(),
        file_name: stored.file_name.clone(),
        file_size: stored.audio.len(),
        timestamp: stored.timestamp,
    };

    state.responses.write().await.push(stored);

    (
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            message: "Audio response saved successfully".to_string(),
            data,
        }),
    )
        .into_response()
}

/// GET /api/responses?userId=
/// List stored responses, optionally for one user
pub async fn list_responses(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let responses = state.responses.read().await;

    let responses = responses
        .iter()
        .filter(|r| query.user_id.as_ref().map_or(true, |u| &r.user_id == u))
        .map(|r| ResponseSummary {
            id: r.id.clone(),
            user_id: r.user_id.clone(),
            question_id: r.question_id.clone(),
            audio_url: format!("/api/audio/{}", r.id),
            file_size: r.audio.len(),
            content_type: r.content_type.clone(),
            transcript_status: "pending".to_string(),
            timestamp: r.timestamp,
        })
        .collect();

    (StatusCode::OK, Json(ListResponse { responses }))
}

/// GET /api/audio/:id
/// Stored audio bytes
pub async fn get_audio(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let responses = state.responses.read().await;

    match responses.iter().find(|r| r.id == id) {
        Some(r) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, r.content_type.clone())],
            r.audio.clone(),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Response {} not found", id)),
    }
}

/// POST /api/transcribe
/// Placeholder transcription; no speech recognition happens here
pub async fn transcribe(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_answer_form(multipart).await {
        Ok(form) => form,
        Err(e) => return multipart_failure(e),
    };

    if form.audio.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "No audio file provided");
    }

    let body = if state.transcription_api_key.is_none() {
        info!("Transcription would be processed (API key not configured)");
        TranscribeResponse {
            success: true,
            transcription: "This is a mock transcription since no transcription API key is \
                            configured."
                .to_string(),
            question_id: form.question_id,
            info: Some("Transcription API key not configured - using mock transcription".into()),
        }
    } else {
        info!(
            "Transcription requested for question {:?}",
            form.question_id.as_deref()
        );
        TranscribeResponse {
            success: true,
            transcription: "This is a simulated transcription of the audio recording.".to_string(),
            question_id: form.question_id,
            info: None,
        }
    };

    (StatusCode::OK, Json(body)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
