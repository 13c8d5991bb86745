//! Audio handlers: recording upload and transcription

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use medrag_common::{
    audio::AudioServices,
    errors::{AppError, Result},
};

const UPLOAD_COMPLETE: &str = "녹음 파일 업로드 완료";
const TRANSCRIPTION_FAILED: &str = "음성 인식 실패";

#[derive(Serialize, Deserialize)]
pub struct RecordResponse {
    pub message: String,
    pub blob_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TranscribeRequest {
    #[validate(length(min = 1, max = 256))]
    pub blob_name: String,
}

#[derive(Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub stt_text: String,
}

fn audio(state: &AppState) -> Result<&AudioServices> {
    state.audio.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
        message: "audio is not configured".to_string(),
    })
}

/// Store an uploaded WAV recording
pub async fn record(State(state): State<AppState>, body: Bytes) -> Result<Json<RecordResponse>> {
    let audio = audio(&state)?;
    if body.is_empty() {
        return Err(AppError::MissingField { field: "audio".to_string() });
    }

    let size = body.len();
    let blob_name = audio.store.upload(body.to_vec()).await?;
    tracing::info!(blob = %blob_name, bytes = size, "Recording uploaded");

    Ok(Json(RecordResponse {
        message: UPLOAD_COMPLETE.to_string(),
        blob_name,
    }))
}

/// Transcribe a stored recording
pub async fn transcribe(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> Result<Response> {
    let audio = audio(&state)?;
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("blob_name".to_string()),
    })?;

    match audio.transcriber.transcribe(&request.blob_name).await {
        Ok(stt_text) => Ok(Json(TranscribeResponse { stt_text }).into_response()),
        Err(e) if e.is_client_error() => Err(e),
        Err(e) => {
            tracing::warn!(blob = %request.blob_name, error = %e, "Transcription failed");
            Ok((
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": TRANSCRIPTION_FAILED })),
            )
                .into_response())
        }
    }
}
