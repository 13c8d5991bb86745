//! Chat handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use medrag_common::{
    chat::{ChatReply, ChatTurnRequest},
    context::Turn,
    errors::{AppError, Result},
};

/// Hard ceiling independent of configuration
const PROMPT_CEILING: u64 = 16_000;

/// Chat request body
#[derive(Debug, Deserialize, Validate)]
pub struct ChatBody {
    #[validate(length(max = 16000))]
    pub prompt: String,

    /// Full conversation as re-submitted by the caller; only the window is used
    #[serde(default)]
    pub histories: Vec<Turn>,
}

/// Answer one chat turn.
///
/// Upstream failures never surface here: the pipeline degrades to the
/// fallback reply and the status stays 200.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>> {
    body.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let max_chars = state.config.server.max_prompt_chars.min(PROMPT_CEILING);
    let prompt_chars = body.prompt.chars().count() as u64;
    if prompt_chars > max_chars {
        return Err(AppError::Validation {
            message: format!("prompt exceeds {} characters", max_chars),
            field: Some("prompt".to_string()),
        });
    }

    let reply = state
        .pipeline
        .respond(ChatTurnRequest {
            prompt: body.prompt,
            histories: body.histories,
        })
        .await;

    Ok(Json(reply))
}
