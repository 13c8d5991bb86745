//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use crate::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
pub struct ReadyResponse {
    pub status: String,
    pub variant: String,
    pub checks: ReadyChecks,
}

#[derive(Serialize, Deserialize)]
pub struct ReadyChecks {
    pub completion: bool,
    pub search: bool,
    pub translation: bool,
    pub audio: bool,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: medrag_common::VERSION.to_string(),
    })
}

/// Readiness probe - reports which upstreams are configured
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let config = &state.config;
    let checks = ReadyChecks {
        completion: !config.openai.endpoint.is_empty() && !config.openai.api_key.is_empty(),
        search: !config.search.endpoint.is_empty() && !config.search.index.is_empty(),
        translation: config.translation.enabled && config.translation.api_key.is_some(),
        audio: state.audio.is_some(),
    };

    let ready = checks.completion && checks.search;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            variant: serde_json::to_value(state.pipeline.variant())
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            checks,
        }),
    )
}
