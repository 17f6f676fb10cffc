use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::response::ApiResponse;
use crate::core::errors::ApiError;
use crate::index::{corpus, NewPassage};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReferencePassagesRequest {
    pub passages: Vec<NewPassage>,
}

/// Embeds and stores labelled reference passages.
pub async fn add_reference_passages(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReferencePassagesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.passages.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one passage is required".to_string(),
        ));
    }

    let stored = corpus::ingest(
        state.embedder.as_ref(),
        state.index.as_ref(),
        payload.passages,
    )
    .await?;
    let total = state.index.count().await?;

    tracing::info!(
        "Stored {} reference passages ({} total)",
        stored.len(),
        total
    );

    let ids: Vec<&str> = stored.iter().map(|p| p.id.as_str()).collect();
    let body = ApiResponse::ok(
        format!("Stored {} reference passages", stored.len()),
        json!({ "stored": stored.len(), "ids": ids, "total_passages": total }),
    );
    Ok((StatusCode::CREATED, body))
}
