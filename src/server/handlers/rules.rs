use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use super::response::ApiResponse;
use crate::state::AppState;

pub async fn list_rules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let catalog = state.catalog.as_ref();
    ApiResponse::ok(
        format!("{} rules loaded", catalog.len()),
        json!({
            "rules": catalog.rules(),
            "disclosures": catalog.disclosures()
        }),
    )
}
