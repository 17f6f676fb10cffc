use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::response::ApiResponse;
use crate::analysis::pdf;
use crate::analysis::{
    AnalysisOverrides, ComplianceReport, Document, DocumentMetadata, DocumentType,
};
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeDocumentRequest {
    pub text: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub overrides: AnalysisOverrides,
}

pub async fn analyze_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let metadata = DocumentMetadata {
        title: payload.title,
        document_type: payload.document_type,
    };
    let document = Document::with_id(payload.id, payload.text, metadata);

    let report = state
        .service
        .analyze_with(&document, &payload.overrides)
        .await?;
    Ok(ApiResponse::ok(summary(&report), report))
}

/// Analyzes an uploaded PDF.
///
/// Multipart fields: `file` (required), plus optional `id`, `title` and
/// `document_type`.
pub async fn analyze_document_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut id = None;
    let mut metadata = DocumentMetadata::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid file field: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            }
            "id" | "title" | "document_type" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid '{}' field: {}", name, e)))?;
                let value = Some(value).filter(|v| !v.trim().is_empty());
                match name.as_str() {
                    "id" => id = value,
                    "title" => metadata.title = value,
                    _ => metadata.document_type = value,
                }
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = file else {
        return Err(ApiError::BadRequest("Missing 'file' field".to_string()));
    };
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if !pdf::is_pdf(&bytes) {
        return Err(ApiError::BadRequest(
            "Only PDF files are supported".to_string(),
        ));
    }
    if metadata.title.is_none() {
        metadata.title = file_name;
    }

    let document = Document::from_pdf(id, &bytes, metadata)?;
    tracing::info!(
        "Extracted {} chars from uploaded PDF {}",
        document.char_count(),
        document.id()
    );

    let report = state.service.analyze(&document).await?;
    Ok(ApiResponse::ok(summary(&report), report))
}

fn summary(report: &ComplianceReport) -> String {
    format!(
        "Analyzed {} chunks: {}",
        report.chunks.len(),
        report.overall_label
    )
}

pub async fn document_types() -> impl IntoResponse {
    let types: Vec<_> = DocumentType::ALL
        .iter()
        .map(|doc_type| {
            json!({
                "type": doc_type.as_str(),
                "description": doc_type.description()
            })
        })
        .collect();
    ApiResponse::ok("Supported document types", json!({ "document_types": types }))
}

/// Reference-index statistics.
pub async fn document_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = state.index.label_counts().await?;
    Ok(ApiResponse::ok(
        "Reference index statistics",
        json!({
            "total_passages": counts.total(),
            "by_label": counts,
            "dimension": state.index.dimension(),
            "index_backend": state.index.name(),
            "embedder": state.embedder.name()
        }),
    ))
}
