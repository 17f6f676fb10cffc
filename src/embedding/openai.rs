use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::provider::Embedder;
use crate::analysis::AnalysisError;

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint
/// (OpenAI, LM Studio, llama.cpp server, ...).
#[derive(Clone)]
pub struct OpenAiEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        if dimension == 0 {
            return Err(AnalysisError::configuration(
                "embedding dimension must be greater than 0",
            ));
        }
        if model.trim().is_empty() {
            return Err(AnalysisError::configuration("embedding model must not be empty"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::configuration(format!("http client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            dimension,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalysisError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AnalysisError::embedding("embedding response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AnalysisError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(AnalysisError::embedding)?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(AnalysisError::embedding(format!(
                "embedding endpoint returned {}: {}",
                status, text
            )));
        }

        let mut payload: EmbeddingsResponse = res.json().await.map_err(AnalysisError::embedding)?;
        if payload.data.len() != texts.len() {
            return Err(AnalysisError::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                payload.data.len()
            )));
        }
        payload.data.sort_by_key(|item| item.index);

        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::Value;

    async fn spawn_fake(handler: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, handler).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn embedder(base_url: &str, api_key: Option<&str>) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            base_url,
            "text-embedding-3-small",
            api_key.map(str::to_string),
            3,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn embed_batch_orders_by_index() {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "text-embedding-3-small");
                Json(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                        { "index": 0, "embedding": [1.0, 0.0, 0.0] }
                    ]
                }))
            }),
        );
        let base = spawn_fake(app).await;

        let vectors = embedder(&base, None)
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn server_errors_are_embedding_errors() {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let base = spawn_fake(app).await;

        let err = embedder(&base, Some("sk-test")).embed("text").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Embedding(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_embedding_error() {
        let err = embedder("http://127.0.0.1:1", None).embed("text").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Embedding(_)));
    }
}
