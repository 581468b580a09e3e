//! [`OllamaEmbedder`] – local Ollama embeddings client.
//!
//! Talks to the `/api/embeddings` endpoint of a locally-running
//! [Ollama](https://ollama.com) instance (`http://localhost:11434`).
//! One prompt per request; Ollama has no array-input endpoint, so batch
//! calls fall back to the sequential default.  Local inference costs
//! nothing, so [`EmbeddingProvider::cost`] stays at its zero default.

use async_trait::async_trait;
use reverie_types::{ProviderKind, RecallError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::provider::EmbeddingProvider;

/// Default local embedding model and its fixed output dimensionality.
const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_DIMENSION: usize = 768;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OllamaEmbedder
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for a local Ollama embeddings endpoint.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    /// Create a client for `base_url` (e.g. `"http://localhost:11434"`)
    /// using the default `nomic-embed-text` model.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_model(base_url, DEFAULT_MODEL, DEFAULT_DIMENSION)
    }

    /// Create a client for a specific local model and its dimensionality.
    pub fn with_model(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.model,
            prompt: text,
        };

        let response: EmbeddingsResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RecallError::ProviderUnavailable {
                provider: ProviderKind::Ollama,
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| RecallError::ProviderError {
                provider: ProviderKind::Ollama,
                reason: format!("undecodable response body: {e}"),
            })?;

        if response.embedding.len() != self.dimension {
            return Err(RecallError::ProviderError {
                provider: ProviderKind::Ollama,
                reason: format!(
                    "model '{}' returned dimension {}, expected {}",
                    self.model,
                    response.embedding.len(),
                    self.dimension
                ),
            });
        }
        Ok(response.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = EmbeddingsRequest {
            model: "nomic-embed-text",
            prompt: "where is the water",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"model\":\"nomic-embed-text\""));
        assert!(json.contains("\"prompt\":\"where is the water\""));
    }

    #[test]
    fn response_body_parses() {
        let raw = r#"{"embedding":[0.5,-0.5,0.25]}"#;
        let parsed: EmbeddingsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.embedding, vec![0.5, -0.5, 0.25]);
    }

    #[test]
    fn reports_configured_model_and_dimension() {
        let provider = OllamaEmbedder::with_model("http://localhost:11434", "mxbai-embed-large", 1024);
        assert_eq!(provider.kind(), ProviderKind::Ollama);
        assert_eq!(provider.model(), "mxbai-embed-large");
        assert_eq!(provider.dimension(), 1024);
    }

    #[test]
    fn local_inference_is_free() {
        let provider = OllamaEmbedder::new("http://localhost:11434");
        assert_eq!(provider.cost("a very long observation about the maze"), 0.0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_provider_unavailable() {
        let provider = OllamaEmbedder::new("http://127.0.0.1:1");
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, RecallError::ProviderUnavailable { .. }));
    }
}
