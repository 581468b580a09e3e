//! [`OpenAiEmbedder`] – OpenAI embeddings API client.
//!
//! Talks to the `/v1/embeddings` endpoint of `https://api.openai.com` (or
//! any compatible server via [`OpenAiEmbedder::with_base_url`]).  Supports
//! native batching: a whole slice of texts goes out as one array-input
//! request and comes back reassembled in input order via the response
//! `index` field.

use async_trait::async_trait;
use reverie_types::{ProviderKind, RecallError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::provider::EmbeddingProvider;

/// Default embedding model and its fixed output dimensionality.
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;

/// USD per million input tokens for `text-embedding-3-small`.
const COST_PER_MILLION_TOKENS: f64 = 0.02;

/// Hard cap on any single request; a timeout counts as
/// [`RecallError::ProviderUnavailable`] so one unreachable endpoint cannot
/// stall the fallback chain.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Deserialize)]
struct EmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAiEmbedder
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for the OpenAI embeddings endpoint.
///
/// Construct once and reuse; the underlying `reqwest::Client` pools
/// connections.
pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    /// Create a client for `https://api.openai.com` using `api_key` and the
    /// default `text-embedding-3-small` model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url("https://api.openai.com", api_key)
    }

    /// Create a client for an OpenAI-compatible server at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, RecallError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.model,
            input,
        };

        let response: EmbeddingsResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| transport_error(ProviderKind::OpenAi, &e))?
            .json()
            .await
            .map_err(|e| RecallError::ProviderError {
                provider: ProviderKind::OpenAi,
                reason: format!("undecodable response body: {e}"),
            })?;

        if response.data.len() != input.len() {
            return Err(RecallError::ProviderError {
                provider: ProviderKind::OpenAi,
                reason: format!(
                    "expected {} embeddings, got {}",
                    input.len(),
                    response.data.len()
                ),
            });
        }

        // The API may reorder entries; `index` is authoritative.
        let mut out: Vec<Vec<f32>> = vec![Vec::new(); input.len()];
        for item in response.data {
            if item.index >= input.len() || item.embedding.len() != DEFAULT_DIMENSION {
                return Err(RecallError::ProviderError {
                    provider: ProviderKind::OpenAi,
                    reason: format!(
                        "embedding {} has dimension {}",
                        item.index,
                        item.embedding.len()
                    ),
                });
            }
            out[item.index] = item.embedding;
        }
        // A slot left empty means a missing or duplicated index.
        if out.iter().any(|v| v.is_empty()) {
            return Err(RecallError::ProviderError {
                provider: ProviderKind::OpenAi,
                reason: "response indexes do not cover the input".to_string(),
            });
        }
        Ok(out)
    }
}

/// Classify a reqwest failure: everything on the transport/status side is
/// transient for fallback purposes, an undecodable body is a provider bug.
fn transport_error(provider: ProviderKind, e: &reqwest::Error) -> RecallError {
    if e.is_decode() {
        RecallError::ProviderError {
            provider,
            reason: e.to_string(),
        }
    } else {
        RecallError::ProviderUnavailable {
            provider,
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        DEFAULT_DIMENSION
    }

    /// Per-token pricing with tokens estimated at four characters each.
    fn cost(&self, text: &str) -> f64 {
        let estimated_tokens = (text.len() as f64 / 4.0).ceil();
        estimated_tokens / 1_000_000.0 * COST_PER_MILLION_TOKENS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let input = [text.to_string()];
        let mut vectors = self.request(&input).await?;
        Ok(vectors.swap_remove(0))
    }

    /// One array-input request for the whole slice.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecallError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
