//! Ollama auto-discovery helpers.
//!
//! Silently pings `http://localhost:11434` and, if responsive, fetches the
//! list of locally downloaded models from the `/api/tags` endpoint so the
//! user can pick a local embedding model.

use serde::Deserialize;
use std::time::Duration;

/// A single model entry returned by Ollama's `/api/tags` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
}

/// Raw shape of the `/api/tags` JSON response.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<OllamaModel>,
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Ping the Ollama server and return the list of available models.
///
/// Returns `Ok(models)` when Ollama is running and reachable, or
/// `Err(reason)` when it is not (server offline, network error, etc.).
pub async fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap_or_default();

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("Ollama unreachable at {}: {}", url, e))?;

    if !response.status().is_success() {
        return Err(format!("Ollama returned HTTP {}", response.status()));
    }

    let tags: TagsResponse = response
        .json()
        .await
        .map_err(|e| format!("Failed to parse Ollama response: {}", e))?;

    Ok(tags.models)
}

/// Returns `true` if the Ollama server is reachable.
pub async fn is_running(base_url: &str) -> bool {
    fetch_models(base_url).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_response_parses() {
        let raw = r#"{"models":[{"name":"nomic-embed-text"},{"name":"llama3"}]}"#;
        let parsed: TagsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.models.len(), 2);
        assert_eq!(parsed.models[0].name, "nomic-embed-text");
    }

    #[tokio::test]
    async fn unreachable_server_reports_error() {
        let err = fetch_models("http://127.0.0.1:1").await.unwrap_err();
        assert!(err.contains("unreachable"));
    }
}
