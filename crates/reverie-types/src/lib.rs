use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of an embedding provider.
///
/// A small closed set: two network-backed providers and the deterministic
/// offline fallback. The offline variant is a first-class provider, not a
/// special case, so fallback-chain logic stays uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI embeddings API (`/v1/embeddings`).
    OpenAi,
    /// Local Ollama instance (`/api/embeddings`).
    Ollama,
    /// Deterministic hash-seeded vectors; never fails.
    Offline,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            "offline" => Ok(ProviderKind::Offline),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// A single timestamped, importance-scored observation.
///
/// `content`, `created_at` and `importance` are fixed at append time.  The
/// embedding is absent until the retrieval backfill step fills it, exactly
/// once; it is never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier for this memory.
    pub id: Uuid,
    /// The observation text.
    pub content: String,
    /// Wall-clock time at which the memory was appended.
    pub created_at: DateTime<Utc>,
    /// Caller-assigned salience, ≥ 0, open-ended (higher = more salient).
    pub importance: f32,
    /// Dense embedding vector; `None` until backfilled.
    pub embedding: Option<Vec<f32>>,
}

impl Memory {
    /// Construct a new [`Memory`] with a freshly generated UUID and no
    /// embedding.
    pub fn new(content: String, created_at: DateTime<Utc>, importance: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            created_at,
            importance,
            embedding: None,
        }
    }
}

/// Blend weights for [`retrieve_memories`] scoring.
///
/// The weights need not sum to 1; each component score is pre-normalised
/// into `[0, 1]`, so arbitrary weights still produce comparable rankings.
///
/// [`retrieve_memories`]: https://docs.rs/reverie-memory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalWeights {
    pub recency: f32,
    pub importance: f32,
    pub relevance: f32,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            importance: 1.0,
            relevance: 1.0,
        }
    }
}

/// One entry of a retrieval result: the memory plus its query-scoped
/// annotations.
///
/// `similarity` is the raw cosine similarity in `[-1, 1]` (0 when the
/// memory had no usable embedding); `retrieval_score` is the weighted
/// blend.  Both are computed fresh per query and never written back to the
/// stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMemory {
    pub memory: Memory,
    pub similarity: f32,
    pub retrieval_score: f32,
}

/// Global error type spanning provider failures and similarity usage errors.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum RecallError {
    /// The provider could not be reached or refused the call (auth,
    /// network, quota, timeout).  Transient: triggers fallback.
    #[error("Provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: ProviderKind,
        reason: String,
    },

    /// The provider answered with something unusable.  Triggers fallback.
    #[error("Provider {provider} returned a malformed response: {reason}")]
    ProviderError {
        provider: ProviderKind,
        reason: String,
    },

    /// Every provider in the fallback chain failed.  Fatal for this call
    /// only; engine state is untouched.
    #[error("All embedding providers exhausted")]
    AllProvidersExhausted,

    /// Cosine similarity over vectors of different (or zero) length.
    /// Always a programming or configuration error; never retried.
    #[error("Embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_serialization_roundtrip() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Ollama,
            ProviderKind::Offline,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            let back: ProviderKind = serde_json::from_str(&json).unwrap();
            assert_eq!(kind, back);
        }
    }

    #[test]
    fn provider_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }

    #[test]
    fn provider_kind_display_matches_from_str() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Ollama,
            ProviderKind::Offline,
        ] {
            let parsed: ProviderKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn provider_kind_from_str_rejects_unknown() {
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn memory_starts_without_embedding() {
        let m = Memory::new("saw a red door".to_string(), Utc::now(), 3.0);
        assert!(m.embedding.is_none());
        assert_eq!(m.content, "saw a red door");
    }

    #[test]
    fn memory_roundtrip() {
        let mut m = Memory::new("heard running water".to_string(), Utc::now(), 7.5);
        m.embedding = Some(vec![0.1, 0.2, 0.3]);
        let json = serde_json::to_string(&m).unwrap();
        let back: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(m.id, back.id);
        assert_eq!(back.embedding.as_deref(), Some(&[0.1f32, 0.2, 0.3][..]));
    }

    #[test]
    fn default_weights_are_uniform() {
        let w = RetrievalWeights::default();
        assert_eq!(w.recency, 1.0);
        assert_eq!(w.importance, 1.0);
        assert_eq!(w.relevance, 1.0);
    }

    #[test]
    fn recall_error_display() {
        let err = RecallError::ProviderUnavailable {
            provider: ProviderKind::OpenAi,
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("openai"));
        assert!(err.to_string().contains("connection refused"));

        let err2 = RecallError::DimensionMismatch { left: 1536, right: 768 };
        assert!(err2.to_string().contains("1536"));
    }
}
