//! [`EmbeddingProvider`] – the capability every embedding backend exposes.
//!
//! A provider turns text into a fixed-dimension vector or fails with a
//! [`RecallError`] that distinguishes "unreachable" from "answered
//! garbage".  The [`EmbeddingService`][crate::service::EmbeddingService]
//! dispatches to registered providers through this trait, exactly one of
//! which is active at any time.

use async_trait::async_trait;
use reverie_types::{ProviderKind, RecallError};

/// A source of embeddings, real or offline-deterministic.
///
/// Implementations must be cheap to call concurrently; the service wraps
/// them in `Arc` and never takes `&mut self`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Which member of the closed provider set this is.
    fn kind(&self) -> ProviderKind;

    /// The model identifier this provider embeds with (part of the cache
    /// key).
    fn model(&self) -> &str;

    /// Output dimensionality.  Fixed and known statically; every success
    /// vector has exactly this length.
    fn dimension(&self) -> usize;

    /// Estimated cost in USD of embedding `text` once.  Local providers
    /// cost nothing.
    fn cost(&self, _text: &str) -> f64 {
        0.0
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// [`RecallError::ProviderUnavailable`] when the backend cannot be
    /// reached (network, auth, quota, timeout);
    /// [`RecallError::ProviderError`] when it answers with an unusable
    /// response.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError>;

    /// Embed many texts, preserving input order.
    ///
    /// The default implementation maps [`embed`][Self::embed] over the
    /// input one call at a time, which doubles as the concurrency bound
    /// for backends without a native batch endpoint.  Backends that accept
    /// an array input override this with a single request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecallError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
