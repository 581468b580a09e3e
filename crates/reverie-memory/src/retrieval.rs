//! [`MemoryRetriever`] – weighted recency/importance/relevance retrieval.
//!
//! Combines a [`MemoryStream`] with an
//! [`EmbeddingService`][reverie_embed::EmbeddingService] to answer
//! "recent", "important", "semantically relevant" and
//! "weighted-combination" queries over an agent's observation log.
//!
//! # Scoring model
//!
//! For a query, every memory receives three component scores in `[0, 1]`:
//!
//! * **recency** – linear position of `created_at` inside the stream's
//!   observed `[oldest, newest]` span: the newest memory scores 1, the
//!   oldest 0.  A stream with a single distinct timestamp scores 1
//!   everywhere.
//! * **importance** – the caller-assigned salience, min/max-normalised
//!   against the stream.  A uniform stream scores 1 everywhere.
//! * **relevance** – cosine similarity between the query embedding and
//!   the memory embedding, rescaled from `[-1, 1]` into `[0, 1]` via
//!   `(sim + 1) / 2`.  Memories without a usable embedding (never
//!   backfilled, or of a different dimension after a provider switch)
//!   contribute relevance 0 instead of failing the call.
//!
//! The final `retrieval_score` is the weight-blended sum.  Ties are broken
//! by recency (newer first) and then insertion order (later first), so
//! every ranking is a deterministic total order.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reverie_embed::EmbeddingService;
//! use reverie_memory::retrieval::MemoryRetriever;
//! use reverie_types::RetrievalWeights;
//!
//! # async fn demo() {
//! let service = Arc::new(EmbeddingService::offline_only());
//! let mut retriever = MemoryRetriever::new(service);
//!
//! retriever.observe("the pantry is nearly empty", 8.0);
//! retriever.observe("rain is drumming on the roof", 2.0);
//!
//! retriever.generate_missing_embeddings().await.unwrap();
//! let hits = retriever
//!     .retrieve_memories("where can I find food?", 1, RetrievalWeights::default())
//!     .await
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use reverie_embed::{cosine_similarity, EmbeddingService};
use reverie_types::{Memory, RecallError, RetrievalWeights, RetrievedMemory};
use tracing::debug;

use crate::stream::MemoryStream;

/// Retrieval engine over one [`MemoryStream`] and one embedding service.
///
/// Holds no state of its own beyond the two collaborators: every query is
/// a pure function of the stream contents and service state at call time.
pub struct MemoryRetriever {
    stream: MemoryStream,
    embeddings: Arc<EmbeddingService>,
}

impl MemoryRetriever {
    /// Create a retriever over an empty stream.
    pub fn new(embeddings: Arc<EmbeddingService>) -> Self {
        Self {
            stream: MemoryStream::new(),
            embeddings,
        }
    }

    /// Create a retriever over an existing stream.
    pub fn with_stream(stream: MemoryStream, embeddings: Arc<EmbeddingService>) -> Self {
        Self { stream, embeddings }
    }

    pub fn stream(&self) -> &MemoryStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut MemoryStream {
        &mut self.stream
    }

    /// Append an observation stamped with the current wall-clock time.
    pub fn observe(&mut self, content: impl Into<String>, importance: f32) -> &Memory {
        self.stream.add_observation(content, Utc::now(), importance)
    }

    /// Backfill an embedding for every memory that lacks one.
    ///
    /// Embeddings are generated in one batch through the service (cache
    /// and fallback apply) and attached exactly once; re-running skips
    /// memories that are already embedded.  Returns how many were filled.
    pub async fn generate_missing_embeddings(&mut self) -> Result<usize, RecallError> {
        let missing: Vec<(usize, String)> = self
            .stream
            .iter()
            .enumerate()
            .filter(|(_, m)| m.embedding.is_none())
            .map(|(i, m)| (i, m.content.clone()))
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = missing.iter().map(|(_, t)| t.clone()).collect();
        let vectors = self.embeddings.generate_batch(&texts).await?;

        let mut filled = 0;
        for ((index, _), vector) in missing.iter().zip(vectors) {
            if self.stream.attach_embedding(*index, vector) {
                filled += 1;
            }
        }
        debug!(filled, "backfilled missing embeddings");
        Ok(filled)
    }

    /// The `k` most-recently-appended memories, most-recent-first.  No
    /// scoring beyond recency.
    pub fn get_recent_memories(&self, k: usize) -> Vec<Memory> {
        self.stream.recent(k).into_iter().cloned().collect()
    }

    /// The `k` memories with the highest importance, descending.  Ties
    /// are broken by recency (newer first), then insertion order (later
    /// first).
    pub fn get_important_memories(&self, k: usize) -> Vec<Memory> {
        let mut indexed: Vec<(usize, &Memory)> = self.stream.iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| ib.cmp(ia))
        });
        indexed.into_iter().take(k).map(|(_, m)| m.clone()).collect()
    }

    /// Rank every memory against `query` by the weighted blend of
    /// recency, importance and relevance, returning the top `k` annotated
    /// with their raw similarity and final score.
    ///
    /// The only await point is obtaining the query embedding; scoring
    /// itself is pure and synchronous over a snapshot of the stream.
    ///
    /// # Errors
    ///
    /// Fails only if the query embedding cannot be generated at all
    /// ([`RecallError::AllProvidersExhausted`] on a fully-exhausted
    /// chain).  Embedding coverage gaps in the stream degrade gracefully
    /// instead of failing.
    pub async fn retrieve_memories(
        &self,
        query: &str,
        k: usize,
        weights: RetrievalWeights,
    ) -> Result<Vec<RetrievedMemory>, RecallError> {
        if self.stream.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embeddings.generate(query).await?;

        // Normalisation ranges observed across the whole stream.
        let oldest = self.stream.iter().map(|m| m.created_at).min();
        let newest = self.stream.iter().map(|m| m.created_at).max();
        let (oldest, newest) = match (oldest, newest) {
            (Some(o), Some(n)) => (o, n),
            _ => return Ok(Vec::new()),
        };
        let span_ms = (newest - oldest).num_milliseconds() as f64;

        let min_importance = self
            .stream
            .iter()
            .map(|m| m.importance)
            .fold(f32::INFINITY, f32::min);
        let max_importance = self
            .stream
            .iter()
            .map(|m| m.importance)
            .fold(f32::NEG_INFINITY, f32::max);
        let importance_range = max_importance - min_importance;

        let mut scored: Vec<(usize, &Memory, f32, f32)> = self
            .stream
            .iter()
            .enumerate()
            .map(|(index, memory)| {
                let recency = if span_ms <= 0.0 {
                    1.0
                } else {
                    ((memory.created_at - oldest).num_milliseconds() as f64 / span_ms) as f32
                };
                let importance = if importance_range <= 0.0 {
                    1.0
                } else {
                    (memory.importance - min_importance) / importance_range
                };
                let (similarity, relevance) = match &memory.embedding {
                    Some(embedding) if embedding.len() == query_embedding.len() => {
                        let sim = cosine_similarity(&query_embedding, embedding).unwrap_or(0.0);
                        (sim, ((sim + 1.0) / 2.0).clamp(0.0, 1.0))
                    }
                    Some(embedding) => {
                        debug!(
                            memory = %memory.id,
                            stored = embedding.len(),
                            query = query_embedding.len(),
                            "stored embedding dimension differs from query; scoring relevance 0"
                        );
                        (0.0, 0.0)
                    }
                    None => (0.0, 0.0),
                };
                let score = recency * weights.recency
                    + importance * weights.importance
                    + relevance * weights.relevance;
                (index, memory, similarity, score)
            })
            .collect();

        scored.sort_by(|(ia, a, _, score_a), (ib, b, _, score_b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| ib.cmp(ia))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, memory, similarity, retrieval_score)| RetrievedMemory {
                memory: memory.clone(),
                similarity,
                retrieval_score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use reverie_embed::provider::EmbeddingProvider;
    use reverie_types::ProviderKind;

    fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn offline_retriever() -> MemoryRetriever {
        MemoryRetriever::new(Arc::new(EmbeddingService::offline_only()))
    }

    // ------------------------------------------------------------------
    // Test double: embeds by keyword counts, so cosine similarity tracks
    // topic overlap deterministically.
    // ------------------------------------------------------------------

    const KEYWORDS: [&str; 4] = ["food", "water", "path", "danger"];

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Offline
        }
        fn model(&self) -> &str {
            "keyword-v1"
        }
        fn dimension(&self) -> usize {
            KEYWORDS.len()
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
            let lower = text.to_lowercase();
            Ok(KEYWORDS
                .iter()
                .map(|kw| lower.matches(kw).count() as f32)
                .collect())
        }
    }

    fn keyword_retriever() -> MemoryRetriever {
        let service = EmbeddingService::builder()
            .register(Box::new(KeywordEmbedder))
            .chain([ProviderKind::Offline])
            .build()
            .unwrap();
        MemoryRetriever::new(Arc::new(service))
    }

    // ------------------------------------------------------------------
    // Recent / important
    // ------------------------------------------------------------------

    #[test]
    fn recent_memories_are_most_recent_first() {
        let mut retriever = offline_retriever();
        for i in 0..6 {
            retriever
                .stream_mut()
                .add_observation(format!("obs {i}"), ts(i * 60), 1.0);
        }
        let recent = retriever.get_recent_memories(4);
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["obs 5", "obs 4", "obs 3", "obs 2"]);
    }

    #[test]
    fn important_memories_are_non_increasing() {
        let mut retriever = offline_retriever();
        for (i, importance) in [3.0, 9.0, 1.0, 7.0, 9.0].into_iter().enumerate() {
            retriever
                .stream_mut()
                .add_observation(format!("obs {i}"), ts(i as i64), importance);
        }
        let important = retriever.get_important_memories(5);
        let scores: Vec<f32> = important.iter().map(|m| m.importance).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        // The tied 9.0s come back newer-first.
        assert_eq!(important[0].content, "obs 4");
        assert_eq!(important[1].content, "obs 1");
    }

    // ------------------------------------------------------------------
    // Backfill
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn generate_missing_embeddings_is_idempotent() {
        let mut retriever = offline_retriever();
        retriever
            .stream_mut()
            .add_observation("saw a fox", ts(10), 2.0);
        retriever
            .stream_mut()
            .add_observation("crossed the bridge", ts(20), 4.0);

        assert_eq!(retriever.generate_missing_embeddings().await.unwrap(), 2);
        assert!(retriever.stream().iter().all(|m| m.embedding.is_some()));

        // Second run has nothing to do.
        assert_eq!(retriever.generate_missing_embeddings().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn backfill_skips_already_embedded_memories() {
        let mut retriever = offline_retriever();
        retriever.stream_mut().add_observation("pre", ts(1), 1.0);
        retriever.stream_mut().attach_embedding(0, vec![0.5; 64]);
        retriever.stream_mut().add_observation("fresh", ts(2), 1.0);

        assert_eq!(retriever.generate_missing_embeddings().await.unwrap(), 1);
        // The pre-set embedding was not overwritten.
        assert_eq!(
            retriever.stream().get(0).unwrap().embedding,
            Some(vec![0.5; 64])
        );
    }

    // ------------------------------------------------------------------
    // Weighted retrieval
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn recency_weight_alone_ranks_newest_first() {
        let mut retriever = offline_retriever();
        for i in 0..5 {
            retriever
                .stream_mut()
                .add_observation(format!("obs {i}"), ts(i * 100), 1.0);
        }
        retriever.generate_missing_embeddings().await.unwrap();

        let weights = RetrievalWeights {
            recency: 1.0,
            importance: 0.0,
            relevance: 0.0,
        };
        let hits = retriever.retrieve_memories("anything", 5, weights).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|r| r.memory.content.as_str()).collect();
        assert_eq!(contents, vec!["obs 4", "obs 3", "obs 2", "obs 1", "obs 0"]);
        assert!((hits[0].retrieval_score - 1.0).abs() < 1e-6);
        assert!(hits[4].retrieval_score.abs() < 1e-6);
    }

    #[tokio::test]
    async fn importance_weight_alone_ranks_by_importance() {
        let mut retriever = offline_retriever();
        for (i, importance) in [2.0, 8.0, 5.0].into_iter().enumerate() {
            retriever
                .stream_mut()
                .add_observation(format!("obs {i}"), ts(i as i64), importance);
        }
        retriever.generate_missing_embeddings().await.unwrap();

        let weights = RetrievalWeights {
            recency: 0.0,
            importance: 1.0,
            relevance: 0.0,
        };
        let hits = retriever.retrieve_memories("anything", 3, weights).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|r| r.memory.content.as_str()).collect();
        assert_eq!(contents, vec!["obs 1", "obs 2", "obs 0"]);
    }

    #[tokio::test]
    async fn relevance_weight_alone_ranks_by_cosine_similarity() {
        let mut retriever = keyword_retriever();
        retriever
            .stream_mut()
            .add_observation("danger danger on the path", ts(10), 1.0);
        retriever
            .stream_mut()
            .add_observation("found food food food today", ts(20), 1.0);
        retriever
            .stream_mut()
            .add_observation("water to the east", ts(30), 1.0);
        retriever.generate_missing_embeddings().await.unwrap();

        let weights = RetrievalWeights {
            recency: 0.0,
            importance: 0.0,
            relevance: 1.0,
        };
        let hits = retriever
            .retrieve_memories("where is food", 3, weights)
            .await
            .unwrap();

        assert_eq!(hits[0].memory.content, "found food food food today");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        // Descending similarity throughout.
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn food_cluster_dominates_food_query() {
        // 20 memories in 4 semantic clusters of 5.
        let mut retriever = keyword_retriever();
        let clusters = [
            ("food", "gathered food near the orchard"),
            ("water", "the water barrel is low"),
            ("path", "a new path opened west"),
            ("danger", "danger signs by the cliff"),
        ];
        let mut t = 0;
        for round in 0..5 {
            for (_, content) in clusters {
                t += 60;
                retriever
                    .stream_mut()
                    .add_observation(format!("{content} ({round})"), ts(t), (round % 3) as f32);
            }
        }
        assert_eq!(retriever.stream().len(), 20);
        retriever.generate_missing_embeddings().await.unwrap();

        let weights = RetrievalWeights {
            recency: 0.1,
            importance: 0.1,
            relevance: 0.8,
        };
        let hits = retriever
            .retrieve_memories("food is scarce, where was food seen?", 5, weights)
            .await
            .unwrap();

        assert_eq!(hits.len(), 5);
        let food_hits = hits
            .iter()
            .filter(|r| r.memory.content.contains("food"))
            .count();
        assert!(food_hits >= 3, "expected ≥3 food memories in the top 5, got {food_hits}");
    }

    #[tokio::test]
    async fn memories_without_embeddings_degrade_gracefully() {
        let mut retriever = keyword_retriever();
        retriever
            .stream_mut()
            .add_observation("food in the cellar", ts(10), 5.0);
        retriever.generate_missing_embeddings().await.unwrap();
        // Appended after the backfill: no embedding.
        retriever
            .stream_mut()
            .add_observation("unembedded food note", ts(20), 5.0);

        let hits = retriever
            .retrieve_memories("food", 2, RetrievalWeights::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 2, "coverage gaps must not drop memories");
        let unembedded = hits
            .iter()
            .find(|r| r.memory.content == "unembedded food note")
            .unwrap();
        assert_eq!(unembedded.similarity, 0.0);
    }

    #[tokio::test]
    async fn dimension_mismatched_embedding_scores_zero_relevance() {
        let mut retriever = keyword_retriever();
        retriever
            .stream_mut()
            .add_observation("stale vector", ts(10), 1.0);
        // A leftover embedding from some wider model.
        retriever.stream_mut().attach_embedding(0, vec![0.1; 64]);
        retriever
            .stream_mut()
            .add_observation("food stash found", ts(20), 1.0);
        retriever.generate_missing_embeddings().await.unwrap();

        let weights = RetrievalWeights {
            recency: 0.0,
            importance: 0.0,
            relevance: 1.0,
        };
        let hits = retriever.retrieve_memories("food", 2, weights).await.unwrap();
        assert_eq!(hits[0].memory.content, "food stash found");
        assert_eq!(hits[1].similarity, 0.0);
    }

    #[tokio::test]
    async fn empty_stream_returns_no_hits() {
        let retriever = offline_retriever();
        let hits = retriever
            .retrieve_memories("anything", 5, RetrievalWeights::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn scores_are_non_increasing_and_truncated_to_k() {
        let mut retriever = offline_retriever();
        for i in 0..10 {
            retriever
                .stream_mut()
                .add_observation(format!("obs {i}"), ts(i * 7), (i % 4) as f32);
        }
        retriever.generate_missing_embeddings().await.unwrap();

        let hits = retriever
            .retrieve_memories("obs", 4, RetrievalWeights::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 4);
        for pair in hits.windows(2) {
            assert!(pair[0].retrieval_score >= pair[1].retrieval_score);
        }
    }

    #[tokio::test]
    async fn single_timestamp_stream_scores_full_recency() {
        let mut retriever = offline_retriever();
        retriever.stream_mut().add_observation("a", ts(100), 1.0);
        retriever.stream_mut().add_observation("b", ts(100), 1.0);
        retriever.generate_missing_embeddings().await.unwrap();

        let weights = RetrievalWeights {
            recency: 1.0,
            importance: 0.0,
            relevance: 0.0,
        };
        let hits = retriever.retrieve_memories("q", 2, weights).await.unwrap();
        for hit in &hits {
            assert!((hit.retrieval_score - 1.0).abs() < 1e-6);
        }
        // Equal scores: insertion order breaks the tie, later first.
        assert_eq!(hits[0].memory.content, "b");
    }
}
