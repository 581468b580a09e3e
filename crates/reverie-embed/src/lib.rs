//! `reverie-embed` – The Embedding Layer.
//!
//! Turns text into fixed-dimension vectors through a set of
//! interchangeable providers with ordered fallback, bounded caching and
//! cost/latency accounting.
//!
//! # Modules
//!
//! - [`provider`] – [`EmbeddingProvider`][provider::EmbeddingProvider]:
//!   the capability trait every backend implements.
//! - [`openai`] – [`OpenAiEmbedder`][openai::OpenAiEmbedder]: OpenAI
//!   `/v1/embeddings` client with native batching.
//! - [`ollama`] – [`OllamaEmbedder`][ollama::OllamaEmbedder]: local
//!   Ollama `/api/embeddings` client.
//! - [`offline`] – [`OfflineEmbedder`][offline::OfflineEmbedder]:
//!   deterministic, never-failing fallback used to terminate production
//!   chains and to run headless tests.
//! - [`cache`] – [`EmbeddingCache`][cache::EmbeddingCache]: bounded FIFO
//!   cache keyed by `(provider, model, exact text)`.
//! - [`service`] – [`EmbeddingService`][service::EmbeddingService]: the
//!   orchestrator tying the above together.

pub mod cache;
pub mod offline;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod service;

pub use provider::EmbeddingProvider;
pub use service::{cosine_similarity, EmbeddingService, EmbeddingServiceBuilder, EmbeddingStats};
