//! `reverie-memory` – The Memory Engine.
//!
//! An agent's append-only observation log plus the retrieval layer that
//! ranks it by a weighted blend of recency, importance and semantic
//! relevance.
//!
//! # Modules
//!
//! - [`stream`] – [`MemoryStream`][stream::MemoryStream]: the
//!   insertion-ordered log of timestamped, importance-scored
//!   observations.
//! - [`retrieval`] – [`MemoryRetriever`][retrieval::MemoryRetriever]:
//!   embedding backfill and the recent / important / weighted retrieval
//!   queries, built on
//!   [`reverie_embed::EmbeddingService`].

pub mod retrieval;
pub mod stream;

pub use retrieval::MemoryRetriever;
pub use stream::MemoryStream;
