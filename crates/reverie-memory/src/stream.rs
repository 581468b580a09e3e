//! [`MemoryStream`] – append-only observation log.
//!
//! An in-memory, insertion-ordered collection of [`Memory`] records.  The
//! stream never reorders, merges or deduplicates history; insertion order
//! is also the order of non-decreasing `created_at` (a timestamp earlier
//! than the newest entry is clamped up to it).  The stream knows nothing
//! about embeddings beyond holding the slot the retrieval backfill fills.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use reverie_memory::stream::MemoryStream;
//!
//! let mut stream = MemoryStream::new();
//! stream.add_observation("found berries by the fence", Utc::now(), 6.0);
//! stream.add_observation("heard wolves to the north", Utc::now(), 9.0);
//!
//! let recent = stream.recent(1);
//! assert_eq!(recent[0].content, "heard wolves to the north");
//! ```

use chrono::{DateTime, Utc};
use reverie_types::Memory;
use tracing::warn;

/// Append-only, insertion-ordered collection of memories.
#[derive(Default)]
pub struct MemoryStream {
    memories: Vec<Memory>,
}

impl MemoryStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation and return the created record.
    ///
    /// A `timestamp` older than the newest entry would break the
    /// non-decreasing-timestamp invariant, so it is clamped up to the
    /// newest and a warning is logged.
    pub fn add_observation(
        &mut self,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        importance: f32,
    ) -> &Memory {
        let mut created_at = timestamp;
        if let Some(last) = self.memories.last()
            && created_at < last.created_at
        {
            warn!(
                given = %created_at,
                clamped_to = %last.created_at,
                "observation timestamp older than the stream's newest; clamping"
            );
            created_at = last.created_at;
        }
        self.memories.push(Memory::new(content.into(), created_at, importance));
        // Just pushed, so the vec is non-empty.
        &self.memories[self.memories.len() - 1]
    }

    /// The last `n` memories, most-recent-first.
    pub fn recent(&self, n: usize) -> Vec<&Memory> {
        self.memories.iter().rev().take(n).collect()
    }

    /// Attach an embedding to the memory at `index`.
    ///
    /// The fill is idempotent: an already-embedded memory is left
    /// untouched.  Returns whether the vector was attached.
    pub fn attach_embedding(&mut self, index: usize, vector: Vec<f32>) -> bool {
        match self.memories.get_mut(index) {
            Some(memory) if memory.embedding.is_none() => {
                memory.embedding = Some(vector);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// Iterate in insertion order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = &Memory> {
        self.memories.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Memory> {
        self.memories.get(index)
    }
}
