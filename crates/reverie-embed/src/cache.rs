//! [`EmbeddingCache`] – bounded vector cache with hit/miss accounting.
//!
//! Keys are `(provider, model, exact text)`; text is deliberately not
//! normalised, so `"Water"` and `"water"` are distinct entries.  The cache
//! is bounded: once `capacity` entries are stored, the oldest insertion is
//! evicted first (FIFO).  Running out of room is never an error.

use std::collections::{HashMap, VecDeque};

use reverie_types::ProviderKind;

/// Cache key: which provider/model produced the vector, and for what text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: ProviderKind,
    pub model: String,
    pub text: String,
}

impl CacheKey {
    pub fn new(provider: ProviderKind, model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            text: text.into(),
        }
    }
}

/// Bounded FIFO cache from [`CacheKey`] to embedding vectors.
pub struct EmbeddingCache {
    capacity: usize,
    entries: HashMap<CacheKey, Vec<f32>>,
    /// Insertion order; front = oldest = next eviction victim.
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` vectors.  A capacity of 0
    /// disables storage entirely (every lookup is a miss).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up `key`, counting the outcome.
    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<f32>> {
        match self.entries.get(key) {
            Some(vector) => {
                self.hits += 1;
                Some(vector.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store `vector` under `key`, silently evicting the oldest entry when
    /// the cache is full.  Re-inserting an existing key overwrites the
    /// vector without changing its eviction slot (last write wins).
    pub fn put(&mut self, key: CacheKey, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), vector).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
