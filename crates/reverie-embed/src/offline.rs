//! [`OfflineEmbedder`] – deterministic fallback provider.
//!
//! The offline analogue of a stub driver: it never fails and needs no
//! network, so every production fallback chain can terminate with it and
//! the full stack can run in headless tests and CI pipelines.
//!
//! Vectors are derived from the input text alone.  The `(model, text)`
//! pair seeds a SplitMix64 generator whose output fills the vector, which
//! is then normalised to unit length.  Identical text therefore yields
//! bit-identical vectors on every call – required for cache-hit tests and
//! reproducible fallback behaviour.  These vectors carry no semantic
//! signal; they only satisfy the shape of the embedding contract.
//!
//! # Example
//!
//! ```rust
//! use reverie_embed::offline::OfflineEmbedder;
//! use reverie_embed::provider::EmbeddingProvider;
//!
//! # async fn demo() {
//! let provider = OfflineEmbedder::new();
//! let a = provider.embed("the well is dry").await.unwrap();
//! let b = provider.embed("the well is dry").await.unwrap();
//! assert_eq!(a, b);
//! # }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use reverie_types::{ProviderKind, RecallError};

use crate::provider::EmbeddingProvider;

/// Output dimensionality of the offline provider.  Deliberately small:
/// the vectors are non-semantic, so extra width buys nothing.
pub const OFFLINE_DIMENSION: usize = 64;

const OFFLINE_MODEL: &str = "hash-v1";

/// Deterministic, never-failing embedding provider.
#[derive(Default)]
pub struct OfflineEmbedder;

impl OfflineEmbedder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineEmbedder {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Offline
    }

    fn model(&self) -> &str {
        OFFLINE_MODEL
    }

    fn dimension(&self) -> usize {
        OFFLINE_DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        Ok(hash_vector(OFFLINE_MODEL, text))
    }
}

/// Build the unit-length pseudo-random vector for `(model, text)`.
fn hash_vector(model: &str, text: &str) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    model.hash(&mut hasher);
    text.hash(&mut hasher);
    let mut state = hasher.finish();

    let mut v: Vec<f32> = (0..OFFLINE_DIMENSION)
        .map(|_| {
            let bits = splitmix64(&mut state);
            // Map the top 53 bits into [-1, 1).
            let unit = (bits >> 11) as f64 / (1u64 << 53) as f64;
            (unit * 2.0 - 1.0) as f32
        })
        .collect();

    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    } else {
        // All-zero draw is astronomically unlikely; fall back to a basis
        // vector so the contract of a non-zero unit vector still holds.
        v[0] = 1.0;
    }
    v
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
