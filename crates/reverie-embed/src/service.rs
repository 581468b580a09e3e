//! [`EmbeddingService`] – provider registry, fallback chain, cache and
//! statistics.
//!
//! The service owns every registered [`EmbeddingProvider`] and dispatches
//! generation requests to exactly one *active* provider at a time.  When
//! the active provider fails, the configured fallback chain is walked in
//! order until one succeeds; the survivor **becomes** the active provider
//! for subsequent calls (session-wide adaptive behaviour, not a one-shot
//! retry).  Production chains should terminate with
//! [`ProviderKind::Offline`], which cannot fail, making generation total.
//!
//! All state is behind interior mutability so one service can be shared
//! via `Arc` across concurrent callers:
//!
//! * the active `(provider, model)` pair lives under a single `RwLock`, so
//!   a switch is visible atomically – no torn reads;
//! * the cache and the usage counters each sit behind a `Mutex`;
//! * network-provider calls are paced by a `governor` rate limiter – the
//!   explicit bound on generation fan-out (the offline provider is local
//!   and exempt).
//!
//! # Example
//!
//! ```rust
//! use reverie_embed::service::EmbeddingService;
//!
//! # async fn demo() {
//! let service = EmbeddingService::offline_only();
//! let v = service.generate("the pantry is empty").await.unwrap();
//! assert_eq!(v.len(), 64);
//! # }
//! ```

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::{Mutex, RwLock};
use reverie_types::{ProviderKind, RecallError};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, EmbeddingCache};
use crate::offline::OfflineEmbedder;
use crate::provider::EmbeddingProvider;

/// Default cache bound.
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Default pacing for network providers, in requests per second.
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Cosine similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero
/// norm.
///
/// # Errors
///
/// Returns [`RecallError::DimensionMismatch`] when the lengths differ or
/// either vector is empty – a usage error, never silently truncated or
/// padded.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, RecallError> {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return Err(RecallError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        Ok(0.0)
    } else {
        Ok(dot / (norm_a * norm_b))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot of the service's cumulative session statistics.
#[derive(Debug, Clone)]
pub struct EmbeddingStats {
    /// Currently active provider.
    pub provider: ProviderKind,
    /// Currently active model.
    pub model: String,
    /// Vectors actually produced by providers (cache hits excluded).
    pub total_generated: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Estimated cumulative spend in USD.
    pub total_cost: f64,
    /// Mean latency over all provider calls so far.
    pub avg_latency: Duration,
}

#[derive(Default)]
struct Usage {
    total_generated: u64,
    total_cost: f64,
    latency_samples: Vec<Duration>,
}

#[derive(Clone)]
struct ActiveProvider {
    kind: ProviderKind,
    model: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`EmbeddingService`].
///
/// Register providers, declare the fallback chain (first entry = initial
/// active provider), then [`build`][EmbeddingServiceBuilder::build].
pub struct EmbeddingServiceBuilder {
    providers: HashMap<ProviderKind, Box<dyn EmbeddingProvider>>,
    chain: Vec<ProviderKind>,
    cache_capacity: usize,
    requests_per_second: u32,
}

impl Default for EmbeddingServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingServiceBuilder {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            chain: Vec::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    /// Register a provider.  Any previously registered provider of the
    /// same kind is replaced.
    pub fn register(mut self, provider: Box<dyn EmbeddingProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Declare the fallback chain.  The first entry is the initial active
    /// provider; production chains should end with
    /// [`ProviderKind::Offline`].
    pub fn chain(mut self, chain: impl IntoIterator<Item = ProviderKind>) -> Self {
        self.chain = chain.into_iter().collect();
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Pacing applied to network-provider calls.
    pub fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// Validate the configuration and build the service.
    pub fn build(self) -> Result<EmbeddingService, String> {
        if self.chain.is_empty() {
            return Err("fallback chain must name at least one provider".to_string());
        }
        for kind in &self.chain {
            if !self.providers.contains_key(kind) {
                return Err(format!("chain names unregistered provider '{kind}'"));
            }
        }
        let first = self.chain[0];
        let model = self.providers[&first].model().to_string();
        let rps = NonZeroU32::new(self.requests_per_second.max(1))
            .unwrap_or(NonZeroU32::MIN);
        Ok(EmbeddingService {
            providers: self.providers,
            chain: self.chain,
            active: RwLock::new(ActiveProvider { kind: first, model }),
            cache: Mutex::new(EmbeddingCache::new(self.cache_capacity)),
            usage: Mutex::new(Usage::default()),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EmbeddingService
// ─────────────────────────────────────────────────────────────────────────────

/// Session-scoped embedding orchestrator: provider selection, ordered
/// fallback, caching, batching and cost/latency accounting.
pub struct EmbeddingService {
    providers: HashMap<ProviderKind, Box<dyn EmbeddingProvider>>,
    chain: Vec<ProviderKind>,
    active: RwLock<ActiveProvider>,
    cache: Mutex<EmbeddingCache>,
    usage: Mutex<Usage>,
    limiter: DefaultDirectRateLimiter,
}

impl EmbeddingService {
    /// Start configuring a service.
    pub fn builder() -> EmbeddingServiceBuilder {
        EmbeddingServiceBuilder::new()
    }

    /// A service backed solely by the deterministic offline provider.
    /// Useful for headless tests and air-gapped runs.
    pub fn offline_only() -> Self {
        let offline = OfflineEmbedder::new();
        let model = offline.model().to_string();
        let mut providers: HashMap<ProviderKind, Box<dyn EmbeddingProvider>> = HashMap::new();
        providers.insert(ProviderKind::Offline, Box::new(offline));
        Self {
            providers,
            chain: vec![ProviderKind::Offline],
            active: RwLock::new(ActiveProvider {
                kind: ProviderKind::Offline,
                model,
            }),
            cache: Mutex::new(EmbeddingCache::new(DEFAULT_CACHE_CAPACITY)),
            usage: Mutex::new(Usage::default()),
            limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(DEFAULT_REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN),
            )),
        }
    }

    /// Generate (or fetch from cache) the embedding for `text`.
    ///
    /// Cache hits return immediately and never touch a provider or the
    /// active-provider pointer.  On a miss the active provider is tried
    /// first, then the fallback chain in order (skipping providers already
    /// tried); the provider that succeeds becomes the active one.
    ///
    /// # Errors
    ///
    /// [`RecallError::AllProvidersExhausted`] when every provider in the
    /// chain failed.  Chains terminated by the offline provider cannot
    /// exhaust.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let ActiveProvider { kind, model } = self.active.read().clone();
        let key = CacheKey::new(kind, model, text);
        if let Some(vector) = self.cache.lock().get(&key) {
            debug!(provider = %kind, "embedding cache hit");
            return Ok(vector);
        }

        for candidate in self.attempt_order(kind) {
            let Some(provider) = self.providers.get(&candidate) else {
                continue;
            };
            if candidate != ProviderKind::Offline {
                self.limiter.until_ready().await;
            }
            let started = Instant::now();
            match provider.embed(text).await {
                Ok(vector) => {
                    self.record_success(
                        provider.as_ref(),
                        candidate != kind,
                        provider.cost(text),
                        started.elapsed(),
                        1,
                    );
                    self.cache.lock().put(
                        CacheKey::new(candidate, provider.model(), text),
                        vector.clone(),
                    );
                    return Ok(vector);
                }
                Err(e) => {
                    warn!(provider = %candidate, error = %e, "embedding provider failed; walking fallback chain");
                }
            }
        }
        Err(RecallError::AllProvidersExhausted)
    }

    /// Generate embeddings for `texts`, preserving order: exactly one
    /// output per input, no partial results.
    ///
    /// Cache hits are resolved first; the remaining misses go to the
    /// provider chain as one batched call per attempt and are written back
    /// to the cache individually.
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RecallError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let ActiveProvider { kind, model } = self.active.read().clone();
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<usize> = Vec::new();
        {
            let mut cache = self.cache.lock();
            for (i, text) in texts.iter().enumerate() {
                let key = CacheKey::new(kind, model.clone(), text.clone());
                match cache.get(&key) {
                    Some(vector) => slots[i] = Some(vector),
                    None => missing.push(i),
                }
            }
        }

        if !missing.is_empty() {
            let miss_texts: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.embed_misses(kind, &miss_texts).await?;
            for (&slot, vector) in missing.iter().zip(vectors) {
                slots[slot] = Some(vector);
            }
        }

        let mut out = Vec::with_capacity(texts.len());
        for slot in slots {
            match slot {
                Some(vector) => out.push(vector),
                // Unreachable: every index is either a hit or in `missing`.
                None => return Err(RecallError::AllProvidersExhausted),
            }
        }
        Ok(out)
    }

    /// Walk the chain once for a whole batch of cache misses.
    async fn embed_misses(
        &self,
        active_kind: ProviderKind,
        miss_texts: &[String],
    ) -> Result<Vec<Vec<f32>>, RecallError> {
        for candidate in self.attempt_order(active_kind) {
            let Some(provider) = self.providers.get(&candidate) else {
                continue;
            };
            if candidate != ProviderKind::Offline {
                self.limiter.until_ready().await;
            }
            let started = Instant::now();
            match provider.embed_batch(miss_texts).await {
                Ok(vectors) if vectors.len() == miss_texts.len() => {
                    let cost = miss_texts.iter().map(|t| provider.cost(t)).sum();
                    self.record_success(
                        provider.as_ref(),
                        candidate != active_kind,
                        cost,
                        started.elapsed(),
                        vectors.len() as u64,
                    );
                    let mut cache = self.cache.lock();
                    for (text, vector) in miss_texts.iter().zip(&vectors) {
                        cache.put(
                            CacheKey::new(candidate, provider.model(), text.clone()),
                            vector.clone(),
                        );
                    }
                    return Ok(vectors);
                }
                Ok(vectors) => {
                    warn!(
                        provider = %candidate,
                        expected = miss_texts.len(),
                        got = vectors.len(),
                        "provider dropped batch elements; walking fallback chain"
                    );
                }
                Err(e) => {
                    warn!(provider = %candidate, error = %e, "batch embedding failed; walking fallback chain");
                }
            }
        }
        Err(RecallError::AllProvidersExhausted)
    }

    /// Make `kind` the active provider.  Cheap validity check only: the
    /// provider must be registered; no round-trip is performed.  Returns
    /// whether the switch happened.
    pub fn set_provider(&self, kind: ProviderKind) -> bool {
        match self.providers.get(&kind) {
            Some(provider) => {
                *self.active.write() = ActiveProvider {
                    kind,
                    model: provider.model().to_string(),
                };
                info!(provider = %kind, "active embedding provider set");
                true
            }
            None => false,
        }
    }

    pub fn current_provider(&self) -> ProviderKind {
        self.active.read().kind
    }

    pub fn current_model(&self) -> String {
        self.active.read().model.clone()
    }

    /// Snapshot the cumulative session statistics.
    pub fn statistics(&self) -> EmbeddingStats {
        let active = self.active.read().clone();
        let cache = self.cache.lock();
        let usage = self.usage.lock();
        let avg_latency = if usage.latency_samples.is_empty() {
            Duration::ZERO
        } else {
            usage.latency_samples.iter().sum::<Duration>() / usage.latency_samples.len() as u32
        };
        EmbeddingStats {
            provider: active.kind,
            model: active.model,
            total_generated: usage.total_generated,
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            total_cost: usage.total_cost,
            avg_latency,
        }
    }

    // The active provider first, then the chain in declared order, each
    // provider at most once.
    fn attempt_order(&self, first: ProviderKind) -> Vec<ProviderKind> {
        let mut order = vec![first];
        for kind in &self.chain {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        order
    }

    fn record_success(
        &self,
        provider: &dyn EmbeddingProvider,
        switched: bool,
        cost: f64,
        latency: Duration,
        generated: u64,
    ) {
        {
            let mut usage = self.usage.lock();
            usage.total_generated += generated;
            usage.total_cost += cost;
            usage.latency_samples.push(latency);
        }
        if switched {
            info!(provider = %provider.kind(), model = provider.model(), "fell back to embedding provider");
        }
        *self.active.write() = ActiveProvider {
            kind: provider.kind(),
            model: provider.model().to_string(),
        };
    }
}
