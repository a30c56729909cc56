//! Offline-fallback embedding decorator.
//!
//! Wraps any [`Embedder`] and transparently degrades to the deterministic
//! keyword-hash projection when the backend is unreachable. While offline,
//! the backend is re-probed at most once per probe interval; a successful
//! call flips the decorator back online.

use crate::Result;
use crate::core::SearchResult;
use crate::embedding::{DEFAULT_DIMENSIONS, Embedder, keyword_hash_embedding};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use unicode_segmentation::UnicodeSegmentation;

/// How long to wait before re-probing an unreachable backend.
pub const OFFLINE_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Weight of the lexical-overlap boost applied to offline search scores.
const OFFLINE_BOOST_WEIGHT: f32 = 0.2;

#[derive(Debug)]
struct OfflineState {
    offline: bool,
    last_check: Option<Instant>,
}

/// Embedder decorator with transparent offline fallback.
///
/// Holds an `{Online, OfflineFallback}` state. Online calls go straight to
/// the wrapped backend. A failure classified as a network error (see
/// [`crate::Error::is_network_error`]) switches the decorator to fallback
/// mode and synthesizes a keyword-hash embedding instead; non-network
/// errors always propagate. In fallback mode the backend is retried once
/// the probe interval has elapsed.
pub struct OfflineEmbedder {
    inner: Box<dyn Embedder>,
    dimensions_hint: usize,
    probe_interval: Duration,
    state: Mutex<OfflineState>,
}

impl OfflineEmbedder {
    /// Wraps an embedder.
    ///
    /// `dimensions_hint` is used for fallback embeddings when the wrapped
    /// embedder does not (yet) report its dimensions; if both are zero the
    /// fallback uses [`DEFAULT_DIMENSIONS`].
    #[must_use]
    pub fn new(inner: Box<dyn Embedder>, dimensions_hint: usize) -> Self {
        Self {
            inner,
            dimensions_hint,
            probe_interval: OFFLINE_PROBE_INTERVAL,
            state: Mutex::new(OfflineState {
                offline: false,
                last_check: None,
            }),
        }
    }

    /// Overrides the probe interval. Intended for tests.
    #[must_use]
    pub const fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    fn effective_dimensions(&self) -> usize {
        let inner = self.inner.dimensions();
        if inner > 0 {
            return inner;
        }
        if self.dimensions_hint > 0 {
            return self.dimensions_hint;
        }
        DEFAULT_DIMENSIONS
    }

    /// Whether the wrapped backend should be attempted on this call:
    /// always while online, and after the probe interval while offline.
    fn should_probe(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.offline {
            return true;
        }
        state
            .last_check
            .is_none_or(|at| at.elapsed() > self.probe_interval)
    }

    fn mark_online(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.offline {
            tracing::info!(model = self.inner.model(), "embedding backend reachable again");
        }
        state.offline = false;
    }

    fn mark_offline(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.offline {
            tracing::warn!(
                model = self.inner.model(),
                "embedding backend unreachable, switching to keyword-hash fallback"
            );
        }
        state.offline = true;
        state.last_check = Some(Instant::now());
    }
}

impl Embedder for OfflineEmbedder {
    fn dimensions(&self) -> usize {
        self.effective_dimensions()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.should_probe() {
            match self.inner.embed(text) {
                Ok(embedding) => {
                    self.mark_online();
                    return Ok(embedding);
                }
                Err(err) if err.is_network_error() => self.mark_offline(),
                Err(err) => return Err(err),
            }
        }
        Ok(keyword_hash_embedding(text, self.effective_dimensions()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.should_probe() {
            match self.inner.embed_batch(texts) {
                Ok(embeddings) => {
                    self.mark_online();
                    return Ok(embeddings);
                }
                Err(err) if err.is_network_error() => self.mark_offline(),
                Err(err) => return Err(err),
            }
        }
        let dimensions = self.effective_dimensions();
        Ok(texts
            .iter()
            .map(|text| keyword_hash_embedding(text, dimensions))
            .collect())
    }

    fn is_offline(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .offline
    }
}

/// Boosts search scores by lexical overlap with the query.
///
/// Applied after a vector search served by fallback embeddings, where raw
/// cosine scores understate obvious keyword matches. For each result the
/// matched fraction of query tokens (length >= 2, case-insensitive,
/// substring of content or name) is folded in as
/// `score := min(1, score + 0.2 * fraction)`.
#[allow(clippy::cast_precision_loss)]
pub fn apply_offline_boost(results: &mut [SearchResult], query: &str) {
    let tokens: BTreeSet<String> = query
        .unicode_words()
        .map(str::to_lowercase)
        .filter(|w| w.len() >= 2)
        .collect();
    if tokens.is_empty() {
        return;
    }

    for result in results.iter_mut() {
        let content = result.chunk.content.to_lowercase();
        let name = result.chunk.name.to_lowercase();
        let matched = tokens
            .iter()
            .filter(|w| content.contains(w.as_str()) || name.contains(w.as_str()))
            .count();
        let fraction = matched as f32 / tokens.len() as f32;
        result.score = (result.score + OFFLINE_BOOST_WEIGHT * fraction).min(1.0);
    }
}
