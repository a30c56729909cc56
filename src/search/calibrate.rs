//! Score calibration.
//!
//! Learns `{perfect_match, baseline}` anchor scores for an opaque
//! embedding model by probing the index with its own content and with a
//! fixed nonsense string, then derives the relevance thresholds so labels
//! stay comparable across models.

use crate::core::{
    CalibrationMetadata, CancelToken, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD,
    DEFAULT_MEDIUM_THRESHOLD, now_unix,
};
use crate::embedding::Embedder;
use crate::error::{CalibrationError, Result};
use crate::storage::{ListOptions, SearchOptions, VectorStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Number of self-match probes.
pub const DEFAULT_PROBE_COUNT: usize = 3;

/// Fixed nonsense text for the unrelated probes.
pub const UNRELATED_PROBE_TEXT: &str = "xyzzy quantum banana 7392 lorem ipsum";

/// Number of searches against the unrelated-probe embedding.
const UNRELATED_PROBE_RUNS: usize = 3;

/// High threshold position within the calibrated score range.
const HIGH_FRACTION: f32 = 0.70;
/// Medium threshold position within the calibrated score range.
const MEDIUM_FRACTION: f32 = 0.40;
/// Low threshold position within the calibrated score range.
const LOW_FRACTION: f32 = 0.15;

/// Options for the calibration procedure.
#[derive(Debug, Clone)]
pub struct CalibrationOptions {
    /// Number of self-match probes. Must be positive.
    pub probe_count: usize,
    /// Deterministic shuffle seed override. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            probe_count: DEFAULT_PROBE_COUNT,
            seed: None,
        }
    }
}

/// Runs calibration with default options.
///
/// # Errors
///
/// Fails with [`CalibrationError::EmptyIndex`] on an empty store, and
/// propagates embedding and storage failures.
pub fn calibrate(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    cancel: &CancelToken,
) -> Result<CalibrationMetadata> {
    calibrate_with(store, embedder, &CalibrationOptions::default(), cancel)
}

/// Runs calibration.
///
/// Self-match probes: list up to `3 * probe_count` chunks, shuffle
/// uniformly, keep `probe_count`, embed each chunk's content and record the
/// top-1 search score; the median becomes `perfect_match_score`. Unrelated
/// probes: embed [`UNRELATED_PROBE_TEXT`] once, search three times,
/// median of the top scores becomes `baseline_score`. Thresholds sit at
/// fixed fractions of the range; a degenerate range falls back to the
/// default thresholds.
///
/// # Errors
///
/// Fails with [`CalibrationError::EmptyIndex`] on an empty store, an
/// invalid-probe-count error when `probe_count == 0`, and propagates
/// embedding and storage failures.
pub fn calibrate_with(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    options: &CalibrationOptions,
    cancel: &CancelToken,
) -> Result<CalibrationMetadata> {
    if options.probe_count == 0 {
        return Err(CalibrationError::InvalidProbeCount { count: 0 }.into());
    }
    cancel.check()?;

    let stats = store.stats()?;
    if stats.chunks_total == 0 {
        return Err(CalibrationError::EmptyIndex.into());
    }

    let mut candidates = store.list(&ListOptions {
        limit: options.probe_count * 3,
        ..ListOptions::default()
    })?;

    let mut rng = options.seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
    candidates.shuffle(&mut rng);
    candidates.truncate(options.probe_count);

    let mut self_scores = Vec::with_capacity(candidates.len());
    for chunk in &candidates {
        cancel.check()?;
        let embedding = embedder.embed(&chunk.content)?;
        if let Some(top) = store.search(&embedding, &SearchOptions::top_k(1))?.first() {
            self_scores.push(top.score);
        }
    }
    let perfect_match_score = median(&mut self_scores);

    cancel.check()?;
    let unrelated = embedder.embed(UNRELATED_PROBE_TEXT)?;
    let mut baseline_scores = Vec::with_capacity(UNRELATED_PROBE_RUNS);
    for _ in 0..UNRELATED_PROBE_RUNS {
        cancel.check()?;
        if let Some(top) = store.search(&unrelated, &SearchOptions::top_k(1))?.first() {
            baseline_scores.push(top.score);
        }
    }
    let baseline_score = median(&mut baseline_scores);

    let score_range = perfect_match_score - baseline_score;
    let (high_threshold, medium_threshold, low_threshold) =
        if perfect_match_score <= 0.0 || score_range <= 0.0 {
            tracing::warn!(
                perfect_match_score,
                baseline_score,
                "degenerate calibration range, using default thresholds"
            );
            (
                DEFAULT_HIGH_THRESHOLD,
                DEFAULT_MEDIUM_THRESHOLD,
                DEFAULT_LOW_THRESHOLD,
            )
        } else {
            (
                HIGH_FRACTION.mul_add(score_range, baseline_score),
                MEDIUM_FRACTION.mul_add(score_range, baseline_score),
                LOW_FRACTION.mul_add(score_range, baseline_score),
            )
        };

    Ok(CalibrationMetadata {
        embedding_model: embedder.model().to_string(),
        calibration_date: now_unix(),
        perfect_match_score,
        baseline_score,
        score_range,
        high_threshold,
        medium_threshold,
        low_threshold,
    })
}

/// Median of the recorded probe scores; `0.0` for an empty set.
fn median(scores: &mut [f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = scores.len() / 2;
    if scores.len() % 2 == 1 {
        scores[mid]
    } else {
        f32::midpoint(scores[mid - 1], scores[mid])
    }
}
