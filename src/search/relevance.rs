//! Relevance labeling.
//!
//! Maps scores to `{high, medium, low}` bands, either against learned
//! calibration thresholds or by percentile position when no calibration
//! exists.

use crate::core::{CalibrationMetadata, Relevance, SearchResult};

/// Fraction of results labeled `high` in percentile mode.
const HIGH_FRACTION: f64 = 0.20;
/// Fraction of results labeled `high` or `medium` in percentile mode.
const MEDIUM_FRACTION: f64 = 0.70;

/// Labels a score against calibration thresholds.
///
/// The score is clamped into `[0, 1]` first: `high` at or above the high
/// threshold, `medium` at or above the medium threshold, `low` otherwise.
#[must_use]
pub fn label_relevance(score: f32, calibration: &CalibrationMetadata) -> Relevance {
    let score = score.clamp(0.0, 1.0);
    if score >= calibration.high_threshold {
        Relevance::High
    } else if score >= calibration.medium_threshold {
        Relevance::Medium
    } else {
        Relevance::Low
    }
}

/// Labels every result by its percentile position.
///
/// Results are ranked by descending score (stable). The top 20% (at least
/// one result) is `high`, positions up to 70% are `medium`, the rest is
/// `low`. For three or fewer results the `low` band collapses when it
/// would otherwise swallow the `medium` band.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn label_all_by_percentile(results: &mut [SearchResult]) {
    let n = results.len();
    if n == 0 {
        return;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        results[b]
            .score
            .partial_cmp(&results[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let high_cutoff = ((n as f64 * HIGH_FRACTION).floor() as usize).max(1);
    let mut low_cutoff = (n as f64 * MEDIUM_FRACTION).floor() as usize;
    if n <= 3 && low_cutoff <= high_cutoff {
        low_cutoff = n;
    }

    for (position, &index) in order.iter().enumerate() {
        results[index].relevance = Some(if position < high_cutoff {
            Relevance::High
        } else if position < low_cutoff {
            Relevance::Medium
        } else {
            Relevance::Low
        });
    }
}
