//! Result-list fusion.
//!
//! Combines a dense (embedding) result list and a lexical (full-text)
//! result list into one ranking, either rank-only (Reciprocal Rank Fusion)
//! or score-weighted. Both inputs are expected sorted by descending score.

use crate::core::{SearchResult, sort_results};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Default RRF smoothing parameter, per the original RRF paper.
pub const DEFAULT_RRF_K: u32 = 60;

/// Default dense weight for weighted fusion.
pub const DEFAULT_FUSION_ALPHA: f32 = 0.7;

/// Performs Reciprocal Rank Fusion over a dense and a lexical result list.
///
/// Each result at zero-based rank `r` contributes `1 / (k + r + 1)` to the
/// running score of its chunk ID. The output contains every unique chunk
/// observed (the first occurrence supplies the payload), sorted by
/// descending fused score with ascending chunk ID as the tie-break.
///
/// # Errors
///
/// Returns an invalid-argument error when `k == 0`.
pub fn fuse_rrf(
    dense: &[SearchResult],
    lexical: &[SearchResult],
    k: u32,
) -> Result<Vec<SearchResult>> {
    if k == 0 {
        return Err(Error::InvalidArgument {
            message: "rrf k must be > 0".to_string(),
        });
    }

    let mut fused: HashMap<String, SearchResult> = HashMap::new();
    for list in [dense, lexical] {
        for (rank, result) in list.iter().enumerate() {
            let contribution = (1.0 / f64::from(k + rank as u32 + 1)) as f32;
            fused
                .entry(result.chunk.id.clone())
                .and_modify(|entry| entry.score += contribution)
                .or_insert_with(|| SearchResult::new(result.chunk.clone(), contribution));
        }
    }

    let mut results: Vec<SearchResult> = fused.into_values().collect();
    sort_results(&mut results);
    Ok(results)
}

/// [`fuse_rrf`] with truncation to the first `top_k` entries when
/// `top_k > 0`.
///
/// # Errors
///
/// Returns an invalid-argument error when `k == 0`.
pub fn fuse_rrf_top_k(
    dense: &[SearchResult],
    lexical: &[SearchResult],
    k: u32,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    let mut results = fuse_rrf(dense, lexical, k)?;
    if top_k > 0 {
        results.truncate(top_k);
    }
    Ok(results)
}

/// Weighted-sum fusion: `alpha * dense_score + (1 - alpha) * lexical_score`.
///
/// A chunk present in only one list contributes zero from the other side.
/// No score normalization is performed; callers are responsible for
/// comparable scales. Deduplication and ordering match [`fuse_rrf`].
///
/// # Errors
///
/// Returns an invalid-argument error when `alpha` is outside `[0, 1]`.
pub fn fuse_weighted(
    dense: &[SearchResult],
    lexical: &[SearchResult],
    alpha: f32,
) -> Result<Vec<SearchResult>> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::InvalidArgument {
            message: format!("fusion alpha must be in [0, 1], got {alpha}"),
        });
    }

    struct Entry {
        payload: SearchResult,
        dense_score: f32,
        lexical_score: f32,
    }

    let mut entries: HashMap<String, Entry> = HashMap::new();
    for result in dense {
        entries
            .entry(result.chunk.id.clone())
            .and_modify(|e| e.dense_score = e.dense_score.max(result.score))
            .or_insert_with(|| Entry {
                payload: result.clone(),
                dense_score: result.score,
                lexical_score: 0.0,
            });
    }
    for result in lexical {
        entries
            .entry(result.chunk.id.clone())
            .and_modify(|e| e.lexical_score = e.lexical_score.max(result.score))
            .or_insert_with(|| Entry {
                payload: result.clone(),
                dense_score: 0.0,
                lexical_score: result.score,
            });
    }

    let mut results: Vec<SearchResult> = entries
        .into_values()
        .map(|entry| {
            let mut result = entry.payload;
            result.score = alpha * entry.dense_score + (1.0 - alpha) * entry.lexical_score;
            result
        })
        .collect();
    sort_results(&mut results);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chunk, ChunkType};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn result(name: &str, score: f32) -> SearchResult {
        let chunk = Chunk::new("src/x.rs", ChunkType::Function, name, "body", 1, 1);
        SearchResult::new(chunk, score)
    }

    #[test]
    fn test_rrf_reference_scenario() {
        // D = [(A, 0.9), (B, 0.8)], L = [(B, 0.7), (C, 0.6)], k = 60.
        let a = result("A", 0.9);
        let b = result("B", 0.8);
        let b_lex = result("B", 0.7);
        let c = result("C", 0.6);
        let dense = vec![a.clone(), b.clone()];
        let lexical = vec![b_lex, c.clone()];

        let fused = fuse_rrf(&dense, &lexical, 60).unwrap();
        assert_eq!(fused.len(), 3);

        // B appears at rank 1 in dense and rank 0 in lexical: 1/62 + 1/61.
        assert_eq!(fused[0].chunk.id, b.chunk.id);
        assert!((f64::from(fused[0].score) - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);

        // A: rank 0 in dense only: 1/61.
        assert_eq!(fused[1].chunk.id, a.chunk.id);
        assert!((f64::from(fused[1].score) - 1.0 / 61.0).abs() < 1e-6);

        // C: rank 1 in lexical only: 1/62.
        assert_eq!(fused[2].chunk.id, c.chunk.id);
        assert!((f64::from(fused[2].score) - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_rejects_zero_k() {
        let err = fuse_rrf(&[], &[], 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_rrf_empty_inputs() {
        assert!(fuse_rrf(&[], &[], 60).unwrap().is_empty());

        let dense = vec![result("A", 0.9)];
        let fused = fuse_rrf(&dense, &[], 60).unwrap();
        assert_eq!(fused.len(), 1);
    }

    #[test]
    fn test_rrf_first_occurrence_supplies_payload() {
        let mut dense_b = result("B", 0.8);
        dense_b.chunk.content = "dense payload".to_string();
        let mut lexical_b = result("B", 0.7);
        lexical_b.chunk.content = "lexical payload".to_string();

        let fused = fuse_rrf(&[dense_b], &[lexical_b], 60).unwrap();
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].chunk.content, "dense payload");
    }

    #[test]
    fn test_rrf_top_k_truncation() {
        let dense = vec![result("A", 0.9), result("B", 0.8)];
        let lexical = vec![result("C", 0.7), result("D", 0.6)];

        let fused = fuse_rrf_top_k(&dense, &lexical, 60, 2).unwrap();
        assert_eq!(fused.len(), 2);

        let fused = fuse_rrf_top_k(&dense, &lexical, 60, 0).unwrap();
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn test_rrf_tie_break_by_id() {
        // Disjoint singletons at the same rank score identically; order
        // falls back to ascending chunk ID.
        let fused = fuse_rrf(&[result("A", 0.9)], &[result("B", 0.7)], 60).unwrap();
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - fused[1].score).abs() < f32::EPSILON);
        assert!(fused[0].chunk.id < fused[1].chunk.id);
    }

    #[test]
    fn test_weighted_combination() {
        let dense = vec![result("A", 0.8)];
        let lexical = vec![result("A", 0.4)];

        let fused = fuse_weighted(&dense, &lexical, 0.7).unwrap();
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - (0.7 * 0.8 + 0.3 * 0.4)).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_single_sided_entries() {
        let dense = vec![result("A", 0.8)];
        let lexical = vec![result("B", 0.6)];

        let fused = fuse_weighted(&dense, &lexical, 0.5).unwrap();
        assert_eq!(fused.len(), 2);
        let by_name: std::collections::HashMap<&str, f32> = fused
            .iter()
            .map(|r| (r.chunk.name.as_str(), r.score))
            .collect();
        assert!((by_name["A"] - 0.4).abs() < 1e-6);
        assert!((by_name["B"] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_rejects_out_of_range_alpha() {
        assert!(matches!(
            fuse_weighted(&[], &[], -0.1).unwrap_err(),
            Error::InvalidArgument { .. }
        ));
        assert!(matches!(
            fuse_weighted(&[], &[], 1.1).unwrap_err(),
            Error::InvalidArgument { .. }
        ));
        assert!(fuse_weighted(&[], &[], 0.0).is_ok());
        assert!(fuse_weighted(&[], &[], 1.0).is_ok());
    }

    proptest! {
        #[test]
        fn prop_fused_ids_are_union_without_duplicates(
            dense_names in prop::collection::vec("[a-e]", 0..6),
            lexical_names in prop::collection::vec("[c-h]", 0..6),
        ) {
            let dense: Vec<SearchResult> = dense_names
                .iter()
                .enumerate()
                .map(|(i, n)| result(n, 1.0 - i as f32 * 0.1))
                .collect();
            let lexical: Vec<SearchResult> = lexical_names
                .iter()
                .enumerate()
                .map(|(i, n)| result(n, 1.0 - i as f32 * 0.1))
                .collect();

            let fused = fuse_rrf(&dense, &lexical, 60).unwrap();

            let expected: HashSet<String> = dense
                .iter()
                .chain(lexical.iter())
                .map(|r| r.chunk.id.clone())
                .collect();
            let got: Vec<String> = fused.iter().map(|r| r.chunk.id.clone()).collect();
            let got_set: HashSet<String> = got.iter().cloned().collect();

            prop_assert_eq!(got.len(), got_set.len(), "no duplicates");
            prop_assert_eq!(got_set, expected, "union of input ids");

            // Total order: descending score, ascending id on ties.
            for window in fused.windows(2) {
                prop_assert!(
                    window[0].score > window[1].score
                        || ((window[0].score - window[1].score).abs() < f32::EPSILON
                            && window[0].chunk.id < window[1].chunk.id)
                );
            }
        }
    }
}
