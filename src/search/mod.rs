//! Hybrid retrieval orchestration.
//!
//! [`Searcher`] is the public entry point: dense search with optional
//! reranking, hybrid dense+lexical search with fusion, two-stage prefilter
//! search, and parallel multi-query search. Every path finishes by
//! attaching relevance labels (calibrated thresholds when available,
//! percentile bands otherwise) and previews.

pub mod calibrate;
pub mod fusion;
pub mod relevance;
pub mod rerank;

pub use calibrate::{
    CalibrationOptions, DEFAULT_PROBE_COUNT, UNRELATED_PROBE_TEXT, calibrate, calibrate_with,
};
pub use fusion::{DEFAULT_FUSION_ALPHA, DEFAULT_RRF_K, fuse_rrf, fuse_rrf_top_k, fuse_weighted};
pub use relevance::{label_all_by_percentile, label_relevance};
pub use rerank::{DEFAULT_MAX_RETRIES, Reranker, RetryingReranker};

use crate::core::{CancelToken, SearchResult, sort_results};
use crate::embedding::{Embedder, apply_offline_boost};
use crate::error::{Error, Result, StorageError};
use crate::storage::{LexicalSearchOptions, SearchOptions, VectorStore};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Default number of results to return.
pub const DEFAULT_TOP_K: usize = 10;

/// Over-fetch multiplier applied to `top_k` when reranking.
const RERANK_CANDIDATE_FACTOR: usize = 5;

/// Minimum candidate set handed to the reranker.
const RERANK_MIN_CANDIDATES: usize = 50;

/// Stage-1 multiplier applied to `top_k` for prefilter searches.
const PREFILTER_FACTOR: usize = 10;

/// Minimum stage-1 candidate set for prefilter searches.
const PREFILTER_MIN_CANDIDATES: usize = 100;

/// Fusion algorithm for hybrid searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMode {
    /// Reciprocal Rank Fusion (rank-only).
    #[default]
    Rrf,
    /// Weighted sum of dense and lexical scores.
    Weighted,
}

/// Options for [`Searcher::hybrid_search`].
#[derive(Debug, Clone)]
pub struct HybridOptions {
    /// Base search options (`top_k`, `threshold`, structural filters).
    /// Rerank fields are ignored: hybrid search does not rerank.
    pub search: SearchOptions,
    /// Fusion algorithm.
    pub mode: FusionMode,
    /// RRF smoothing parameter.
    pub rrf_k: u32,
    /// Dense weight for weighted fusion. A literal `0` is rewritten to the
    /// default; negative values are reserved and rejected downstream.
    pub alpha: f32,
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self {
            search: SearchOptions::default(),
            mode: FusionMode::Rrf,
            rrf_k: DEFAULT_RRF_K,
            alpha: DEFAULT_FUSION_ALPHA,
        }
    }
}

/// Options for [`Searcher::prefilter_search`].
#[derive(Debug, Clone, Default)]
pub struct PrefilterOptions {
    /// Base search options; the rerank fields apply to stage 2.
    pub search: SearchOptions,
    /// Explicit stage-1 candidate count. `0` derives it from `top_k`.
    pub prefilter_top_k: usize,
}

/// Hybrid retrieval orchestrator.
///
/// Holds shared, read-only handles to a store and an embedder, and an
/// optional reranker. All methods are safe to call concurrently.
pub struct Searcher {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Searcher {
    /// Creates a searcher over a store and an embedder.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            reranker: None,
        }
    }

    /// Attaches a reranker.
    #[must_use]
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Dense search with optional reranking and relevance labels.
    ///
    /// # Errors
    ///
    /// Fails on an empty query or a threshold outside `[0, 1]`, and
    /// propagates embedding and storage failures. Reranker failures are
    /// logged and swallowed.
    pub fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        validate_query(query, options)?;
        let mut results = self.dense_search(query, options, cancel)?;
        self.label_results(&mut results)?;
        Ok(results)
    }

    /// Hybrid dense + lexical search with fusion and relevance labels.
    ///
    /// Requires the store to provide the lexical capability. A lexical
    /// failure degrades to the dense results with a warning; hybrid search
    /// never reranks.
    ///
    /// # Errors
    ///
    /// Fails on invalid arguments, a store without lexical support, or a
    /// dense-path failure.
    pub fn hybrid_search(
        &self,
        query: &str,
        options: &HybridOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        validate_query(query, &options.search)?;
        let Some(lexical) = self.store.as_lexical() else {
            return Err(Error::InvalidArgument {
                message: "storage does not support lexical search".to_string(),
            });
        };

        let dense = self.dense_candidates(query, &options.search, cancel)?;
        cancel.check()?;

        let lexical_options = LexicalSearchOptions {
            top_k: options.search.top_k,
            chunk_type: options.search.chunk_type,
            path_filter: options.search.path_filter.clone(),
        };
        let mut fused = match lexical.lexical_search(query, &lexical_options) {
            Ok(lexical_results) => match options.mode {
                FusionMode::Rrf => fuse_rrf(&dense, &lexical_results, options.rrf_k)?,
                FusionMode::Weighted => {
                    let alpha = if options.alpha == 0.0 {
                        DEFAULT_FUSION_ALPHA
                    } else {
                        options.alpha
                    };
                    fuse_weighted(&dense, &lexical_results, alpha)?
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "lexical search failed, returning dense results only");
                dense
            }
        };

        if options.search.top_k > 0 {
            fused.truncate(options.search.top_k);
        }
        self.label_results(&mut fused)?;
        Ok(fused)
    }

    /// Two-stage search: a lexical pass narrows the candidate set, then the
    /// dense search ranks only those candidates.
    ///
    /// When stage 1 errors or returns nothing (including stores without the
    /// lexical capability), falls back to a plain [`Searcher::search`].
    ///
    /// # Errors
    ///
    /// Fails on invalid arguments and stage-2 failures.
    pub fn prefilter_search(
        &self,
        query: &str,
        options: &PrefilterOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        validate_query(query, &options.search)?;

        let stage1_top_k = options
            .prefilter_top_k
            .max(options.search.top_k * PREFILTER_FACTOR)
            .max(PREFILTER_MIN_CANDIDATES);
        let stage1 = self.store.as_lexical().map(|lexical| {
            lexical.lexical_search(
                query,
                &LexicalSearchOptions {
                    top_k: stage1_top_k,
                    chunk_type: options.search.chunk_type,
                    path_filter: options.search.path_filter.clone(),
                },
            )
        });

        let candidate_ids: Vec<String> = match stage1 {
            Some(Ok(results)) if !results.is_empty() => {
                results.into_iter().map(|r| r.chunk.id).collect()
            }
            Some(Ok(_)) => return self.search(query, &options.search, cancel),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "prefilter stage failed, falling back to plain search");
                return self.search(query, &options.search, cancel);
            }
            None => return self.search(query, &options.search, cancel),
        };
        cancel.check()?;

        let mut stage2 = options.search.clone();
        stage2.chunk_ids = candidate_ids;
        let mut results = self.dense_search(query, &stage2, cancel)?;
        self.label_results(&mut results)?;
        Ok(results)
    }

    /// Parallel multi-query search. Result lists merge by chunk ID keeping
    /// the maximum score, then sort, truncate, and label as one list.
    ///
    /// # Errors
    ///
    /// Fails on an empty query list or any empty query, on batch-embedding
    /// failure, and when any per-query search fails (errors are joined).
    pub fn search_multiple(
        &self,
        queries: &[String],
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        if queries.is_empty() {
            return Err(Error::InvalidArgument {
                message: "query list must not be empty".to_string(),
            });
        }
        for query in queries {
            validate_query(query, options)?;
        }
        cancel.check()?;

        let texts: Vec<&str> = queries.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        cancel.check()?;

        let merged: Mutex<HashMap<String, SearchResult>> = Mutex::new(HashMap::new());
        let (error_tx, error_rx) = std::sync::mpsc::sync_channel::<String>(embeddings.len());

        embeddings
            .par_iter()
            .for_each_with(error_tx, |error_tx, embedding| {
                if cancel.is_cancelled() {
                    return;
                }
                match self.store.search(embedding, options) {
                    Ok(results) => {
                        let mut map = merged.lock().unwrap_or_else(PoisonError::into_inner);
                        for result in results {
                            map.entry(result.chunk.id.clone())
                                .and_modify(|existing| {
                                    if result.score > existing.score {
                                        existing.score = result.score;
                                    }
                                })
                                .or_insert(result);
                        }
                    }
                    Err(err) => {
                        let _ = error_tx.try_send(err.to_string());
                    }
                }
            });
        cancel.check()?;

        let errors: Vec<String> = error_rx.try_iter().collect();
        if !errors.is_empty() {
            return Err(StorageError::Database(errors.join("; ")).into());
        }

        let mut results: Vec<SearchResult> = merged
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_values()
            .collect();
        sort_results(&mut results);
        if options.top_k > 0 {
            results.truncate(options.top_k);
        }
        self.label_results(&mut results)?;
        Ok(results)
    }

    /// Dense search with the rerank pipeline but without labels.
    fn dense_search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        let reranking = options.rerank && self.reranker.is_some();
        let mut fetch = options.clone();
        if reranking {
            fetch.top_k = if options.rerank_candidates > 0 {
                options.rerank_candidates
            } else {
                (options.top_k * RERANK_CANDIDATE_FACTOR).max(RERANK_MIN_CANDIDATES)
            };
            // The embedding threshold is disabled for the candidate fetch;
            // the caller's threshold applies to reranker scores instead.
            fetch.threshold = 0.0;
            if fetch.rerank_threshold.is_none() && options.threshold > 0.0 {
                fetch.rerank_threshold = Some(options.threshold);
            }
        }

        let results = self.dense_candidates(query, &fetch, cancel)?;
        if reranking {
            return self.apply_rerank(query, results, options.top_k, fetch.rerank_threshold, cancel);
        }
        Ok(results)
    }

    /// Plain dense leg: embed, store search, offline keyword boost.
    fn dense_candidates(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        cancel.check()?;
        let embedding = self.embedder.embed(query)?;
        cancel.check()?;

        let mut results = self.store.search(&embedding, options)?;
        if self.embedder.is_offline() {
            apply_offline_boost(&mut results, query);
            sort_results(&mut results);
        }
        Ok(results)
    }

    /// Replaces candidate scores with reranker scores, then re-sorts,
    /// applies the rerank threshold, and truncates. Reranker failures keep
    /// the embedding-scored list (truncated) and never propagate.
    fn apply_rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
        top_k: usize,
        rerank_threshold: Option<f32>,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        let Some(reranker) = &self.reranker else {
            return Ok(results);
        };
        if results.is_empty() {
            return Ok(results);
        }
        cancel.check()?;

        let documents: Vec<String> = results.iter().map(|r| r.chunk.content.clone()).collect();
        match reranker.rerank(query, &documents) {
            Ok(scores) if scores.len() == results.len() => {
                for (result, score) in results.iter_mut().zip(scores) {
                    result.score = score;
                }
                sort_results(&mut results);
                if let Some(threshold) = rerank_threshold {
                    results.retain(|r| r.score >= threshold);
                }
            }
            Ok(scores) => {
                tracing::warn!(
                    expected = results.len(),
                    received = scores.len(),
                    "reranker returned a mismatched score count, keeping embedding order"
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "reranking failed, keeping embedding order");
            }
        }

        if top_k > 0 {
            results.truncate(top_k);
        }
        Ok(results)
    }

    /// Attaches relevance labels and previews: calibrated thresholds when
    /// a calibration record exists, percentile bands otherwise.
    fn label_results(&self, results: &mut [SearchResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }

        match self.store.calibration()? {
            Some(calibration) => {
                for result in results.iter_mut() {
                    result.relevance = Some(label_relevance(result.score, &calibration));
                }
            }
            None => label_all_by_percentile(results),
        }
        for result in results.iter_mut() {
            result.preview = Some(result.chunk.preview());
        }
        Ok(())
    }
}

fn validate_query(query: &str, options: &SearchOptions) -> Result<()> {
    if query.is_empty() {
        return Err(Error::InvalidArgument {
            message: "query must not be empty".to_string(),
        });
    }
    if options.threshold.is_nan() || !(0.0..=1.0).contains(&options.threshold) {
        return Err(Error::InvalidArgument {
            message: format!("threshold must be in [0, 1], got {}", options.threshold),
        });
    }
    Ok(())
}
