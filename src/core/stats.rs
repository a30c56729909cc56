//! Index metadata: calibration, index stats, and retrieval-usage counters.

use serde::{Deserialize, Serialize};

/// Default thresholds used when calibration is degenerate.
pub const DEFAULT_HIGH_THRESHOLD: f32 = 0.70;
/// Default medium threshold.
pub const DEFAULT_MEDIUM_THRESHOLD: f32 = 0.40;
/// Default low threshold.
pub const DEFAULT_LOW_THRESHOLD: f32 = 0.15;

/// Per-index calibration record learned by the calibration procedure.
///
/// At most one row exists per index; writing overwrites the previous row.
/// Absence is not an error: labeling falls back to percentile mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetadata {
    /// Embedding model the thresholds were learned for.
    pub embedding_model: String,
    /// Unix timestamp (seconds) when calibration ran.
    pub calibration_date: i64,
    /// Median top-1 score of self-match probes.
    pub perfect_match_score: f32,
    /// Median top-1 score of unrelated-text probes.
    pub baseline_score: f32,
    /// `perfect_match_score - baseline_score`.
    pub score_range: f32,
    /// Scores at or above this label `high`.
    pub high_threshold: f32,
    /// Scores at or above this (and below high) label `medium`.
    pub medium_threshold: f32,
    /// Informational low-band anchor.
    pub low_threshold: f32,
}

/// Aggregate statistics for an index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of distinct files with indexed chunks.
    pub files_indexed: usize,
    /// Total number of chunks.
    pub chunks_total: usize,
    /// Embedding model recorded by the last calibration, if any.
    pub embedding_model: String,
    /// On-disk size of the index in bytes (0 for in-memory stores).
    pub index_size_bytes: u64,
    /// Unix timestamp (seconds) of the last write.
    pub last_updated: i64,
}

/// Usage counters for one memory, keyed by an opaque `memory_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    /// Opaque memory identifier.
    pub memory_id: String,
    /// Number of times this memory was retrieved.
    pub retrieval_count: u64,
    /// Unix timestamp (seconds) of the last retrieval.
    pub last_retrieved: i64,
    /// Query text of the last retrieval.
    pub last_query: String,
    /// Score of the last retrieval.
    pub last_score: f32,
    /// Free-form status tag (e.g. "active", "archived").
    pub status: String,
}

/// One retrieval to record, used by the batch tracking operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRetrieval {
    /// Opaque memory identifier.
    pub memory_id: String,
    /// Query that retrieved the memory.
    pub query: String,
    /// Score the memory was retrieved with.
    pub score: f32,
}

/// One row of the prunable retrieval log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalLogEntry {
    /// Log row ID.
    pub id: i64,
    /// Opaque memory identifier.
    pub memory_id: String,
    /// Query that retrieved the memory.
    pub query: String,
    /// Score the memory was retrieved with.
    pub score: f32,
    /// Unix timestamp (seconds) of the retrieval.
    pub timestamp: i64,
}
