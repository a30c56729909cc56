//! Core domain types for codesift.
//!
//! The canonical data model: chunks with deterministic IDs, scored search
//! results, calibration and usage metadata, and the cancellation token
//! threaded through public operations.

pub mod cancel;
pub mod chunk;
pub mod result;
pub mod stats;

pub use cancel::CancelToken;
pub use chunk::{Chunk, ChunkBuilder, ChunkType, PREVIEW_MAX_CHARS, chunk_id, language_tag};
pub use result::{MinimalResult, Relevance, SearchResult, sort_results};
pub use stats::{
    CalibrationMetadata, DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD, DEFAULT_MEDIUM_THRESHOLD,
    IndexStats, MemoryRetrieval, RetrievalLogEntry, RetrievalStats,
};

/// Returns the current Unix timestamp in seconds.
#[allow(clippy::cast_possible_wrap)]
#[must_use]
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
