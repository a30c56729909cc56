//! Storage trait definitions.
//!
//! [`VectorStore`] is the dense index surface the searcher orchestrates
//! over; [`LexicalSearcher`] is the optional full-text capability a store
//! may additionally provide. Capability detection is an explicit
//! `as_lexical` probe rather than a downcast, so alternative store
//! implementations can opt in or out.

use crate::core::{
    CalibrationMetadata, Chunk, ChunkType, IndexStats, MemoryRetrieval, RetrievalLogEntry,
    RetrievalStats, SearchResult,
};
use crate::error::Result;

/// Options for dense (embedding) searches.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum number of results; `0` means unlimited.
    pub top_k: usize,
    /// Minimum score, in `[0, 1]`. Candidates scoring below are rejected.
    pub threshold: f32,
    /// Restrict to one chunk kind.
    pub chunk_type: Option<ChunkType>,
    /// Substring filter on the file path.
    pub path_filter: Option<String>,
    /// Restrict the search to an explicit candidate set (used by the
    /// prefilter pipeline). Empty means no restriction.
    pub chunk_ids: Vec<String>,
    /// Request reranking of the candidate set.
    pub rerank: bool,
    /// Number of candidates to over-fetch for reranking; `0` derives the
    /// default from `top_k`.
    pub rerank_candidates: usize,
    /// Minimum reranker score. Promoted from `threshold` when reranking is
    /// requested without an explicit value.
    pub rerank_threshold: Option<f32>,
}

impl SearchOptions {
    /// Convenience constructor for the common case.
    #[must_use]
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }
}

/// Options for lexical (full-text) searches.
#[derive(Debug, Clone, Default)]
pub struct LexicalSearchOptions {
    /// Maximum number of results; `0` means unlimited.
    pub top_k: usize,
    /// Restrict to one chunk kind.
    pub chunk_type: Option<ChunkType>,
    /// Substring filter on the file path.
    pub path_filter: Option<String>,
}

/// Options for listing chunks.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Restrict to one chunk kind.
    pub chunk_type: Option<ChunkType>,
    /// Substring filter on the file path.
    pub path_filter: Option<String>,
    /// Maximum number of chunks; `0` means unlimited.
    pub limit: usize,
}

/// Durable mapping of chunks and their embeddings, with exact cosine
/// search and auxiliary metadata (calibration, retrieval stats).
///
/// Implementations must support many concurrent readers; writer
/// serialization is permitted but readers must not block readers.
/// Operations on a closed store fail with
/// [`crate::error::StorageError::Closed`].
pub trait VectorStore: Send + Sync {
    /// Inserts a chunk and its embedding, overwriting any row with the
    /// same ID.
    ///
    /// # Errors
    ///
    /// Fails with a dimension error when the embedding length differs from
    /// the store's configured dimensions.
    fn create(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()>;

    /// Reads a chunk and its embedding by ID.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::StorageError::NotFound`] for unknown IDs.
    fn read(&self, id: &str) -> Result<(Chunk, Vec<f32>)>;

    /// Updates an existing row in place.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::StorageError::NotFound`] for unknown IDs.
    fn update(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()>;

    /// Deletes a row by ID. Deleting an unknown ID is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the database write fails.
    fn delete(&self, id: &str) -> Result<()>;

    /// Deletes every chunk whose `file_path` equals the given path.
    /// Returns the number of deleted rows.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the database write fails.
    fn delete_by_file_path(&self, file_path: &str) -> Result<usize>;

    /// Lists chunks matching the options, ordered by `(file_path,
    /// start_line)`.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed.
    fn list(&self, options: &ListOptions) -> Result<Vec<Chunk>>;

    /// Removes every chunk (and, through it, the lexical index).
    /// Calibration and retrieval stats survive.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the database write fails.
    fn clear(&self) -> Result<()>;

    /// Returns aggregate index statistics.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed.
    fn stats(&self) -> Result<IndexStats>;

    /// Closes the store. Further operations fail with
    /// [`crate::error::StorageError::Closed`]. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Infallible for the SQLite implementation; part of the contract for
    /// stores with flushing semantics.
    fn close(&self) -> Result<()>;

    /// Exact cosine search over every candidate row passing the structural
    /// filters. Output is total-ordered by `(-score, +id)` and truncated to
    /// `top_k` when `top_k > 0`.
    ///
    /// # Errors
    ///
    /// Fails with a dimension error when the query vector length differs
    /// from the store's configured dimensions.
    fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<SearchResult>>;

    /// Reads the calibration record, if one was stored.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the record cannot be decoded.
    fn calibration(&self) -> Result<Option<CalibrationMetadata>>;

    /// Stores the calibration record, overwriting any previous one.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the database write fails.
    fn set_calibration(&self, metadata: &CalibrationMetadata) -> Result<()>;

    /// Increments the retrieval counter for a memory and appends to the
    /// retrieval log.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the database write fails.
    fn track_memory_retrieval(&self, memory_id: &str, query: &str, score: f32) -> Result<()>;

    /// Records a batch of retrievals atomically: either every row is
    /// applied or none.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the transaction fails.
    fn track_memory_retrieval_batch(&self, retrievals: &[MemoryRetrieval]) -> Result<()>;

    /// Reads the usage counters for one memory.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed.
    fn memory_stats(&self, memory_id: &str) -> Result<Option<RetrievalStats>>;

    /// Reads the usage counters for every tracked memory, most-retrieved
    /// first.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed.
    fn all_memory_stats(&self) -> Result<Vec<RetrievalStats>>;

    /// Reads the most recent log entries for one memory, newest first.
    /// `limit == 0` means unlimited.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed.
    fn memory_retrieval_history(
        &self,
        memory_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalLogEntry>>;

    /// Updates the status tag of a tracked memory.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::StorageError::NotFound`] for unknown
    /// memory IDs.
    fn update_memory_stats_status(&self, memory_id: &str, status: &str) -> Result<()>;

    /// Deletes log entries older than `max_age_days`. Returns the number
    /// of deleted rows.
    ///
    /// # Errors
    ///
    /// Fails if the store is closed or the database write fails.
    fn prune_memory_retrieval_log(&self, max_age_days: u32) -> Result<usize>;

    /// Capability probe: the lexical surface of this store, when it has
    /// one. The default is `None`.
    fn as_lexical(&self) -> Option<&dyn LexicalSearcher> {
        None
    }
}

/// Full-text search capability over chunks.
///
/// Score semantics are implementation-defined but must be monotone (higher
/// means more relevant) and stable across identical inputs. Tokenization
/// must at minimum be case-insensitive and split on non-alphanumerics, so
/// identifier-like queries such as `handleAuth` match bodies containing
/// `handleAuth`.
pub trait LexicalSearcher: Send + Sync {
    /// Ranked keyword search.
    ///
    /// # Errors
    ///
    /// Fails if the underlying index is closed or the query fails.
    fn lexical_search(
        &self,
        query: &str,
        options: &LexicalSearchOptions,
    ) -> Result<Vec<SearchResult>>;
}
