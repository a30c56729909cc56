//! # codesift
//!
//! Local code and documentation semantic search.
//!
//! codesift ingests source files, splits them into semantically meaningful
//! chunks, embeds each chunk, and persists chunks plus vectors in an
//! embedded `SQLite` index. Queries combine dense (cosine) retrieval with
//! lexical (FTS5) retrieval, optionally reranked by a cross-encoder, and
//! are annotated with calibrated relevance labels.
//!
//! ## Features
//!
//! - **Hybrid retrieval**: exact cosine search fused with full-text search
//!   (RRF or weighted), plus a two-stage prefilter mode
//! - **Calibration**: self-probing score thresholds so relevance labels
//!   stay comparable across embedding models
//! - **Offline fallback**: deterministic keyword-hash embeddings when the
//!   embedding backend is unreachable
//! - **`SQLite` storage**: durable chunks, embeddings, calibration, and
//!   retrieval-usage stats in one file

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod chunking;
pub mod cli;
pub mod core;
pub mod embedding;
pub mod error;
pub mod io;
pub mod search;
pub mod storage;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    CalibrationMetadata, CancelToken, Chunk, ChunkBuilder, ChunkType, IndexStats,
    MemoryRetrieval, Relevance, RetrievalLogEntry, RetrievalStats, SearchResult, chunk_id,
};

// Re-export storage types
pub use storage::{
    DEFAULT_DB_PATH, LexicalIndex, LexicalSearchOptions, LexicalSearcher, ListOptions,
    SearchOptions, SqliteStore, VectorStore,
};

// Re-export chunking types
pub use chunking::{Chunker, ChunkerFactory, GenericChunker, MarkdownChunker};

// Re-export embedding types
pub use embedding::{
    DEFAULT_DIMENSIONS, Embedder, KeywordHashEmbedder, OfflineEmbedder, cosine_similarity,
};

// Re-export search types
pub use search::{
    DEFAULT_TOP_K, FusionMode, HybridOptions, PrefilterOptions, Reranker, RetryingReranker,
    Searcher, calibrate, fuse_rrf, fuse_rrf_top_k, fuse_weighted,
};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
