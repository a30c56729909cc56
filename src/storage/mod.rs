//! Storage layer for codesift.
//!
//! The index data plane: a `SQLite`-backed vector store (chunks plus
//! embeddings, exact cosine search, calibration and retrieval-stats rows)
//! and an FTS5 lexical index, both behind small capability traits.

pub mod lexical;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use lexical::{LexicalIndex, sanitize_collection_name};
pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::{MEMORY_PATH, SqliteStore, decode_embedding, encode_embedding};
pub use traits::{
    LexicalSearchOptions, LexicalSearcher, ListOptions, SearchOptions, VectorStore,
};

/// Default index database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".codesift/index.db";
