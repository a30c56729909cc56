//! Error types for codesift operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! operations including storage, search, embedding, chunking, and I/O.

use thiserror::Error;

/// Result type alias for codesift operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for codesift operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument supplied by the caller (empty query, bad threshold,
    /// bad fusion parameter, non-positive probe count).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Operation cancelled via a [`crate::core::CancelToken`].
    #[error("operation cancelled")]
    Cancelled,

    /// Storage-related errors (index database operations).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Embedding-related errors (embedder backend).
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Calibration-related errors.
    #[error("calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// Chunking-related errors.
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl Error {
    /// Returns `true` if this error represents an unreachable network
    /// backend.
    ///
    /// The check is two-pronged: the structured [`EmbeddingError::Network`]
    /// kind, or a case-insensitive substring match against the known
    /// transport failure messages. The offline embedder uses this to decide
    /// whether to degrade to the keyword-hash fallback.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        if matches!(self, Self::Embedding(EmbeddingError::Network(_))) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        NETWORK_ERROR_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    }
}

/// Transport failure fragments recognized by [`Error::is_network_error`].
const NETWORK_ERROR_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "no such host",
    "network is unreachable",
    "timeout",
    "dial tcp",
    "dial udp",
    "no route to host",
    "connection timed out",
    "eof",
];

/// Storage-specific errors for index database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Operation attempted on a closed store.
    #[error("storage is closed")]
    Closed,

    /// Chunk not found by ID.
    #[error("chunk not found: {id}")]
    NotFound {
        /// Chunk ID that was not found.
        id: String,
    },

    /// Embedding length differs from the store's configured dimensions.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions the store was opened with.
        expected: usize,
        /// Dimensions of the offending vector.
        actual: usize,
    },

    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Malformed embedding blob read back from the database.
    #[error("corrupt embedding blob: {0}")]
    CorruptBlob(String),
}

/// Embedding backend errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The embedding backend is unreachable (triggers offline fallback).
    #[error("network error: {0}")]
    Network(String),

    /// The embedding backend answered with a non-success status.
    #[error("remote error (status {status}): {message}")]
    Remote {
        /// HTTP-ish status code reported by the backend.
        status: u16,
        /// Message reported by the backend.
        message: String,
    },

    /// Embedding generation failed for a non-transport reason.
    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Calibration errors.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Calibration requires at least one indexed chunk.
    #[error("cannot calibrate an empty index")]
    EmptyIndex,

    /// Probe count must be positive.
    #[error("probe count must be > 0, got {count}")]
    InvalidProbeCount {
        /// The offending probe count.
        count: usize,
    },
}

/// Chunking-specific errors.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// No chunker is registered for the file's extension.
    #[error("no chunker registered for extension: {extension}")]
    UnsupportedExtension {
        /// File extension that could not be resolved.
        extension: String,
    },

    /// Unknown chunk type name during parsing.
    #[error("unknown chunk type: {name}")]
    UnknownChunkType {
        /// The unrecognized type name.
        name: String,
    },

    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

// Implement From traits for library errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<regex::Error> for ChunkingError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}
