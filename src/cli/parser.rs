//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use crate::storage::DEFAULT_DB_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// codesift: local code and documentation semantic search.
///
/// Indexes source files into an embedded `SQLite` database and answers
/// queries with hybrid dense/lexical retrieval.
#[derive(Parser, Debug)]
#[command(name = "codesift")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the index database file.
    ///
    /// Defaults to `.codesift/index.db` in the current directory.
    #[arg(short, long, env = "CODESIFT_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, minimal).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolves the database path, falling back to the default.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the index database.
    Init,

    /// Index source files.
    ///
    /// Re-indexing a file replaces its previous chunks.
    Index {
        /// Files to index.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Domain tag attached to every indexed chunk.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Search the index.
    Search {
        /// The query text.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Minimum score threshold in [0, 1].
        #[arg(short, long, default_value = "0.0")]
        threshold: f32,

        /// Restrict to a chunk kind (function, method, struct, interface, file).
        #[arg(long = "type")]
        chunk_type: Option<String>,

        /// Substring filter on the file path.
        #[arg(long)]
        path: Option<String>,

        /// Combine dense and lexical retrieval.
        #[arg(long)]
        hybrid: bool,

        /// Narrow candidates with a lexical pass before the dense search.
        #[arg(long, conflicts_with = "hybrid")]
        prefilter: bool,

        /// Fusion mode for hybrid search (rrf, weighted).
        #[arg(long, default_value = "rrf")]
        mode: String,

        /// Dense weight for weighted fusion.
        #[arg(long, default_value = "0.7")]
        alpha: f32,

        /// RRF smoothing parameter.
        #[arg(long, default_value = "60")]
        rrf_k: u32,
    },

    /// Learn score thresholds for the configured embedder.
    Calibrate {
        /// Deterministic probe-shuffle seed (mainly for reproducible runs).
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show index statistics.
    Status,

    /// Delete every indexed chunk.
    Clear {
        /// Skip confirmation.
        #[arg(short = 'y', long)]
        yes: bool,
    },
}
