//! CLI layer for codesift.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing, indexing, searching, and calibrating an index.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
