//! File I/O for the ingest pipeline.

pub mod reader;

pub use reader::{FileReader, read_file};
