//! Chunking: splitting source files into indexable units.
//!
//! The [`Chunker`] trait is the seam for language-specific splitters; the
//! [`ChunkerFactory`] resolves a chunker from a file's trailing extension.
//! This crate ships a generic text chunker and a markdown section chunker;
//! richer language chunkers plug in through [`ChunkerFactory::register`].

pub mod generic;
pub mod markdown;

pub use generic::GenericChunker;
pub use markdown::MarkdownChunker;

use crate::core::{Chunk, language_tag};
use crate::error::{ChunkingError, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Trait for file chunkers.
///
/// Implementations must be `Send + Sync` and deterministic: the same input
/// yields the same chunks. Empty input yields no chunks, not an error.
pub trait Chunker: Send + Sync {
    /// Splits a file's content into chunks.
    ///
    /// # Errors
    ///
    /// Returns an error when the splitter itself fails; unparseable input
    /// degrades to whole-file chunks instead of failing.
    fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>>;

    /// File extensions (lowercase, no dot) this chunker handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Returns the name of the chunking strategy.
    fn name(&self) -> &'static str;
}

impl std::fmt::Debug for dyn Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker").field("name", &self.name()).finish()
    }
}

/// Extension-keyed chunker registry.
///
/// Reads are taken under a shared lock so concurrent lookups never block
/// each other; registration takes the exclusive lock.
pub struct ChunkerFactory {
    by_extension: RwLock<HashMap<String, Arc<dyn Chunker>>>,
}

impl ChunkerFactory {
    /// Creates a factory with the built-in chunkers registered.
    #[must_use]
    pub fn new() -> Self {
        let factory = Self::empty();
        factory.register(Arc::new(GenericChunker::new()));
        factory.register(Arc::new(MarkdownChunker::new()));
        factory
    }

    /// Creates a factory with no chunkers registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_extension: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a chunker for every extension it reports, replacing any
    /// previous registration for those extensions.
    pub fn register(&self, chunker: Arc<dyn Chunker>) {
        let mut map = self
            .by_extension
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for extension in chunker.extensions() {
            map.insert((*extension).to_string(), Arc::clone(&chunker));
        }
    }

    /// Resolves the chunker for a file by its trailing extension
    /// (lowercased, dot removed).
    #[must_use]
    pub fn for_path(&self, file_path: &str) -> Option<Arc<dyn Chunker>> {
        let extension = language_tag(file_path);
        self.by_extension
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&extension)
            .cloned()
    }

    /// Like [`Self::for_path`] but failing with an unsupported-extension
    /// error instead of `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::UnsupportedExtension`] when nothing is
    /// registered for the file's extension.
    pub fn require_for_path(&self, file_path: &str) -> Result<Arc<dyn Chunker>> {
        self.for_path(file_path).ok_or_else(|| {
            ChunkingError::UnsupportedExtension {
                extension: language_tag(file_path),
            }
            .into()
        })
    }

    /// Chunks a file with the resolved chunker.
    ///
    /// # Errors
    ///
    /// Fails when no chunker is registered for the extension, or when the
    /// chunker fails.
    pub fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>> {
        self.require_for_path(file_path)?.chunk(file_path, content)
    }

    /// Lists every registered extension, sorted.
    #[must_use]
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .by_extension
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        extensions.sort();
        extensions
    }
}

impl Default for ChunkerFactory {
    fn default() -> Self {
        Self::new()
    }
}
