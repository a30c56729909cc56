//! Deterministic keyword-hash embedder.
//!
//! Projects tokens into a fixed-dimension vector with FNV-1a hashing.
//! This is NOT semantic similarity - it clusters texts by lexical overlap.
//! It exists so the system keeps answering when no embedding backend is
//! reachable, and as a zero-dependency embedder for tests and offline use.

use crate::Result;
use crate::embedding::{DEFAULT_DIMENSIONS, Embedder};

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET: u32 = 2_166_136_261;
/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 16_777_619;

/// Minimum token length considered by the projection.
const MIN_TOKEN_LEN: usize = 2;

/// Computes the FNV-1a 32-bit hash over the UTF-8 bytes of a string.
fn fnv1a(s: &str) -> u32 {
    let mut hash = FNV_OFFSET;
    for byte in s.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Generates a deterministic keyword-hash embedding.
///
/// The text is lowercased and tokenized on any character outside
/// `[a-z0-9_]`; tokens shorter than 2 characters are skipped. Each token
/// projects into dimension `fnv1a(token) % dims` with weight 1.0, scaled
/// by a positional factor that slightly favors early tokens. Each adjacent
/// token pair projects `fnv1a("a_b") % dims` with weight 0.5. The result
/// is L2-normalized; an all-zero vector stays all-zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn keyword_hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let dimensions = if dimensions == 0 {
        DEFAULT_DIMENSIONS
    } else {
        dimensions
    };
    let mut embedding = vec![0.0f32; dimensions];

    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'))
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        let idx = fnv1a(token) as usize % dimensions;
        embedding[idx] += 1.0;
        embedding[idx] *= 1.0 + 0.1 / (1.0 + i as f32 / 5.0);
    }

    for pair in tokens.windows(2) {
        let bigram = format!("{}_{}", pair[0], pair[1]);
        let idx = fnv1a(&bigram) as usize % dimensions;
        embedding[idx] += 0.5;
    }

    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut embedding {
            *value /= magnitude;
        }
    }

    embedding
}

/// Standalone embedder over [`keyword_hash_embedding`].
///
/// # Examples
///
/// ```
/// use codesift::embedding::{Embedder, KeywordHashEmbedder};
///
/// let embedder = KeywordHashEmbedder::new(1024);
/// let a = embedder.embed("parse the config file").unwrap();
/// let b = embedder.embed("parse the config file").unwrap();
/// assert_eq!(a, b); // Deterministic
/// ```
pub struct KeywordHashEmbedder {
    dimensions: usize,
}

impl KeywordHashEmbedder {
    /// Creates a new keyword-hash embedder with the specified dimensions.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for KeywordHashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl Embedder for KeywordHashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        "keyword-hash"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_hash_embedding(text, self.dimensions))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        use rayon::prelude::*;

        Ok(texts
            .par_iter()
            .map(|text| keyword_hash_embedding(text, self.dimensions))
            .collect())
    }
}
