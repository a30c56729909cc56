//! Search result types.

use crate::core::Chunk;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calibrated relevance band for a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    /// Below the medium threshold, or the bottom percentile band.
    Low,
    /// Between the medium and high thresholds.
    Medium,
    /// At or above the high threshold, or the top percentile band.
    High,
}

impl Relevance {
    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored chunk returned from a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched chunk.
    pub chunk: Chunk,

    /// Retrieval score. Cosine similarity for dense searches, an
    /// index-defined relevance score for lexical searches, a fused score
    /// after fusion, or a reranker score after reranking.
    pub score: f32,

    /// Calibrated relevance band, attached by the searcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Relevance>,

    /// Single-line preview, attached by the searcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl SearchResult {
    /// Creates an unlabeled result.
    #[must_use]
    pub const fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            score,
            relevance: None,
            preview: None,
        }
    }

    /// Renders the compact machine-consumer record described by the wire
    /// format: `{"f": path, "n": name, "l": start_line, "s": score,
    /// "r": relevance?, "pr": preview?}`.
    #[must_use]
    pub fn to_minimal(&self) -> MinimalResult<'_> {
        MinimalResult {
            f: &self.chunk.file_path,
            n: &self.chunk.name,
            l: self.chunk.start_line,
            s: self.score,
            r: self.relevance.map(Relevance::as_str),
            pr: self.preview.as_deref(),
        }
    }
}

/// Compact result record for machine consumers.
#[derive(Debug, Serialize)]
pub struct MinimalResult<'a> {
    /// File path.
    pub f: &'a str,
    /// Symbol name.
    pub n: &'a str,
    /// Start line.
    pub l: u32,
    /// Score.
    pub s: f32,
    /// Relevance label, when assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r: Option<&'a str>,
    /// Preview, when assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr: Option<&'a str>,
}

/// Sorts results into the canonical total order: descending score, then
/// ascending chunk ID as a deterministic tie-break.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}
