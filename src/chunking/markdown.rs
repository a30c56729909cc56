//! Markdown section chunker.
//!
//! Splits markdown documents at headings so each section (heading plus its
//! body) indexes as one unit. Content before the first heading becomes a
//! preamble chunk.

use crate::chunking::Chunker;
use crate::core::{Chunk, ChunkType};
use crate::error::{ChunkingError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Matches an ATX heading line and captures the title.
fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern, cannot fail
        let re = Regex::new(r"^#{1,6}\s+(.+?)\s*$").unwrap();
        re
    })
}

/// Heading-based chunker for `md` / `markdown` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownChunker;

impl MarkdownChunker {
    /// Creates a markdown chunker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Chunker for MarkdownChunker {
    #[allow(clippy::cast_possible_truncation)]
    fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let lines: Vec<&str> = content.lines().collect();
        let re = heading_re();

        // (0-based start line, section name)
        let mut boundaries: Vec<(usize, String)> = Vec::new();
        let mut in_code_fence = false;
        for (i, line) in lines.iter().enumerate() {
            if line.trim_start().starts_with("```") {
                in_code_fence = !in_code_fence;
                continue;
            }
            if in_code_fence {
                continue;
            }
            if let Some(captures) = re.captures(line) {
                let title = captures
                    .get(1)
                    .ok_or_else(|| ChunkingError::Regex("missing heading capture".to_string()))?
                    .as_str()
                    .to_string();
                boundaries.push((i, title));
            }
        }

        let stem = Path::new(file_path)
            .file_stem()
            .map_or_else(|| file_path.to_string(), |s| s.to_string_lossy().to_string());

        let mut sections: Vec<(usize, usize, String)> = Vec::new();
        if boundaries.is_empty() {
            sections.push((0, lines.len() - 1, stem));
        } else {
            if boundaries[0].0 > 0 {
                sections.push((0, boundaries[0].0 - 1, stem));
            }
            for (index, (start, name)) in boundaries.iter().enumerate() {
                let end = boundaries
                    .get(index + 1)
                    .map_or(lines.len() - 1, |(next, _)| next - 1);
                sections.push((*start, end, name.clone()));
            }
        }

        let chunks = sections
            .into_iter()
            .filter_map(|(first, last, name)| {
                let body = lines[first..=last].join("\n");
                if body.trim().is_empty() {
                    return None;
                }
                Some(Chunk::new(
                    file_path,
                    ChunkType::File,
                    &name,
                    &body,
                    first as u32 + 1,
                    last as u32 + 1,
                ))
            })
            .collect();

        Ok(chunks)
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    fn name(&self) -> &'static str {
        "markdown"
    }
}
