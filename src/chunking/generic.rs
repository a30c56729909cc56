//! Generic text chunker.
//!
//! Splits plain-text-ish files (config, logs, scripts, data) into
//! line-window chunks, preferring blank-line boundaries so paragraphs and
//! stanzas stay together.

use crate::chunking::Chunker;
use crate::core::{Chunk, ChunkType};
use crate::error::Result;
use std::path::Path;

/// Preferred chunk size in lines; a blank line at or past this flushes.
const TARGET_LINES: usize = 80;

/// Hard cap on lines per chunk.
const MAX_LINES: usize = 120;

/// Extensions routed to the generic chunker.
const EXTENSIONS: &[&str] = &[
    "txt", "text", "rst", "adoc", "yaml", "yml", "toml", "ini", "cfg", "conf", "json", "xml",
    "csv", "sh", "bash", "zsh", "fish", "log", "diff", "patch",
];

/// Line-window chunker for files without a structure-aware splitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericChunker;

impl GenericChunker {
    /// Creates a generic chunker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// File stem used as the base for section names.
fn file_stem(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .map_or_else(|| file_path.to_string(), |s| s.to_string_lossy().to_string())
}

impl Chunker for GenericChunker {
    #[allow(clippy::cast_possible_truncation)]
    fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let lines: Vec<&str> = content.lines().collect();
        let mut sections: Vec<(usize, usize)> = Vec::new(); // 0-based inclusive line spans
        let mut start = 0;

        for (i, line) in lines.iter().enumerate() {
            let block_len = i - start + 1;
            let at_boundary = line.trim().is_empty() && block_len >= TARGET_LINES;
            if at_boundary || block_len >= MAX_LINES {
                sections.push((start, i));
                start = i + 1;
            }
        }
        if start < lines.len() {
            sections.push((start, lines.len() - 1));
        }

        let stem = file_stem(file_path);
        let multiple = sections.len() > 1;
        let chunks = sections
            .into_iter()
            .enumerate()
            .filter_map(|(index, (first, last))| {
                let body = lines[first..=last].join("\n");
                if body.trim().is_empty() {
                    return None;
                }
                let name = if multiple {
                    format!("{stem}_{index}")
                } else {
                    stem.clone()
                };
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
        EXTENSIONS
    }

    fn name(&self) -> &'static str {
        "generic"
    }
}
