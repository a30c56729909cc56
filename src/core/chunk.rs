//! Chunk representation for codesift.
//!
//! Chunks are semantically meaningful units of source (a function, a
//! struct, a markdown section, or a whole small file) produced by chunkers.
//! Each chunk carries a deterministic 16-hex-character ID derived from its
//! file path, symbol name, and start line, so re-indexing the same symbol
//! updates the existing row in place.

use crate::error::ChunkingError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Maximum preview length in Unicode scalar values.
pub const PREVIEW_MAX_CHARS: usize = 150;

/// Kind of source unit a chunk represents.
///
/// Serialized as its lowercase name; parsing rejects unknown names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// A free function.
    Function,
    /// A method on a type.
    Method,
    /// A struct/class-like type definition.
    Struct,
    /// An interface/trait-like definition.
    Interface,
    /// A whole file or a section of one.
    File,
}

impl ChunkType {
    /// Returns the lowercase string name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = ChunkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "struct" => Ok(Self::Struct),
            "interface" => Ok(Self::Interface),
            "file" => Ok(Self::File),
            other => Err(ChunkingError::UnknownChunkType {
                name: other.to_string(),
            }),
        }
    }
}

/// A semantically meaningful unit of source with a deterministic ID.
///
/// # Examples
///
/// ```
/// use codesift::core::{Chunk, ChunkType};
///
/// let chunk = Chunk::new(
///     "src/auth.rs",
///     ChunkType::Function,
///     "handle_auth",
///     "fn handle_auth() {}",
///     10,
///     12,
/// );
/// assert_eq!(chunk.id.len(), 16);
/// assert_eq!(chunk.language, "rs");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier: first 8 bytes of
    /// `SHA-256("<file_path>:<name>:<start_line>")` as 16 hex characters.
    pub id: String,

    /// Path of the source file.
    pub file_path: String,

    /// Kind of source unit.
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    /// Symbolic name (function name, struct name, section heading, ...).
    pub name: String,

    /// Declaration signature, when the chunker could extract one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// Full text content.
    pub content: String,

    /// First line of the unit in the source file (1-based, inclusive).
    pub start_line: u32,

    /// Last line of the unit in the source file (1-based, inclusive).
    pub end_line: u32,

    /// Language tag: the file extension without the dot.
    pub language: String,

    /// Optional domain/profile tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Source file modification time (Unix seconds), when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_mtime: Option<i64>,
}

impl Chunk {
    /// Creates a new chunk, deriving the ID and the language tag.
    ///
    /// Line numbers are normalized so `end_line >= start_line >= 1` holds.
    #[must_use]
    pub fn new(
        file_path: &str,
        chunk_type: ChunkType,
        name: &str,
        content: &str,
        start_line: u32,
        end_line: u32,
    ) -> Self {
        let start_line = start_line.max(1);
        let end_line = end_line.max(start_line);
        Self {
            id: chunk_id(file_path, name, start_line),
            file_path: file_path.to_string(),
            chunk_type,
            name: name.to_string(),
            signature: None,
            content: content.to_string(),
            start_line,
            end_line,
            language: language_tag(file_path),
            domain: None,
            file_mtime: None,
        }
    }

    /// Returns a short single-line preview of the chunk.
    ///
    /// Derived from the signature when present, otherwise from the content.
    /// Newlines and tabs collapse to single spaces; output is truncated to
    /// 150 Unicode scalar values with a trailing `…` when shortened.
    #[must_use]
    pub fn preview(&self) -> String {
        let source = self.signature.as_deref().unwrap_or(&self.content);
        let flat: String = source
            .chars()
            .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
            .collect();

        if flat.chars().count() <= PREVIEW_MAX_CHARS {
            return flat;
        }
        let mut truncated: String = flat.chars().take(PREVIEW_MAX_CHARS).collect();
        truncated.push('…');
        truncated
    }

    /// Number of lines this chunk spans.
    #[must_use]
    pub const fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

/// Builder for chunks with optional fields.
#[derive(Debug, Default)]
pub struct ChunkBuilder {
    file_path: String,
    chunk_type: Option<ChunkType>,
    name: String,
    signature: Option<String>,
    content: String,
    start_line: u32,
    end_line: u32,
    domain: Option<String>,
    file_mtime: Option<i64>,
}

impl ChunkBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(file_path: &str, name: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Sets the chunk type.
    #[must_use]
    pub const fn chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = Some(chunk_type);
        self
    }

    /// Sets the declaration signature.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    /// Sets the content.
    #[must_use]
    pub fn content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    /// Sets the inclusive 1-based line span.
    #[must_use]
    pub const fn lines(mut self, start_line: u32, end_line: u32) -> Self {
        self.start_line = start_line;
        self.end_line = end_line;
        self
    }

    /// Sets the domain tag.
    #[must_use]
    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    /// Sets the source file modification time.
    #[must_use]
    pub const fn file_mtime(mut self, mtime: i64) -> Self {
        self.file_mtime = Some(mtime);
        self
    }

    /// Builds the chunk.
    #[must_use]
    pub fn build(self) -> Chunk {
        let mut chunk = Chunk::new(
            &self.file_path,
            self.chunk_type.unwrap_or(ChunkType::File),
            &self.name,
            &self.content,
            self.start_line,
            self.end_line,
        );
        chunk.signature = self.signature;
        chunk.domain = self.domain;
        chunk.file_mtime = self.file_mtime;
        chunk
    }
}

/// Derives the deterministic chunk ID.
///
/// First 8 bytes of `SHA-256("<file_path>:<name>:<start_line>")`, rendered
/// as 16 lowercase hex characters. The ID is a pure function of its inputs;
/// content changes never change the ID.
#[must_use]
pub fn chunk_id(file_path: &str, name: &str, start_line: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(start_line.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(16);
    for byte in &digest[..8] {
        use std::fmt::Write;
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// Extracts the language tag from a file path: the extension, lowercased,
/// without the leading dot. Files without an extension get an empty tag.
#[must_use]
pub fn language_tag(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_deterministic() {
        let a = chunk_id("src/auth.rs", "handle_auth", 10);
        let b = chunk_id("src/auth.rs", "handle_auth", 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_chunk_id_varies_with_inputs() {
        let base = chunk_id("src/auth.rs", "handle_auth", 10);
        assert_ne!(base, chunk_id("src/auth.rs", "handle_auth", 11));
        assert_ne!(base, chunk_id("src/auth.rs", "handle_login", 10));
        assert_ne!(base, chunk_id("src/login.rs", "handle_auth", 10));
    }

    #[test]
    fn test_chunk_id_matches_sha256_prefix() {
        // SHA-256("a.rs:f:1") computed independently.
        let id = chunk_id("a.rs", "f", 1);
        let digest = Sha256::digest(b"a.rs:f:1");
        let expected: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(id, expected);
    }

    #[test]
    fn test_chunk_new_normalizes_lines() {
        let chunk = Chunk::new("a.rs", ChunkType::Function, "f", "fn f() {}", 0, 0);
        assert_eq!(chunk.start_line, 1);
        assert_eq!(chunk.end_line, 1);

        let chunk = Chunk::new("a.rs", ChunkType::Function, "f", "fn f() {}", 9, 3);
        assert_eq!(chunk.start_line, 9);
        assert_eq!(chunk.end_line, 9);
    }

    #[test]
    fn test_language_tag() {
        assert_eq!(language_tag("src/main.rs"), "rs");
        assert_eq!(language_tag("doc/README.MD"), "md");
        assert_eq!(language_tag("Makefile"), "");
    }

    #[test]
    fn test_preview_from_content() {
        let chunk = Chunk::new(
            "a.rs",
            ChunkType::Function,
            "f",
            "line one\n\tline two",
            1,
            2,
        );
        assert_eq!(chunk.preview(), "line one  line two");
    }

    #[test]
    fn test_preview_prefers_signature() {
        let mut chunk = Chunk::new("a.rs", ChunkType::Function, "f", "body text", 1, 1);
        chunk.signature = Some("fn f(x: u32) -> bool".to_string());
        assert_eq!(chunk.preview(), "fn f(x: u32) -> bool");
    }

    #[test]
    fn test_preview_truncates_at_150_chars() {
        let content = "x".repeat(400);
        let chunk = Chunk::new("a.txt", ChunkType::File, "a", &content, 1, 1);
        let preview = chunk.preview();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_preview_counts_scalars_not_bytes() {
        // Multibyte characters: 150 scalars is more than 150 bytes.
        let content = "é".repeat(200);
        let chunk = Chunk::new("a.txt", ChunkType::File, "a", &content, 1, 1);
        let preview = chunk.preview();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
    }

    #[test]
    fn test_preview_short_content_untruncated() {
        let chunk = Chunk::new("a.txt", ChunkType::File, "a", "short", 1, 1);
        assert_eq!(chunk.preview(), "short");
    }

    #[test]
    fn test_chunk_type_round_trip() {
        for chunk_type in [
            ChunkType::Function,
            ChunkType::Method,
            ChunkType::Struct,
            ChunkType::Interface,
            ChunkType::File,
        ] {
            let parsed: ChunkType = chunk_type.as_str().parse().unwrap();
            assert_eq!(parsed, chunk_type);
        }
    }

    #[test]
    fn test_chunk_type_rejects_unknown() {
        assert!("widget".parse::<ChunkType>().is_err());
        assert!("Function".parse::<ChunkType>().is_err());
    }

    #[test]
    fn test_chunk_serialization() {
        let mut chunk = Chunk::new("src/a.rs", ChunkType::Struct, "Foo", "struct Foo;", 3, 3);
        chunk.domain = Some("backend".to_string());

        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "struct");
        assert_eq!(json["file_path"], "src/a.rs");
        assert_eq!(json["start_line"], 3);
        assert!(json.get("signature").is_none());
        assert_eq!(json["domain"], "backend");

        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_chunk_builder() {
        let chunk = ChunkBuilder::new("src/db.rs", "open")
            .chunk_type(ChunkType::Method)
            .signature("pub fn open(path: &Path) -> Result<Self>")
            .content("pub fn open(path: &Path) -> Result<Self> { .. }")
            .lines(40, 55)
            .domain("storage")
            .file_mtime(1_700_000_000)
            .build();

        assert_eq!(chunk.chunk_type, ChunkType::Method);
        assert_eq!(chunk.start_line, 40);
        assert_eq!(chunk.end_line, 55);
        assert_eq!(chunk.id, chunk_id("src/db.rs", "open", 40));
        assert!(chunk.signature.is_some());
        assert_eq!(chunk.file_mtime, Some(1_700_000_000));
    }

    #[test]
    fn test_line_count() {
        let chunk = Chunk::new("a.rs", ChunkType::Function, "f", "x", 10, 14);
        assert_eq!(chunk.line_count(), 5);
    }
}
