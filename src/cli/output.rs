//! Output formatting for CLI commands.
//!
//! Supports human-readable text, full JSON, and the compact minimal-JSON
//! record stream for machine consumers.

use crate::core::{CalibrationMetadata, IndexStats, SearchResult};
use crate::error::Error;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
    /// Newline-delimited compact result records
    /// (`{"f", "n", "l", "s", "r", "pr"}`).
    Minimal,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" | "compact" | "ndjson" => Self::Minimal,
            _ => Self::Text,
        }
    }
}

fn format_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Formats search results.
#[must_use]
pub fn format_results(results: &[SearchResult], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_results_text(results),
        OutputFormat::Json => format_json(&results),
        OutputFormat::Minimal => {
            let mut output = String::new();
            for result in results {
                if let Ok(line) = serde_json::to_string(&result.to_minimal()) {
                    output.push_str(&line);
                    output.push('\n');
                }
            }
            output
        }
    }
}

fn format_results_text(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results.\n".to_string();
    }

    let mut output = String::new();
    for (i, result) in results.iter().enumerate() {
        let relevance = result
            .relevance
            .map_or("", |r| r.as_str());
        let _ = writeln!(
            output,
            "{:>2}. [{:.3}] {:<8} {}:{} {}",
            i + 1,
            result.score,
            relevance,
            result.chunk.file_path,
            result.chunk.start_line,
            result.chunk.name,
        );
        if let Some(preview) = &result.preview {
            let _ = writeln!(output, "      {preview}");
        }
    }
    output
}

/// Formats index statistics.
#[must_use]
pub fn format_status(stats: &IndexStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_status_text(stats),
        OutputFormat::Json | OutputFormat::Minimal => format_json(stats),
    }
}

fn format_status_text(stats: &IndexStats) -> String {
    let mut output = String::new();
    output.push_str("codesift index\n");
    output.push_str("==============\n\n");
    let _ = writeln!(output, "  Files indexed:  {}", stats.files_indexed);
    let _ = writeln!(output, "  Chunks:         {}", stats.chunks_total);
    if !stats.embedding_model.is_empty() {
        let _ = writeln!(output, "  Model:          {}", stats.embedding_model);
    }
    let _ = writeln!(output, "  Index size:     {} bytes", stats.index_size_bytes);
    if stats.last_updated > 0 {
        let _ = writeln!(output, "  Last updated:   {}", stats.last_updated);
    }
    output
}

/// Formats a calibration record.
#[must_use]
pub fn format_calibration(metadata: &CalibrationMetadata, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            output.push_str("Calibration complete\n");
            let _ = writeln!(output, "  Model:          {}", metadata.embedding_model);
            let _ = writeln!(output, "  Perfect match:  {:.4}", metadata.perfect_match_score);
            let _ = writeln!(output, "  Baseline:       {:.4}", metadata.baseline_score);
            let _ = writeln!(output, "  High threshold: {:.4}", metadata.high_threshold);
            let _ = writeln!(output, "  Med threshold:  {:.4}", metadata.medium_threshold);
            let _ = writeln!(output, "  Low threshold:  {:.4}", metadata.low_threshold);
            output
        }
        OutputFormat::Json | OutputFormat::Minimal => format_json(metadata),
    }
}

/// Formats an error for the selected output format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json | OutputFormat::Minimal => {
            format!("{{\"error\": {}}}", serde_json::json!(error.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chunk, ChunkType, Relevance};

    fn sample_result() -> SearchResult {
        let chunk = Chunk::new(
            "src/auth.rs",
            ChunkType::Function,
            "handle_auth",
            "fn handle_auth() {}",
            10,
            12,
        );
        let mut result = SearchResult::new(chunk, 0.873);
        result.relevance = Some(Relevance::High);
        result.preview = Some("fn handle_auth() {}".to_string());
        result
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("minimal"), OutputFormat::Minimal);
        assert_eq!(OutputFormat::parse("ndjson"), OutputFormat::Minimal);
        assert_eq!(OutputFormat::parse("whatever"), OutputFormat::Text);
    }

    #[test]
    fn test_format_results_text() {
        let output = format_results(&[sample_result()], OutputFormat::Text);
        assert!(output.contains("src/auth.rs:10"));
        assert!(output.contains("handle_auth"));
        assert!(output.contains("high"));

        let empty = format_results(&[], OutputFormat::Text);
        assert!(empty.contains("No results"));
    }

    #[test]
    fn test_format_results_minimal() {
        let output = format_results(&[sample_result()], OutputFormat::Minimal);
        let value: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(value["f"], "src/auth.rs");
        assert_eq!(value["n"], "handle_auth");
        assert_eq!(value["l"], 10);
        assert_eq!(value["r"], "high");
    }

    #[test]
    fn test_format_status() {
        let stats = IndexStats {
            files_indexed: 3,
            chunks_total: 42,
            embedding_model: "keyword-hash".to_string(),
            index_size_bytes: 8192,
            last_updated: 1_700_000_000,
        };
        let text = format_status(&stats, OutputFormat::Text);
        assert!(text.contains("42"));
        assert!(text.contains("keyword-hash"));

        let json = format_status(&stats, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["chunks_total"], 42);
    }

    #[test]
    fn test_format_error_json() {
        let err = Error::InvalidArgument {
            message: "empty query".to_string(),
        };
        let json = format_error(&err, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["error"].as_str().unwrap().contains("empty query"));
    }
}
