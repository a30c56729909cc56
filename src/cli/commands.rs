//! CLI command implementations.
//!
//! Contains the business logic for each CLI command: opening the store,
//! running the ingest pipeline, and dispatching searches.

#![allow(clippy::option_if_let_else)]

use crate::chunking::ChunkerFactory;
use crate::cli::output::{
    OutputFormat, format_calibration, format_results, format_status,
};
use crate::cli::parser::{Cli, Commands};
use crate::core::{CancelToken, ChunkType};
use crate::embedding::{Embedder, KeywordHashEmbedder};
use crate::error::{Error, Result};
use crate::io::FileReader;
use crate::search::{
    CalibrationOptions, FusionMode, HybridOptions, PrefilterOptions, Searcher, calibrate_with,
};
use crate::storage::{SearchOptions, SqliteStore, VectorStore};
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init => cmd_init(&db_path),
        Commands::Index { files, domain } => cmd_index(&db_path, files, domain.as_deref()),
        Commands::Search {
            query,
            top_k,
            threshold,
            chunk_type,
            path,
            hybrid,
            prefilter,
            mode,
            alpha,
            rrf_k,
        } => cmd_search(
            &db_path,
            query,
            &SearchArgs {
                top_k: *top_k,
                threshold: *threshold,
                chunk_type: chunk_type.as_deref(),
                path: path.as_deref(),
                hybrid: *hybrid,
                prefilter: *prefilter,
                mode,
                alpha: *alpha,
                rrf_k: *rrf_k,
            },
            format,
        ),
        Commands::Calibrate { seed } => cmd_calibrate(&db_path, *seed, format),
        Commands::Status => cmd_status(&db_path, format),
        Commands::Clear { yes } => cmd_clear(&db_path, *yes),
    }
}

/// Search-related CLI arguments, bundled to keep signatures flat.
struct SearchArgs<'a> {
    top_k: usize,
    threshold: f32,
    chunk_type: Option<&'a str>,
    path: Option<&'a str>,
    hybrid: bool,
    prefilter: bool,
    mode: &'a str,
    alpha: f32,
    rrf_k: u32,
}

fn default_embedder() -> KeywordHashEmbedder {
    KeywordHashEmbedder::default()
}

fn open_store(db_path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(db_path, default_embedder().dimensions())
}

fn cmd_init(db_path: &Path) -> Result<String> {
    let store = open_store(db_path)?;
    let location = store
        .path()
        .map_or_else(|| "(in-memory)".to_string(), |p| p.display().to_string());
    store.close()?;
    Ok(format!("Initialized index at {location}\n"))
}

fn cmd_index(db_path: &Path, files: &[PathBuf], domain: Option<&str>) -> Result<String> {
    let store = open_store(db_path)?;
    let embedder = default_embedder();
    let factory = ChunkerFactory::new();

    let mut output = String::new();
    let mut total_chunks = 0usize;

    for file in files {
        let file_path = file.to_string_lossy().to_string();
        let reader = FileReader::open(file)?;
        let content = reader.read_to_string()?;

        let mut chunks = factory.chunk(&file_path, &content)?;
        for chunk in &mut chunks {
            chunk.file_mtime = reader.mtime();
            if let Some(domain) = domain {
                chunk.domain = Some(domain.to_string());
            }
        }

        // Replace previous chunks of this file, then insert fresh rows.
        store.delete_by_file_path(&file_path)?;

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            store.create(chunk, embedding)?;
        }

        total_chunks += chunks.len();
        let _ = writeln!(output, "{file_path}: {} chunks", chunks.len());
    }

    let _ = writeln!(
        output,
        "Indexed {total_chunks} chunks from {} files",
        files.len()
    );
    store.close()?;
    Ok(output)
}

fn cmd_search(
    db_path: &Path,
    query: &str,
    args: &SearchArgs<'_>,
    format: OutputFormat,
) -> Result<String> {
    let chunk_type = args
        .chunk_type
        .map(ChunkType::from_str)
        .transpose()
        .map_err(Error::Chunking)?;

    let options = SearchOptions {
        top_k: args.top_k,
        threshold: args.threshold,
        chunk_type,
        path_filter: args.path.map(str::to_string),
        ..SearchOptions::default()
    };

    let store = Arc::new(open_store(db_path)?);
    let searcher = Searcher::new(store, Arc::new(default_embedder()));
    let cancel = CancelToken::new();

    let results = if args.hybrid {
        let mode = match args.mode.to_lowercase().as_str() {
            "weighted" => FusionMode::Weighted,
            _ => FusionMode::Rrf,
        };
        searcher.hybrid_search(
            query,
            &HybridOptions {
                search: options,
                mode,
                rrf_k: args.rrf_k,
                alpha: args.alpha,
            },
            &cancel,
        )?
    } else if args.prefilter {
        searcher.prefilter_search(
            query,
            &PrefilterOptions {
                search: options,
                prefilter_top_k: 0,
            },
            &cancel,
        )?
    } else {
        searcher.search(query, &options, &cancel)?
    };

    Ok(format_results(&results, format))
}

fn cmd_calibrate(db_path: &Path, seed: Option<u64>, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let embedder = default_embedder();

    let metadata = calibrate_with(
        &store,
        &embedder,
        &CalibrationOptions {
            seed,
            ..CalibrationOptions::default()
        },
        &CancelToken::new(),
    )?;
    store.set_calibration(&metadata)?;
    store.close()?;

    Ok(format_calibration(&metadata, format))
}

fn cmd_status(db_path: &Path, format: OutputFormat) -> Result<String> {
    let store = open_store(db_path)?;
    let stats = store.stats()?;
    store.close()?;
    Ok(format_status(&stats, format))
}

fn cmd_clear(db_path: &Path, yes: bool) -> Result<String> {
    if !yes {
        return Err(Error::InvalidArgument {
            message: "pass --yes to confirm clearing the index".to_string(),
        });
    }
    let store = open_store(db_path)?;
    store.clear()?;
    store.close()?;
    Ok("Index cleared\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_for(dir: &Path, args: &[&str]) -> Cli {
        let db_str = dir.join("index.db").to_string_lossy().to_string();
        let mut full = vec!["codesift", "--db-path", db_str.as_str()];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn test_init_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let output = execute(&cli_for(dir.path(), &["init"])).unwrap();
        assert!(output.contains("Initialized"));

        let output = execute(&cli_for(dir.path(), &["status"])).unwrap();
        assert!(output.contains("Chunks"));
    }

    #[test]
    fn test_index_and_search_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "the quick brown fox\njumps over the lazy dog\n").unwrap();

        let source_str = source.to_string_lossy().to_string();
        let output = execute(&cli_for(dir.path(), &["index", &source_str])).unwrap();
        assert!(output.contains("1 chunks"));

        let output = execute(&cli_for(dir.path(), &["search", "quick brown fox"])).unwrap();
        assert!(output.contains("notes.txt"));

        let output =
            execute(&cli_for(dir.path(), &["search", "quick brown fox", "--hybrid"])).unwrap();
        assert!(output.contains("notes.txt"));
    }

    #[test]
    fn test_reindex_replaces_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.md");
        std::fs::write(&source, "# One\n\nfirst body\n").unwrap();
        let source_str = source.to_string_lossy().to_string();

        execute(&cli_for(dir.path(), &["index", &source_str])).unwrap();
        std::fs::write(&source, "# One\n\nsecond body\n").unwrap();
        execute(&cli_for(dir.path(), &["index", &source_str])).unwrap();

        let output = execute(&cli_for(dir.path(), &["status", "--format", "json"])).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["chunks_total"], 1);
    }

    #[test]
    fn test_calibrate_requires_data() {
        let dir = tempfile::tempdir().unwrap();
        execute(&cli_for(dir.path(), &["init"])).unwrap();
        let err = execute(&cli_for(dir.path(), &["calibrate"])).unwrap_err();
        assert!(matches!(err, Error::Calibration(_)));
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        execute(&cli_for(dir.path(), &["init"])).unwrap();

        let err = execute(&cli_for(dir.path(), &["clear"])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        let output = execute(&cli_for(dir.path(), &["clear", "--yes"])).unwrap();
        assert!(output.contains("cleared"));
    }

    #[test]
    fn test_search_rejects_bad_type() {
        let dir = tempfile::tempdir().unwrap();
        execute(&cli_for(dir.path(), &["init"])).unwrap();
        let err = execute(&cli_for(
            dir.path(),
            &["search", "query", "--type", "widget"],
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Chunking(_)));
    }
}
