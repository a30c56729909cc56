//! Standalone full-text chunk index.
//!
//! [`LexicalIndex`] persists chunks (no embeddings) in an FTS5-backed
//! `SQLite` file and serves ranked keyword search. The on-disk file name is
//! derived from a sanitized collection name, so arbitrary collection
//! labels map onto safe file names.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::core::{Chunk, SearchResult};
use crate::error::{Result, StorageError};
use crate::storage::traits::{LexicalSearchOptions, LexicalSearcher};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// File suffix for lexical index databases.
const LEXICAL_FILE_SUFFIX: &str = ".lex.db";

/// Schema for the standalone lexical index.
const LEXICAL_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    chunk_type TEXT NOT NULL,
    name TEXT NOT NULL,
    signature TEXT,
    content TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    language TEXT NOT NULL,
    domain TEXT,
    file_mtime INTEGER
);

CREATE INDEX IF NOT EXISTS idx_lex_chunks_file_path ON chunks(file_path);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    name,
    content,
    content='chunks',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS lex_chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, name, content) VALUES (new.rowid, new.name, new.content);
END;

CREATE TRIGGER IF NOT EXISTS lex_chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, name, content)
    VALUES('delete', old.rowid, old.name, old.content);
END;

CREATE TRIGGER IF NOT EXISTS lex_chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, name, content)
    VALUES('delete', old.rowid, old.name, old.content);
    INSERT INTO chunks_fts(rowid, name, content) VALUES (new.rowid, new.name, new.content);
END;
";

/// Sanitizes a collection name for use in a file name.
///
/// Characters outside `[A-Za-z0-9_-]` are stripped; an empty result
/// becomes `"default"`.
#[must_use]
pub fn sanitize_collection_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if sanitized.is_empty() {
        "default".to_string()
    } else {
        sanitized
    }
}

/// FTS5-backed full-text index over chunks.
///
/// Same CRUD discipline as the vector store, restricted to chunks. Scores
/// are negated BM25 (higher is more relevant) and stable across identical
/// inputs.
pub struct LexicalIndex {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl LexicalIndex {
    /// Opens (or creates) the index for a collection inside a directory.
    ///
    /// The file name is `<sanitized-collection>.lex.db`. Parent directories
    /// are created when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_in_dir<P: AsRef<Path>>(dir: P, collection: &str) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| StorageError::Database(e.to_string()))?;
        }
        let file = format!("{}{LEXICAL_FILE_SUFFIX}", sanitize_collection_name(collection));
        let path = dir.join(file);

        let conn = Connection::open(&path).map_err(StorageError::from)?;
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        conn.execute_batch(LEXICAL_SCHEMA_SQL)
            .map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: Some(path),
        })
    }

    /// Creates an ephemeral in-memory index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch(LEXICAL_SCHEMA_SQL)
            .map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: None,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    fn with_conn_mut<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        f(conn)
    }

    /// Indexes one chunk, replacing any row with the same ID.
    ///
    /// # Errors
    ///
    /// Fails if the index is closed or the write fails.
    pub fn index_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.with_conn(|conn| {
            insert_chunk(conn, chunk)?;
            Ok(())
        })
    }

    /// Indexes a batch of chunks in one transaction.
    ///
    /// # Errors
    ///
    /// Fails if the index is closed or the transaction fails; no partial
    /// batch is applied.
    pub fn index_batch(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return self.with_conn(|_| Ok(()));
        }
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(StorageError::from)?;
            for chunk in chunks {
                insert_chunk(&tx, chunk)?;
            }
            tx.commit().map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Removes one chunk by ID. Removing an unknown ID is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the index is closed or the write fails.
    pub fn delete_chunk(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM chunks WHERE id = ?", params![id])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Removes every chunk with the given file path. Returns the number of
    /// removed rows.
    ///
    /// # Errors
    ///
    /// Fails if the index is closed or the write fails.
    pub fn delete_by_file_path(&self, file_path: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM chunks WHERE file_path = ?", params![file_path])
                .map_err(StorageError::from)?;
            Ok(deleted)
        })
    }

    /// Ranked keyword search.
    ///
    /// # Errors
    ///
    /// Fails if the index is closed or the query fails.
    pub fn search(
        &self,
        query: &str,
        options: &LexicalSearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let Some(fts_query) = super::sqlite::build_fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut results = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r"
                    SELECT c.id, c.file_path, c.chunk_type, c.name, c.signature, c.content,
                           c.start_line, c.end_line, c.language, c.domain, c.file_mtime,
                           -bm25(chunks_fts) AS score
                    FROM chunks_fts
                    JOIN chunks c ON c.rowid = chunks_fts.rowid
                    WHERE chunks_fts MATCH ?
                    ORDER BY score DESC, c.id ASC
                ",
                )
                .map_err(StorageError::from)?;

            let results = stmt
                .query_map(params![fts_query], |row| {
                    let chunk = super::sqlite::chunk_from_row(row)?;
                    let score: f64 = row.get(11)?;
                    Ok(SearchResult::new(chunk, score as f32))
                })
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(results)
        })?;

        results.retain(|result| {
            options
                .chunk_type
                .is_none_or(|t| result.chunk.chunk_type == t)
                && options
                    .path_filter
                    .as_deref()
                    .is_none_or(|p| result.chunk.file_path.contains(p))
        });
        if options.top_k > 0 {
            results.truncate(options.top_k);
        }
        Ok(results)
    }

    /// Removes every chunk.
    ///
    /// # Errors
    ///
    /// Fails if the index is closed or the write fails.
    pub fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM chunks", [])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Closes the index. Further operations fail with a closed error;
    /// closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Infallible; part of the shared storage contract.
    pub fn close(&self) -> Result<()> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

impl LexicalSearcher for LexicalIndex {
    fn lexical_search(
        &self,
        query: &str,
        options: &LexicalSearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.search(query, options)
    }
}

fn insert_chunk(conn: &Connection, chunk: &Chunk) -> std::result::Result<(), StorageError> {
    conn.execute(
        r"
        INSERT INTO chunks (
            id, file_path, chunk_type, name, signature, content,
            start_line, end_line, language, domain, file_mtime
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            file_path = excluded.file_path,
            chunk_type = excluded.chunk_type,
            name = excluded.name,
            signature = excluded.signature,
            content = excluded.content,
            start_line = excluded.start_line,
            end_line = excluded.end_line,
            language = excluded.language,
            domain = excluded.domain,
            file_mtime = excluded.file_mtime
    ",
        params![
            chunk.id,
            chunk.file_path,
            chunk.chunk_type.as_str(),
            chunk.name,
            chunk.signature,
            chunk.content,
            i64::from(chunk.start_line),
            i64::from(chunk.end_line),
            chunk.language,
            chunk.domain,
            chunk.file_mtime,
        ],
    )?;
    Ok(())
}
