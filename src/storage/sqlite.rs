//! `SQLite` storage implementation.
//!
//! Chunks and embeddings persist in a single `SQLite` database (WAL mode,
//! FTS5 for the lexical capability). A read-write-locked in-memory mirror
//! of the rows serves the exact-cosine search path, so concurrent readers
//! never block each other; writers serialize on the connection.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit the target types.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::core::{
    CalibrationMetadata, Chunk, ChunkType, IndexStats, MemoryRetrieval, RetrievalLogEntry,
    RetrievalStats, SearchResult, now_unix, sort_results,
};
use crate::embedding::cosine_similarity;
use crate::error::{Result, StorageError};
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use crate::storage::traits::{
    LexicalSearchOptions, LexicalSearcher, ListOptions, SearchOptions, VectorStore,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

/// Sentinel path for an ephemeral in-memory store.
pub const MEMORY_PATH: &str = ":memory:";

/// A chunk with its embedding, as held by the in-memory mirror.
#[derive(Debug, Clone)]
struct StoredRow {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// SQLite-backed [`VectorStore`] with the [`LexicalSearcher`] capability.
///
/// # Examples
///
/// ```no_run
/// use codesift::storage::{SqliteStore, VectorStore};
///
/// let store = SqliteStore::open(".codesift/index.db", 1024).unwrap();
/// let stats = store.stats().unwrap();
/// assert_eq!(stats.chunks_total, 0);
/// ```
pub struct SqliteStore {
    /// Connection used by writers and metadata reads. `None` once closed.
    conn: Mutex<Option<Connection>>,
    /// In-memory mirror of all rows, serving reader-parallel search.
    rows: RwLock<BTreeMap<String, StoredRow>>,
    /// Fast closed flag so read paths avoid the connection mutex.
    closed: AtomicBool,
    /// Embedding dimensions, fixed for the lifetime of the store.
    dimensions: usize,
    /// Path to the database file (None for in-memory).
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates an index database at the given path.
    ///
    /// Parent directories are created when absent. The [`MEMORY_PATH`]
    /// sentinel opens an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, migrated, or its
    /// rows loaded.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == MEMORY_PATH {
            return Self::in_memory(dimensions);
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Database(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        // WAL mode for better concurrent access (returns result, use query_row)
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Self::from_connection(conn, Some(path.to_path_buf()), dimensions)
    }

    /// Creates an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        Self::from_connection(conn, None, dimensions)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        dimensions: usize,
    ) -> Result<Self> {
        init_schema(&conn)?;
        let rows = load_rows(&conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            rows: RwLock::new(rows),
            closed: AtomicBool::new(false),
            dimensions,
            path,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the embedding dimensions the store was opened with.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed.into());
        }
        Ok(())
    }

    /// Runs a closure against the live connection, failing when closed.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    /// Runs a closure against a mutable connection (for transactions).
    fn with_conn_mut<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        f(conn)
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            }
            .into());
        }
        Ok(())
    }

    fn upsert_row(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        self.check_dimensions(embedding)?;
        let blob = encode_embedding(embedding);
        let now = now_unix();

        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO chunks (
                    id, file_path, chunk_type, name, signature, content,
                    start_line, end_line, language, domain, file_mtime,
                    embedding, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
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
                    file_mtime = excluded.file_mtime,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
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
                    blob,
                    now,
                    now,
                ],
            )
            .map_err(StorageError::from)?;
            touch_last_updated(conn, now)?;
            Ok(())
        })?;

        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                chunk.id.clone(),
                StoredRow {
                    chunk: chunk.clone(),
                    embedding: embedding.to_vec(),
                },
            );
        Ok(())
    }
}

impl VectorStore for SqliteStore {
    fn create(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        self.upsert_row(chunk, embedding)
    }

    fn read(&self, id: &str) -> Result<(Chunk, Vec<f32>)> {
        self.ensure_open()?;
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(id)
            .map(|row| (row.chunk.clone(), row.embedding.clone()))
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() }.into())
    }

    fn update(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        self.ensure_open()?;
        {
            let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
            if !rows.contains_key(&chunk.id) {
                return Err(StorageError::NotFound {
                    id: chunk.id.clone(),
                }
                .into());
            }
        }
        self.upsert_row(chunk, embedding)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM chunks WHERE id = ?", params![id])
                .map_err(StorageError::from)?;
            touch_last_updated(conn, now_unix())?;
            Ok(())
        })?;
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }

    fn delete_by_file_path(&self, file_path: &str) -> Result<usize> {
        let deleted = self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM chunks WHERE file_path = ?", params![file_path])
                .map_err(StorageError::from)?;
            touch_last_updated(conn, now_unix())?;
            Ok(deleted)
        })?;
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, row| row.chunk.file_path != file_path);
        Ok(deleted)
    }

    fn list(&self, options: &ListOptions) -> Result<Vec<Chunk>> {
        self.ensure_open()?;
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);

        let mut chunks: Vec<Chunk> = rows
            .values()
            .filter(|row| {
                options
                    .chunk_type
                    .is_none_or(|t| row.chunk.chunk_type == t)
                    && options
                        .path_filter
                        .as_deref()
                        .is_none_or(|p| row.chunk.file_path.contains(p))
            })
            .map(|row| row.chunk.clone())
            .collect();

        chunks.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then_with(|| a.start_line.cmp(&b.start_line))
        });
        if options.limit > 0 {
            chunks.truncate(options.limit);
        }
        Ok(chunks)
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM chunks", [])
                .map_err(StorageError::from)?;
            touch_last_updated(conn, now_unix())?;
            Ok(())
        })?;
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn stats(&self) -> Result<IndexStats> {
        self.ensure_open()?;

        let (files_indexed, chunks_total) = {
            let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
            let files: HashSet<&str> = rows.values().map(|r| r.chunk.file_path.as_str()).collect();
            (files.len(), rows.len())
        };

        let embedding_model = self
            .calibration()?
            .map(|c| c.embedding_model)
            .unwrap_or_default();

        let last_updated = self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM metadata WHERE key = 'last_updated'",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StorageError::from)?;
            Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
        })?;

        let index_size_bytes = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok().map(|m| m.len()))
            .unwrap_or(0);

        Ok(IndexStats {
            files_indexed,
            chunks_total,
            embedding_model,
            index_size_bytes,
            last_updated,
        })
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.ensure_open()?;
        self.check_dimensions(query)?;

        let id_filter: Option<HashSet<&str>> = if options.chunk_ids.is_empty() {
            None
        } else {
            Some(options.chunk_ids.iter().map(String::as_str).collect())
        };

        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut results: Vec<SearchResult> = rows
            .values()
            .filter(|row| {
                options
                    .chunk_type
                    .is_none_or(|t| row.chunk.chunk_type == t)
                    && options
                        .path_filter
                        .as_deref()
                        .is_none_or(|p| row.chunk.file_path.contains(p))
                    && id_filter
                        .as_ref()
                        .is_none_or(|ids| ids.contains(row.chunk.id.as_str()))
            })
            .filter_map(|row| {
                let score = cosine_similarity(query, &row.embedding);
                (score >= options.threshold)
                    .then(|| SearchResult::new(row.chunk.clone(), score))
            })
            .collect();
        drop(rows);

        sort_results(&mut results);
        if options.top_k > 0 {
            results.truncate(options.top_k);
        }
        Ok(results)
    }

    fn calibration(&self) -> Result<Option<CalibrationMetadata>> {
        self.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM calibration WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(StorageError::from)?;

            match data {
                Some(json) => {
                    let metadata = serde_json::from_str(&json).map_err(StorageError::from)?;
                    Ok(Some(metadata))
                }
                None => Ok(None),
            }
        })
    }

    fn set_calibration(&self, metadata: &CalibrationMetadata) -> Result<()> {
        let data = serde_json::to_string(metadata).map_err(StorageError::from)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO calibration (id, data, updated_at) VALUES (1, ?, ?)",
                params![data, now_unix()],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    fn track_memory_retrieval(&self, memory_id: &str, query: &str, score: f32) -> Result<()> {
        self.with_conn(|conn| {
            record_retrieval(conn, memory_id, query, score, now_unix())?;
            Ok(())
        })
    }

    fn track_memory_retrieval_batch(&self, retrievals: &[MemoryRetrieval]) -> Result<()> {
        if retrievals.is_empty() {
            return self.ensure_open();
        }
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().map_err(StorageError::from)?;
            let now = now_unix();
            for retrieval in retrievals {
                record_retrieval(&tx, &retrieval.memory_id, &retrieval.query, retrieval.score, now)?;
            }
            tx.commit().map_err(StorageError::from)?;
            Ok(())
        })
    }

    fn memory_stats(&self, memory_id: &str) -> Result<Option<RetrievalStats>> {
        self.with_conn(|conn| {
            conn.query_row(
                r"
                SELECT memory_id, retrieval_count, last_retrieved, last_query, last_score, status
                FROM memory_stats WHERE memory_id = ?
            ",
                params![memory_id],
                retrieval_stats_from_row,
            )
            .optional()
            .map_err(StorageError::from)
            .map_err(Into::into)
        })
    }

    fn all_memory_stats(&self) -> Result<Vec<RetrievalStats>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r"
                    SELECT memory_id, retrieval_count, last_retrieved, last_query, last_score, status
                    FROM memory_stats ORDER BY retrieval_count DESC, memory_id ASC
                ",
                )
                .map_err(StorageError::from)?;

            let stats = stmt
                .query_map([], retrieval_stats_from_row)
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(stats)
        })
    }

    fn memory_retrieval_history(
        &self,
        memory_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r"
                    SELECT id, memory_id, query, score, timestamp
                    FROM retrieval_log WHERE memory_id = ?
                    ORDER BY timestamp DESC, id DESC LIMIT ?
                ",
                )
                .map_err(StorageError::from)?;

            let limit = if limit == 0 { -1 } else { limit as i64 };
            let entries = stmt
                .query_map(params![memory_id, limit], |row| {
                    Ok(RetrievalLogEntry {
                        id: row.get(0)?,
                        memory_id: row.get(1)?,
                        query: row.get(2)?,
                        score: row.get::<_, f64>(3)? as f32,
                        timestamp: row.get(4)?,
                    })
                })
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(entries)
        })
    }

    fn update_memory_stats_status(&self, memory_id: &str, status: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE memory_stats SET status = ? WHERE memory_id = ?",
                    params![status, memory_id],
                )
                .map_err(StorageError::from)?;
            if changed == 0 {
                return Err(StorageError::NotFound {
                    id: memory_id.to_string(),
                }
                .into());
            }
            Ok(())
        })
    }

    fn prune_memory_retrieval_log(&self, max_age_days: u32) -> Result<usize> {
        self.with_conn(|conn| {
            let cutoff = now_unix() - i64::from(max_age_days) * 86_400;
            let deleted = conn
                .execute(
                    "DELETE FROM retrieval_log WHERE timestamp < ?",
                    params![cutoff],
                )
                .map_err(StorageError::from)?;
            Ok(deleted)
        })
    }

    fn as_lexical(&self) -> Option<&dyn LexicalSearcher> {
        Some(self)
    }
}

impl LexicalSearcher for SqliteStore {
    fn lexical_search(
        &self,
        query: &str,
        options: &LexicalSearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.ensure_open()?;
        let Some(fts_query) = build_fts_query(query) else {
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
                    let chunk = chunk_from_row(row)?;
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
}

/// Serializes an embedding into the on-disk blob format: a 4-byte
/// little-endian `u32` element count followed by that many little-endian
/// IEEE-754 `f32` values.
#[must_use]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + embedding.len() * 4);
    bytes.extend_from_slice(&(embedding.len() as u32).to_le_bytes());
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserializes an embedding blob. Round-tripping is bit-exact.
///
/// # Errors
///
/// Returns [`StorageError::CorruptBlob`] when the byte length does not
/// match the declared element count.
pub fn decode_embedding(bytes: &[u8]) -> std::result::Result<Vec<f32>, StorageError> {
    if bytes.len() < 4 {
        return Err(StorageError::CorruptBlob(format!(
            "blob too short: {} bytes",
            bytes.len()
        )));
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload = &bytes[4..];
    if payload.len() != count * 4 {
        return Err(StorageError::CorruptBlob(format!(
            "expected {} elements ({} bytes), got {} bytes",
            count,
            count * 4,
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Converts whitespace-separated terms into a forgiving OR query. Each
/// term is quoted so FTS5 operators in user input are treated literally.
/// Returns `None` when no terms survive.
pub(crate) fn build_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(terms.join(" OR "))
}

fn init_schema(conn: &Connection) -> Result<()> {
    let is_init: i64 = conn
        .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
        .map_err(StorageError::from)?;

    if is_init == 0 {
        conn.execute_batch(SCHEMA_SQL).map_err(StorageError::from)?;
        set_schema_version(conn, CURRENT_SCHEMA_VERSION)?;
        return Ok(());
    }

    let current: Option<u32> = conn
        .query_row(GET_VERSION_SQL, [], |row| row.get::<_, String>(0))
        .optional()
        .map_err(StorageError::from)?
        .and_then(|v| v.parse().ok());

    if let Some(current) = current
        && current < CURRENT_SCHEMA_VERSION
    {
        for migration in crate::storage::schema::get_migrations_from(current) {
            conn.execute_batch(migration.sql)
                .map_err(|e| StorageError::Migration(e.to_string()))?;
        }
        set_schema_version(conn, CURRENT_SCHEMA_VERSION)?;
    }
    Ok(())
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(SET_VERSION_SQL, params![version.to_string()])
        .map_err(StorageError::from)?;
    Ok(())
}

fn touch_last_updated(conn: &Connection, now: i64) -> std::result::Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value, updated_at) VALUES ('last_updated', ?, ?)",
        params![now.to_string(), now],
    )?;
    Ok(())
}

fn record_retrieval(
    conn: &Connection,
    memory_id: &str,
    query: &str,
    score: f32,
    now: i64,
) -> std::result::Result<(), StorageError> {
    conn.execute(
        r"
        INSERT INTO memory_stats (memory_id, retrieval_count, last_retrieved, last_query, last_score, status)
        VALUES (?, 1, ?, ?, ?, 'active')
        ON CONFLICT(memory_id) DO UPDATE SET
            retrieval_count = retrieval_count + 1,
            last_retrieved = excluded.last_retrieved,
            last_query = excluded.last_query,
            last_score = excluded.last_score
    ",
        params![memory_id, now, query, f64::from(score)],
    )?;
    conn.execute(
        "INSERT INTO retrieval_log (memory_id, query, score, timestamp) VALUES (?, ?, ?, ?)",
        params![memory_id, query, f64::from(score), now],
    )?;
    Ok(())
}

fn retrieval_stats_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RetrievalStats> {
    Ok(RetrievalStats {
        memory_id: row.get(0)?,
        retrieval_count: row.get::<_, i64>(1)? as u64,
        last_retrieved: row.get(2)?,
        last_query: row.get(3)?,
        last_score: row.get::<_, f64>(4)? as f32,
        status: row.get(5)?,
    })
}

/// Rebuilds a chunk from the canonical column order
/// `(id, file_path, chunk_type, name, signature, content, start_line,
/// end_line, language, domain, file_mtime, ...)`.
pub(crate) fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let type_name: String = row.get(2)?;
    let chunk_type = ChunkType::from_str(&type_name).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Chunk {
        id: row.get(0)?,
        file_path: row.get(1)?,
        chunk_type,
        name: row.get(3)?,
        signature: row.get(4)?,
        content: row.get(5)?,
        start_line: row.get::<_, i64>(6)? as u32,
        end_line: row.get::<_, i64>(7)? as u32,
        language: row.get(8)?,
        domain: row.get(9)?,
        file_mtime: row.get(10)?,
    })
}

fn load_rows(conn: &Connection) -> Result<BTreeMap<String, StoredRow>> {
    let mut stmt = conn
        .prepare(
            r"
            SELECT id, file_path, chunk_type, name, signature, content,
                   start_line, end_line, language, domain, file_mtime, embedding
            FROM chunks
        ",
        )
        .map_err(StorageError::from)?;

    let loaded = stmt
        .query_map([], |row| {
            let chunk = chunk_from_row(row)?;
            let blob: Vec<u8> = row.get(11)?;
            Ok((chunk, blob))
        })
        .map_err(StorageError::from)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StorageError::from)?;

    let mut rows = BTreeMap::new();
    for (chunk, blob) in loaded {
        let embedding = decode_embedding(&blob)?;
        rows.insert(chunk.id.clone(), StoredRow { chunk, embedding });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChunkBuilder;

    fn store() -> SqliteStore {
        SqliteStore::in_memory(4).unwrap()
    }

    fn chunk(path: &str, name: &str, line: u32, content: &str) -> Chunk {
        Chunk::new(path, ChunkType::Function, name, content, line, line + 2)
    }

    #[test]
    fn test_create_read_round_trip() {
        let store = store();
        let c = chunk("src/a.rs", "alpha", 1, "fn alpha() {}");
        let v = vec![0.1, 0.2, 0.3, 0.4];

        store.create(&c, &v).unwrap();
        let (back, emb) = store.read(&c.id).unwrap();
        assert_eq!(back, c);
        assert_eq!(emb, v);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let store = store();
        let err = store.read("0000000000000000").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Storage(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_create_dimension_mismatch() {
        let store = store();
        let c = chunk("src/a.rs", "alpha", 1, "fn alpha() {}");
        let err = store.create(&c, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Storage(StorageError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_update_in_place_keeps_id() {
        let store = store();
        let mut c = chunk("src/a.rs", "alpha", 1, "fn alpha() {}");
        store.create(&c, &[1.0, 0.0, 0.0, 0.0]).unwrap();

        c.content = "fn alpha() { /* new body */ }".to_string();
        store.update(&c, &[0.0, 1.0, 0.0, 0.0]).unwrap();

        let (back, emb) = store.read(&c.id).unwrap();
        assert_eq!(back.content, c.content);
        assert_eq!(emb, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = store();
        let c = chunk("src/a.rs", "alpha", 1, "fn alpha() {}");
        let err = store.update(&c, &[1.0, 0.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Storage(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_by_file_path_exact_match_only() {
        let store = store();
        let v = vec![1.0, 0.0, 0.0, 0.0];
        store.create(&chunk("src/a.rs", "a1", 1, "x"), &v).unwrap();
        store.create(&chunk("src/a.rs", "a2", 9, "y"), &v).unwrap();
        store.create(&chunk("src/ab.rs", "b", 1, "z"), &v).unwrap();

        let deleted = store.delete_by_file_path("src/a.rs").unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.list(&ListOptions::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file_path, "src/ab.rs");
    }

    #[test]
    fn test_clear_empties_search() {
        let store = store();
        store
            .create(&chunk("src/a.rs", "a", 1, "x"), &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        store.clear().unwrap();

        let results = store
            .search(&[1.0, 0.0, 0.0, 0.0], &SearchOptions::default())
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(store.stats().unwrap().chunks_total, 0);
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = store();
        let c = chunk("src/a.rs", "a", 1, "x");
        store.create(&c, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        store.close().unwrap();

        let closed = |err: crate::Error| {
            assert!(matches!(err, crate::Error::Storage(StorageError::Closed)));
        };
        closed(store.read(&c.id).unwrap_err());
        closed(store.create(&c, &[1.0, 0.0, 0.0, 0.0]).unwrap_err());
        closed(
            store
                .search(&[1.0, 0.0, 0.0, 0.0], &SearchOptions::default())
                .unwrap_err(),
        );
        closed(store.stats().unwrap_err());
        closed(store.calibration().unwrap_err());

        // Closing twice is a no-op.
        store.close().unwrap();
    }

    #[test]
    fn test_search_ordering_threshold_topk() {
        let store = store();
        store
            .create(&chunk("a.rs", "exact", 1, "m"), &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        store
            .create(&chunk("b.rs", "close", 1, "m"), &[0.9, 0.1, 0.0, 0.0])
            .unwrap();
        store
            .create(&chunk("c.rs", "far", 1, "m"), &[0.0, 1.0, 0.0, 0.0])
            .unwrap();

        let results = store
            .search(&[1.0, 0.0, 0.0, 0.0], &SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

        let results = store
            .search(
                &[1.0, 0.0, 0.0, 0.0],
                &SearchOptions {
                    threshold: 0.5,
                    ..SearchOptions::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score >= 0.5));

        let results = store
            .search(&[1.0, 0.0, 0.0, 0.0], &SearchOptions::top_k(1))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.name, "exact");
    }

    #[test]
    fn test_search_structural_filters() {
        let store = store();
        let v = vec![1.0, 0.0, 0.0, 0.0];
        let mut s = ChunkBuilder::new("src/db.rs", "Conn")
            .chunk_type(ChunkType::Struct)
            .content("struct Conn;")
            .lines(1, 1)
            .build();
        s.signature = Some("struct Conn".to_string());
        store.create(&s, &v).unwrap();
        store
            .create(&chunk("src/db.rs", "open", 5, "fn open() {}"), &v)
            .unwrap();
        store
            .create(&chunk("lib/util.rs", "misc", 1, "fn misc() {}"), &v)
            .unwrap();

        let results = store
            .search(
                &v,
                &SearchOptions {
                    chunk_type: Some(ChunkType::Struct),
                    ..SearchOptions::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.name, "Conn");

        let results = store
            .search(
                &v,
                &SearchOptions {
                    path_filter: Some("src/".to_string()),
                    ..SearchOptions::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_chunk_id_restriction() {
        let store = store();
        let v = vec![1.0, 0.0, 0.0, 0.0];
        let c1 = chunk("a.rs", "one", 1, "x");
        let c2 = chunk("b.rs", "two", 1, "x");
        let c3 = chunk("c.rs", "three", 1, "x");
        for c in [&c1, &c2, &c3] {
            store.create(c, &v).unwrap();
        }

        let results = store
            .search(
                &v,
                &SearchOptions {
                    chunk_ids: vec![c1.id.clone(), c3.id.clone()],
                    ..SearchOptions::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.chunk.id == c1.id || r.chunk.id == c3.id));
    }

    #[test]
    fn test_search_query_dimension_mismatch() {
        let store = store();
        let err = store.search(&[1.0], &SearchOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Storage(StorageError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_embedding_codec_round_trip() {
        let original = vec![0.1f32, -2.5, 3.75, f32::MIN_POSITIVE, 0.0];
        let blob = encode_embedding(&original);
        assert_eq!(blob.len(), 4 + original.len() * 4);
        let decoded = decode_embedding(&blob).unwrap();
        assert_eq!(decoded, original);
        // Bit-exact round trip.
        for (a, b) in original.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_embedding_codec_rejects_corrupt_blobs() {
        assert!(decode_embedding(&[1, 2]).is_err());

        let mut blob = encode_embedding(&[1.0, 2.0]);
        blob.pop();
        assert!(decode_embedding(&blob).is_err());
    }

    #[test]
    fn test_calibration_upsert_and_read() {
        let store = store();
        assert!(store.calibration().unwrap().is_none());

        let meta = CalibrationMetadata {
            embedding_model: "embed-v3".to_string(),
            calibration_date: 1_700_000_000,
            perfect_match_score: 1.0,
            baseline_score: 0.1,
            score_range: 0.9,
            high_threshold: 0.73,
            medium_threshold: 0.46,
            low_threshold: 0.235,
        };
        store.set_calibration(&meta).unwrap();
        assert_eq!(store.calibration().unwrap().unwrap(), meta);

        let newer = CalibrationMetadata {
            embedding_model: "embed-v4".to_string(),
            ..meta
        };
        store.set_calibration(&newer).unwrap();
        assert_eq!(
            store.calibration().unwrap().unwrap().embedding_model,
            "embed-v4"
        );
    }

    #[test]
    fn test_memory_retrieval_tracking() {
        let store = store();
        store.track_memory_retrieval("mem-1", "first query", 0.8).unwrap();
        store.track_memory_retrieval("mem-1", "second query", 0.6).unwrap();
        store.track_memory_retrieval("mem-2", "other", 0.4).unwrap();

        let stats = store.memory_stats("mem-1").unwrap().unwrap();
        assert_eq!(stats.retrieval_count, 2);
        assert_eq!(stats.last_query, "second query");
        assert!((stats.last_score - 0.6).abs() < 1e-6);
        assert_eq!(stats.status, "active");

        assert!(store.memory_stats("unknown").unwrap().is_none());

        let all = store.all_memory_stats().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].memory_id, "mem-1"); // most retrieved first

        let history = store.memory_retrieval_history("mem-1", 1).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "second query");

        let history = store.memory_retrieval_history("mem-1", 0).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_memory_retrieval_batch() {
        let store = store();
        let batch = vec![
            MemoryRetrieval {
                memory_id: "m1".to_string(),
                query: "q1".to_string(),
                score: 0.9,
            },
            MemoryRetrieval {
                memory_id: "m1".to_string(),
                query: "q2".to_string(),
                score: 0.7,
            },
            MemoryRetrieval {
                memory_id: "m2".to_string(),
                query: "q3".to_string(),
                score: 0.5,
            },
        ];
        store.track_memory_retrieval_batch(&batch).unwrap();

        assert_eq!(store.memory_stats("m1").unwrap().unwrap().retrieval_count, 2);
        assert_eq!(store.memory_stats("m2").unwrap().unwrap().retrieval_count, 1);

        store.track_memory_retrieval_batch(&[]).unwrap();
    }

    #[test]
    fn test_update_memory_stats_status() {
        let store = store();
        store.track_memory_retrieval("m1", "q", 0.5).unwrap();
        store.update_memory_stats_status("m1", "archived").unwrap();
        assert_eq!(store.memory_stats("m1").unwrap().unwrap().status, "archived");

        let err = store.update_memory_stats_status("nope", "archived").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Storage(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_prune_memory_retrieval_log() {
        let store = store();
        store.track_memory_retrieval("m1", "q", 0.5).unwrap();

        // Fresh entries survive a generous window.
        assert_eq!(store.prune_memory_retrieval_log(30).unwrap(), 0);
        // A zero-day window prunes everything older than "now".
        let _pruned = store.prune_memory_retrieval_log(0).unwrap();
        let history = store.memory_retrieval_history("m1", 0).unwrap();
        assert!(history.len() <= 1);
    }

    #[test]
    fn test_lexical_search_identifier_match() {
        let store = store();
        let v = vec![1.0, 0.0, 0.0, 0.0];
        store
            .create(
                &chunk("src/auth.rs", "handleAuth", 1, "fn handleAuth(req: Request) {}"),
                &v,
            )
            .unwrap();
        store
            .create(&chunk("src/db.rs", "open", 1, "fn open() { connect() }"), &v)
            .unwrap();

        let results = store
            .lexical_search("handleAuth", &LexicalSearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.name, "handleAuth");
        assert!(results[0].score > 0.0);

        // Case-insensitive.
        let results = store
            .lexical_search("HANDLEAUTH", &LexicalSearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_lexical_search_filters_and_topk() {
        let store = store();
        let v = vec![1.0, 0.0, 0.0, 0.0];
        store
            .create(&chunk("src/a.rs", "parse_json", 1, "parses json input"), &v)
            .unwrap();
        store
            .create(&chunk("lib/b.rs", "parse_yaml", 1, "parses yaml input"), &v)
            .unwrap();

        let results = store
            .lexical_search(
                "parses",
                &LexicalSearchOptions {
                    path_filter: Some("src/".to_string()),
                    ..LexicalSearchOptions::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.file_path, "src/a.rs");

        let results = store
            .lexical_search(
                "parses",
                &LexicalSearchOptions {
                    top_k: 1,
                    ..LexicalSearchOptions::default()
                },
            )
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_lexical_search_empty_query() {
        let store = store();
        let results = store
            .lexical_search("   ", &LexicalSearchOptions::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_lexical_capability_probe() {
        let store = store();
        assert!(store.as_lexical().is_some());
    }

    #[test]
    fn test_fts_query_building() {
        assert_eq!(build_fts_query("CLI tool?"), Some("\"CLI\" OR \"tool?\"".to_string()));
        assert_eq!(build_fts_query(""), None);
        assert_eq!(
            build_fts_query("say \"hi\""),
            Some("\"say\" OR \"\"\"hi\"\"\"".to_string())
        );
    }

    #[test]
    fn test_reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let c = chunk("src/a.rs", "alpha", 1, "fn alpha() {}");
        let v = vec![0.25, -0.5, 1.5, 0.0];

        {
            let store = SqliteStore::open(&path, 4).unwrap();
            store.create(&c, &v).unwrap();
            store.close().unwrap();
        }

        let store = SqliteStore::open(&path, 4).unwrap();
        let (back, emb) = store.read(&c.id).unwrap();
        assert_eq!(back, c);
        assert_eq!(emb, v);
        assert_eq!(store.stats().unwrap().chunks_total, 1);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/index.db");
        let store = SqliteStore::open(&path, 4).unwrap();
        assert!(path.exists());
        drop(store);
    }

    #[test]
    fn test_memory_path_sentinel() {
        let store = SqliteStore::open(MEMORY_PATH, 4).unwrap();
        assert!(store.path().is_none());
    }

    #[test]
    fn test_stats_counts_distinct_files() {
        let store = store();
        let v = vec![1.0, 0.0, 0.0, 0.0];
        store.create(&chunk("a.rs", "f1", 1, "x"), &v).unwrap();
        store.create(&chunk("a.rs", "f2", 9, "y"), &v).unwrap();
        store.create(&chunk("b.rs", "f3", 1, "z"), &v).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.files_indexed, 2);
        assert_eq!(stats.chunks_total, 3);
        assert!(stats.last_updated > 0);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        use std::sync::Arc;

        let store = Arc::new(store());
        let v = vec![1.0, 0.0, 0.0, 0.0];
        for i in 0..20 {
            store
                .create(&chunk("seed.rs", &format!("seed{i}"), i + 1, "body"), &v)
                .unwrap();
        }

        let mut handles = Vec::new();
        for worker in 0..4 {
            let store = Arc::clone(&store);
            let v = v.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    if worker % 2 == 0 {
                        let results = store.search(&v, &SearchOptions::top_k(5)).unwrap();
                        assert!(!results.is_empty());
                    } else {
                        let c = chunk(
                            &format!("w{worker}.rs"),
                            &format!("fn{i}"),
                            i + 1,
                            "body",
                        );
                        store.create(&c, &v).unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.stats().unwrap().chunks_total, 20 + 2 * 25);
    }
}
