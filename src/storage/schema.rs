//! Database schema definitions.
//!
//! Contains SQL schema and migration logic for the codesift `SQLite`
//! index database.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexed chunks with their embeddings
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,        -- 16-hex deterministic chunk ID
    file_path TEXT NOT NULL,
    chunk_type TEXT NOT NULL,
    name TEXT NOT NULL,
    signature TEXT,
    content TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    language TEXT NOT NULL,
    domain TEXT,
    file_mtime INTEGER,
    embedding BLOB NOT NULL,    -- length-prefixed little-endian f32 array
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Index for per-file deletion on re-index
CREATE INDEX IF NOT EXISTS idx_chunks_file_path ON chunks(file_path);

-- Index for kind-filtered listings
CREATE INDEX IF NOT EXISTS idx_chunks_type ON chunks(chunk_type);

-- Calibration record (singleton, JSON payload)
CREATE TABLE IF NOT EXISTS calibration (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Metadata key-value store for extensibility
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Memory usage counters (v2)
CREATE TABLE IF NOT EXISTS memory_stats (
    memory_id TEXT PRIMARY KEY,
    retrieval_count INTEGER NOT NULL DEFAULT 0,
    last_retrieved INTEGER NOT NULL,
    last_query TEXT NOT NULL DEFAULT '',
    last_score REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active'
);

-- Prunable retrieval log (v2)
CREATE TABLE IF NOT EXISTS retrieval_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    query TEXT NOT NULL,
    score REAL NOT NULL,
    timestamp INTEGER NOT NULL
);

-- Index for per-memory history lookups
CREATE INDEX IF NOT EXISTS idx_retrieval_log_memory ON retrieval_log(memory_id);

-- Index for age-based pruning
CREATE INDEX IF NOT EXISTS idx_retrieval_log_timestamp ON retrieval_log(timestamp);

-- FTS5 virtual table for the lexical search capability
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    name,
    content,
    content='chunks',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

-- Triggers to keep the FTS5 index in sync with the chunks table
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, name, content) VALUES (new.rowid, new.name, new.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, name, content)
    VALUES('delete', old.rowid, old.name, old.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, name, content)
    VALUES('delete', old.rowid, old.name, old.content);
    INSERT INTO chunks_fts(rowid, name, content) VALUES (new.rowid, new.name, new.content);
END;
";

/// SQL to check if schema is initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master
WHERE type='table' AND name='schema_info';
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";

/// Migrations from older schema versions.
pub struct Migration {
    /// Version this migration upgrades from.
    pub from_version: u32,
    /// Version this migration upgrades to.
    pub to_version: u32,
    /// SQL statements to execute.
    pub sql: &'static str,
}

/// SQL for v1 to v2 migration (adds retrieval tracking).
const MIGRATION_V1_TO_V2: &str = r"
CREATE TABLE IF NOT EXISTS memory_stats (
    memory_id TEXT PRIMARY KEY,
    retrieval_count INTEGER NOT NULL DEFAULT 0,
    last_retrieved INTEGER NOT NULL,
    last_query TEXT NOT NULL DEFAULT '',
    last_score REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS retrieval_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL,
    query TEXT NOT NULL,
    score REAL NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_retrieval_log_memory ON retrieval_log(memory_id);
CREATE INDEX IF NOT EXISTS idx_retrieval_log_timestamp ON retrieval_log(timestamp);
";

/// Available migrations.
pub const MIGRATIONS: &[Migration] = &[Migration {
    from_version: 1,
    to_version: 2,
    sql: MIGRATION_V1_TO_V2,
}];

/// Gets migrations needed to upgrade from a version.
#[must_use]
pub fn get_migrations_from(current_version: u32) -> Vec<&'static Migration> {
    MIGRATIONS
        .iter()
        .filter(|m| m.from_version >= current_version && m.to_version <= CURRENT_SCHEMA_VERSION)
        .collect()
}
