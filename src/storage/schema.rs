//! Database schema definitions

/// Database schema version
pub const SCHEMA_VERSION: u32 = 2;

/// SQL for creating the migrations bookkeeping table
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    id INTEGER PRIMARY KEY,
    version TEXT NOT NULL UNIQUE,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// SQL for creating the records and record_terms tables
///
/// One row in `records` per query fragment. `deleted` is a tombstone: the
/// row stays until compaction but is invisible to scans and searches.
pub const CREATE_RECORD_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query_id TEXT NOT NULL,
    del_tag TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    original BLOB,
    deleted INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS record_terms (
    record_id INTEGER NOT NULL REFERENCES records (id),
    field TEXT NOT NULL,
    term TEXT NOT NULL
);
"#;

/// SQL for the lookup indexes used by deletes, id lookups and term search
pub const CREATE_LOOKUP_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_records_del_tag ON records(del_tag, deleted);
CREATE INDEX IF NOT EXISTS idx_records_query_id ON records(query_id, deleted);
CREATE INDEX IF NOT EXISTS idx_record_terms_term ON record_terms(field, term);
CREATE INDEX IF NOT EXISTS idx_record_terms_record ON record_terms(record_id);
"#;
