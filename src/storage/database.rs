//! SQLite-backed record store
//!
//! Records are appended by [`RecordStore::commit`] in one transaction per
//! call. Deletions are buffered by [`RecordStore::delete_by_tag`] and
//! [`RecordStore::delete_all`] and applied by the next commit, which
//! tombstones the matching rows. Tombstoned rows are reclaimed by the store
//! itself once they outnumber the live ones.
//!
//! File-backed stores run in WAL mode with one writer connection and a small
//! pool of read-only connections, so scans and searches proceed while a
//! commit is being written. In-memory stores have a single connection.

use crate::error::{PercolatorError, Result};
use crate::presearch::SelectionPredicate;
use crate::query::Fingerprint;
use crate::storage::migrations::MigrationManager;
use crate::storage::{DeleteTarget, IndexRecord, StoredRecord};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, Row, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Read-only connections opened next to the writer of a file-backed store
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Tombstones below this count are never compacted
const COMPACTION_MIN_TOMBSTONES: usize = 64;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCAN_WITH_ORIGINALS: &str =
    "SELECT id, query_id, fingerprint, original FROM records WHERE deleted = 0 ORDER BY id";
const SCAN_WITHOUT_ORIGINALS: &str =
    "SELECT id, query_id, fingerprint, NULL FROM records WHERE deleted = 0 ORDER BY id";

/// Batch terms are bound as one JSON array of `[field, term]` pairs
const SEARCH_BY_TERMS: &str = r#"
WITH batch_terms(field, term) AS (
    SELECT json_extract(value, '$[0]'), json_extract(value, '$[1]') FROM json_each(?1)
)
SELECT r.id, r.query_id, r.fingerprint, p.field, p.term
FROM batch_terms p
CROSS JOIN record_terms t
CROSS JOIN records r
WHERE t.field = p.field AND t.term = p.term AND r.id = t.record_id AND r.deleted = 0
ORDER BY r.id, p.field, p.term
"#;

/// Durable, searchable set of index records
pub struct RecordStore {
    writer: Mutex<Option<Writer>>,
    /// Empty for in-memory stores; reads then go through the writer
    readers: Vec<Mutex<Option<Connection>>>,
    read_cursor: AtomicUsize,
    pending_deletes: Mutex<Vec<DeleteTarget>>,
    live_records: AtomicUsize,
    closed: AtomicBool,
    location: String,
}

struct Writer {
    conn: Connection,
    /// Tombstoned rows not yet compacted
    tombstones: usize,
}

/// Rows touched by one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CommitCounts {
    tombstoned: usize,
    inserted: usize,
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub live_records: usize,
    pub deleted_records: usize,
    pub file_size_bytes: usize,
}

impl RecordStore {
    /// Open (or create) a store in a SQLite file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_readers(path, DEFAULT_READ_POOL_SIZE)
    }

    /// Open (or create) a store with `readers` read-only connections
    pub fn open_with_readers<P: AsRef<Path>>(path: P, readers: usize) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| PercolatorError::Storage(format!("Failed to open database: {}", e)))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // The writer creates the schema and switches to WAL before any reader opens
        let mut store = Self::initialize(conn, path.to_string_lossy().to_string())?;
        store.readers = (0..readers)
            .map(|_| Self::open_reader(path).map(|conn| Mutex::new(Some(conn))))
            .collect::<Result<_>>()?;
        log::debug!("Opened {} reader connections for {}", readers, store.location);
        Ok(store)
    }

    /// Create an in-memory store
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            PercolatorError::Storage(format!("Failed to create in-memory database: {}", e))
        })?;
        Self::initialize(conn, ":memory:".to_string())
    }

    fn initialize(mut conn: Connection, location: String) -> Result<Self> {
        // In-memory databases answer "memory" here, which is fine
        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| PercolatorError::Storage(format!("Failed to enable WAL mode: {}", e)))?;

        let applied = MigrationManager::new().run_migrations(&mut conn)?;

        let (live, deleted) = Self::count_records(&conn)?;
        log::info!(
            "Query store opened at {} ({} migrations applied, {} live records, {} tombstones)",
            location,
            applied,
            live,
            deleted
        );

        Ok(Self {
            writer: Mutex::new(Some(Writer {
                conn,
                tombstones: deleted,
            })),
            readers: Vec::new(),
            read_cursor: AtomicUsize::new(0),
            pending_deletes: Mutex::new(Vec::new()),
            live_records: AtomicUsize::new(live),
            closed: AtomicBool::new(false),
            location,
        })
    }

    fn open_reader(path: &Path) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| PercolatorError::Storage(format!("Failed to open reader connection: {}", e)))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn closed_error(&self) -> PercolatorError {
        PercolatorError::IllegalState(format!("Query store at {} is closed", self.location))
    }

    fn with_writer<T>(&self, f: impl FnOnce(&mut Writer) -> Result<T>) -> Result<T> {
        let mut guard = self.writer.lock();
        match guard.as_mut() {
            Some(writer) => f(writer),
            None => Err(self.closed_error()),
        }
    }

    /// Run `f` on an idle reader, or wait on the next one round-robin
    fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.readers.is_empty() {
            return self.with_writer(|writer| f(&writer.conn));
        }

        let guard: MutexGuard<'_, Option<Connection>> =
            match self.readers.iter().find_map(|reader| reader.try_lock()) {
                Some(guard) => guard,
                None => {
                    let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.readers.len();
                    self.readers[index].lock()
                }
            };
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(self.closed_error()),
        }
    }

    /// Buffer a deletion of every record tagged `tag`
    pub fn delete_by_tag(&self, tag: &str) {
        self.pending_deletes.lock().push(DeleteTarget::Tag(tag.to_string()));
    }

    /// Buffer a deletion of every record
    pub fn delete_all(&self) {
        self.pending_deletes.lock().push(DeleteTarget::All);
    }

    /// Apply pending deletions and append `records` as one durable unit
    ///
    /// Live records sharing an id with any of `records` are replaced. The
    /// cost is bounded by the size of the commit; compaction runs only once
    /// tombstones outnumber live records, and its failure does not fail the
    /// commit.
    pub fn commit(&self, records: Option<&[IndexRecord]>) -> Result<()> {
        self.with_writer(|writer| {
            let deletes = std::mem::take(&mut *self.pending_deletes.lock());
            let counts = match Self::apply_commit(&mut writer.conn, &deletes, records) {
                Ok(counts) => counts,
                Err(e) => {
                    // Keep the deletions for the next attempt
                    let mut pending = self.pending_deletes.lock();
                    let later = std::mem::replace(&mut *pending, deletes);
                    pending.extend(later);
                    return Err(e);
                }
            };

            let live = self
                .live_records
                .load(Ordering::Acquire)
                .saturating_sub(counts.tombstoned)
                + counts.inserted;
            self.live_records.store(live, Ordering::Release);
            writer.tombstones += counts.tombstoned;

            if writer.tombstones >= COMPACTION_MIN_TOMBSTONES && writer.tombstones > live {
                match Self::compact(&mut writer.conn, writer.tombstones) {
                    Ok(()) => writer.tombstones = 0,
                    Err(e) => log::warn!(
                        "Compaction of {} tombstoned records at {} failed, retrying on a later commit: {}",
                        writer.tombstones,
                        self.location,
                        e
                    ),
                }
            }
            Ok(())
        })
    }

    fn apply_commit(
        conn: &mut Connection,
        deletes: &[DeleteTarget],
        records: Option<&[IndexRecord]>,
    ) -> Result<CommitCounts> {
        let mut counts = CommitCounts::default();
        let tx = conn
            .transaction()
            .map_err(|e| PercolatorError::Storage(format!("Failed to start transaction: {}", e)))?;

        {
            let mut tombstone = tx.prepare_cached(
                "UPDATE records SET deleted = 1 WHERE del_tag = ?1 AND deleted = 0",
            )?;
            for target in deletes {
                counts.tombstoned += match target {
                    DeleteTarget::Tag(tag) => tombstone.execute(params![tag])?,
                    DeleteTarget::All => tx.execute("UPDATE records SET deleted = 1 WHERE deleted = 0", [])?,
                };
            }

            if let Some(records) = records {
                let ids: BTreeSet<&str> = records.iter().map(|r| r.query_id()).collect();
                for id in ids {
                    counts.tombstoned += tombstone.execute(params![id])?;
                }

                let mut insert_record = tx.prepare_cached(
                    "INSERT INTO records (query_id, del_tag, fingerprint, original) VALUES (?1, ?2, ?3, ?4)",
                )?;
                let mut insert_term = tx.prepare_cached(
                    "INSERT INTO record_terms (record_id, field, term) VALUES (?1, ?2, ?3)",
                )?;
                for record in records {
                    insert_record
                        .execute(params![
                            record.query_id(),
                            record.query_id(),
                            record.fingerprint().as_str(),
                            record.original(),
                        ])
                        .map_err(|e| {
                            PercolatorError::Storage(format!(
                                "Failed to insert record for query {}: {}",
                                record.query_id(),
                                e
                            ))
                        })?;
                    let row_id = tx.last_insert_rowid();
                    for (field, term) in record.indexable().terms() {
                        insert_term.execute(params![row_id, field, term])?;
                    }
                }
                counts.inserted = records.len();
            }
        }

        tx.commit()
            .map_err(|e| PercolatorError::Storage(format!("Failed to commit transaction: {}", e)))?;

        log::debug!(
            "Committed {} records and {} deletions ({} rows tombstoned)",
            counts.inserted,
            deletes.len(),
            counts.tombstoned
        );
        Ok(counts)
    }

    fn compact(conn: &mut Connection, tombstones: usize) -> Result<()> {
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM record_terms WHERE record_id IN (SELECT id FROM records WHERE deleted = 1)",
            [],
        )?;
        tx.execute("DELETE FROM records WHERE deleted = 1", [])?;
        tx.commit()
            .map_err(|e| PercolatorError::Storage(format!("Failed to compact records: {}", e)))?;
        log::info!("Compacted {} tombstoned records", tombstones);
        Ok(())
    }

    fn count_records(conn: &Connection) -> Result<(usize, usize)> {
        let (live, deleted): (i64, i64) = conn
            .query_row(
                "SELECT COALESCE(SUM(deleted = 0), 0), COALESCE(SUM(deleted = 1), 0) FROM records",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| PercolatorError::Storage(format!("Failed to count records: {}", e)))?;
        Ok((live as usize, deleted as usize))
    }

    /// Visit every live record in insertion order
    ///
    /// Rows are streamed to `visit` one at a time. `visit` must not call back
    /// into the store.
    pub fn scan<F>(&self, include_originals: bool, mut visit: F) -> Result<()>
    where
        F: FnMut(StoredRecord) -> Result<()>,
    {
        let sql = if include_originals {
            SCAN_WITH_ORIGINALS
        } else {
            SCAN_WITHOUT_ORIGINALS
        };
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let mut rows = stmt
                .query([])
                .map_err(|e| PercolatorError::Storage(format!("Failed to scan records: {}", e)))?;
            while let Some(row) = rows
                .next()
                .map_err(|e| PercolatorError::Storage(format!("Failed to read record row: {}", e)))?
            {
                visit(Self::row_to_record(row)?)?;
            }
            Ok(())
        })
    }

    /// Live records selected by `predicate`, each with the terms that selected it
    pub fn search(&self, predicate: &SelectionPredicate) -> Result<Vec<StoredRecord>> {
        let terms = match predicate {
            SelectionPredicate::All => {
                let mut records = Vec::new();
                self.scan(false, |record| {
                    records.push(record);
                    Ok(())
                })?;
                return Ok(records);
            }
            SelectionPredicate::AnyTerm(terms) if terms.is_empty() => return Ok(Vec::new()),
            SelectionPredicate::AnyTerm(terms) => serde_json::to_string(terms)?,
        };

        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(SEARCH_BY_TERMS)?;
            let mut rows = stmt
                .query(params![terms])
                .map_err(|e| PercolatorError::Storage(format!("Failed to search records: {}", e)))?;

            let mut records: Vec<StoredRecord> = Vec::new();
            while let Some(row) = rows.next()? {
                let row_id: i64 = row.get(0)?;
                let matched = (row.get::<_, String>(3)?, row.get::<_, String>(4)?);
                match records.last_mut() {
                    Some(last) if last.row_id == row_id => last.matched_terms.push(matched),
                    _ => records.push(StoredRecord {
                        row_id,
                        query_id: row.get(1)?,
                        fingerprint: Fingerprint::from(row.get::<_, String>(2)?),
                        original: None,
                        matched_terms: vec![matched],
                    }),
                }
            }
            Ok(records)
        })
    }

    /// Live records owned by `query_id`, with their originals
    pub fn find_by_id(&self, query_id: &str) -> Result<Vec<StoredRecord>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, query_id, fingerprint, original FROM records WHERE query_id = ?1 AND deleted = 0 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![query_id], Self::row_to_record)
                .map_err(|e| PercolatorError::Storage(format!("Failed to query records: {}", e)))?;

            let mut records = Vec::new();
            for record in rows {
                records.push(record?);
            }
            Ok(records)
        })
    }

    /// Number of live records as of the last commit
    pub fn num_live_records(&self) -> usize {
        self.live_records.load(Ordering::Acquire)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_reader(|conn| {
            let (live_records, deleted_records) = Self::count_records(conn)?;
            let file_size: i64 = conn
                .query_row(
                    "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| PercolatorError::Storage(format!("Failed to get database size: {}", e)))?;

            Ok(StoreStats {
                live_records,
                deleted_records,
                file_size_bytes: file_size as usize,
            })
        })
    }

    /// Release every connection; later calls fail with `IllegalState`
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Readers first so the writer's close can checkpoint the WAL
        for reader in &self.readers {
            if let Some(conn) = reader.lock().take() {
                if let Err((_, e)) = conn.close() {
                    log::warn!("Failed to close reader connection for {}: {}", self.location, e);
                }
            }
        }

        if let Some(writer) = self.writer.lock().take() {
            writer.conn.close().map_err(|(_, e)| {
                PercolatorError::Storage(format!("Failed to close database {}: {}", self.location, e))
            })?;
        }
        log::info!("Query store at {} closed", self.location);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Helper function to convert database row to StoredRecord
    fn row_to_record(row: &Row) -> rusqlite::Result<StoredRecord> {
        Ok(StoredRecord {
            row_id: row.get(0)?,
            query_id: row.get(1)?,
            fingerprint: Fingerprint::from(row.get::<_, String>(2)?),
            original: row.get(3)?,
            matched_terms: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presearch::IndexableFields;
    use crate::query::{Metadata, Query, QueryFragment};
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn record(id: &str, fp: &str, terms: &[&str], original: Option<&[u8]>) -> IndexRecord {
        let fragment = Arc::new(QueryFragment::new(
            Fingerprint::from(fp.to_string()),
            Query::MatchAll,
            Arc::new(Metadata::new()),
        ));
        let indexable: IndexableFields = terms
            .iter()
            .map(|t| ("f".to_string(), t.to_string()))
            .collect();
        IndexRecord::new(id, fragment, indexable, original.map(|o| o.to_vec()))
    }

    fn scan_all(store: &RecordStore, include_originals: bool) -> Vec<StoredRecord> {
        let mut records = Vec::new();
        store
            .scan(include_originals, |record| {
                records.push(record);
                Ok(())
            })
            .unwrap();
        records
    }

    fn ids(records: &[StoredRecord]) -> Vec<&str> {
        records.iter().map(|r| r.query_id.as_str()).collect()
    }

    fn any_term(terms: &[&str]) -> SelectionPredicate {
        SelectionPredicate::AnyTerm(terms.iter().map(|t| ("f".to_string(), t.to_string())).collect())
    }

    #[test]
    fn test_commit_and_scan() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[
                record("1", "a_0", &["x"], Some(b"one")),
                record("1", "a_1", &["y"], Some(b"one")),
                record("2", "b_0", &["z"], None),
            ]))
            .unwrap();

        assert_eq!(store.num_live_records(), 3);
        let scanned = scan_all(&store, true);
        assert_eq!(ids(&scanned), vec!["1", "1", "2"]);
        assert_eq!(scanned[0].original.as_deref(), Some(&b"one"[..]));
        assert!(scan_all(&store, false)[0].original.is_none());
    }

    #[test]
    fn test_scan_stops_on_visitor_error() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[record("1", "a_0", &["x"], None), record("2", "b_0", &["x"], None)]))
            .unwrap();

        let mut visited = 0;
        let result = store.scan(false, |_| {
            visited += 1;
            Err(PercolatorError::Generic("stop".to_string()))
        });
        assert!(matches!(result, Err(PercolatorError::Generic(_))));
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_deletes_apply_on_commit() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[record("1", "a_0", &["x"], None), record("2", "b_0", &["x"], None)]))
            .unwrap();

        store.delete_by_tag("1");
        assert_eq!(scan_all(&store, false).len(), 2);

        store.commit(None).unwrap();
        assert_eq!(ids(&scan_all(&store, false)), vec!["2"]);
        assert_eq!(store.num_live_records(), 1);

        let stats = store.stats().unwrap();
        assert_eq!(stats.live_records, 1);
        assert_eq!(stats.deleted_records, 1);
    }

    #[test]
    fn test_resubmission_replaces_records() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[record("1", "a_0", &["x"], None), record("1", "a_1", &["y"], None)]))
            .unwrap();
        store.commit(Some(&[record("1", "c_0", &["z"], None)])).unwrap();

        let scanned = scan_all(&store, false);
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].fingerprint.as_str(), "c_0");
    }

    #[test]
    fn test_live_count_tracks_commits() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[
                record("1", "a_0", &["x"], None),
                record("1", "a_1", &["y"], None),
                record("2", "b_0", &["x"], None),
                record("3", "c_0", &["x"], None),
            ]))
            .unwrap();

        // Delete and resubmit of the same id in one commit, plus a new id
        store.delete_by_tag("1");
        store.delete_by_tag("missing");
        store
            .commit(Some(&[record("2", "b2_0", &["x"], None), record("4", "d_0", &["x"], None)]))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.live_records, 3);
        assert_eq!(stats.deleted_records, 3);
        assert_eq!(store.num_live_records(), stats.live_records);
        assert_eq!(store.writer.lock().as_ref().unwrap().tombstones, 3);

        store.delete_all();
        store.commit(None).unwrap();
        assert_eq!(store.num_live_records(), 0);
        assert_eq!(store.stats().unwrap().deleted_records, 6);
    }

    #[test]
    fn test_search_by_terms() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[
                record("1", "a_0", &["x", "y"], None),
                record("2", "b_0", &["z"], None),
                record("3", "c_0", &["y"], None),
            ]))
            .unwrap();

        let found = store.search(&any_term(&["x", "y"])).unwrap();
        assert_eq!(ids(&found), vec!["1", "3"]);
        assert_eq!(found[0].matched_terms.len(), 2);
        assert_eq!(found[1].matched_terms, vec![("f".to_string(), "y".to_string())]);

        assert!(store.search(&any_term(&["unknown"])).unwrap().is_empty());
        assert!(store.search(&any_term(&[])).unwrap().is_empty());
        assert_eq!(store.search(&SelectionPredicate::All).unwrap().len(), 3);
    }

    #[test]
    fn test_search_terms_with_quotes_and_unicode() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[record("1", "a_0", &["it's", "\"quoted\""], None), record("2", "b_0", &["café"], None)]))
            .unwrap();

        assert_eq!(ids(&store.search(&any_term(&["\"quoted\""])).unwrap()), vec!["1"]);
        assert_eq!(ids(&store.search(&any_term(&["café", "it's"])).unwrap()), vec!["1", "2"]);
    }

    #[test]
    fn test_delete_all_and_compaction() {
        let store = RecordStore::memory().unwrap();
        let records: Vec<_> = (0..COMPACTION_MIN_TOMBSTONES + 1)
            .map(|i| record(&i.to_string(), &format!("fp{}_0", i), &["t"], None))
            .collect();
        store.commit(Some(&records)).unwrap();

        store.delete_all();
        store.commit(None).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.live_records, 0);
        assert_eq!(stats.deleted_records, 0);
        assert!(scan_all(&store, false).is_empty());
    }

    #[test]
    fn test_failed_compaction_keeps_commit() {
        let store = RecordStore::memory().unwrap();
        let total = COMPACTION_MIN_TOMBSTONES + 1;
        let records: Vec<_> = (0..total)
            .map(|i| record(&i.to_string(), &format!("fp{}_0", i), &["t"], None))
            .collect();
        store.commit(Some(&records)).unwrap();

        store
            .with_writer(|writer| {
                writer.conn.execute_batch(
                    "CREATE TEMP TRIGGER block_compaction BEFORE DELETE ON records \
                     BEGIN SELECT RAISE(ABORT, 'compaction blocked'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        store.delete_all();
        store.commit(Some(&[record("new", "n_0", &["t"], None)])).unwrap();
        assert_eq!(store.num_live_records(), 1);
        assert_eq!(store.stats().unwrap().deleted_records, total);
        assert_eq!(ids(&scan_all(&store, false)), vec!["new"]);

        store
            .with_writer(|writer| {
                writer.conn.execute_batch("DROP TRIGGER temp.block_compaction")?;
                Ok(())
            })
            .unwrap();

        // Still above the threshold, so the next commit compacts
        store.commit(None).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.live_records, 1);
        assert_eq!(stats.deleted_records, 0);
    }

    #[test]
    fn test_find_by_id() {
        let store = RecordStore::memory().unwrap();
        store
            .commit(Some(&[record("q", "a_0", &["x"], Some(b"raw")), record("r", "b_0", &["x"], None)]))
            .unwrap();

        let found = store.find_by_id("q").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].original.as_deref(), Some(&b"raw"[..]));
        assert!(store.find_by_id("missing").unwrap().is_empty());
    }

    #[test]
    fn test_reopen_file_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.db");
        {
            let store = RecordStore::open(&path).unwrap();
            store.commit(Some(&[record("1", "a_0", &["x"], Some(b"raw"))])).unwrap();
            store.delete_by_tag("1");
            store.commit(Some(&[record("2", "b_0", &["x"], Some(b"raw"))])).unwrap();
            store.close().unwrap();
        }

        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.num_live_records(), 1);
        assert_eq!(store.writer.lock().as_ref().unwrap().tombstones, 1);
        assert_eq!(ids(&scan_all(&store, true)), vec!["2"]);
    }

    #[test]
    fn test_reads_proceed_while_writer_is_busy() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open_with_readers(dir.path().join("queries.db"), 2).unwrap();
        store
            .commit(Some(&[record("1", "a_0", &["x"], Some(b"raw"))]))
            .unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let (searched, found, scanned, uncommitted_hidden) = thread::scope(|scope| {
            // Hold the writer with an open, uncommitted write transaction
            let mut writer = store.writer.lock();
            let conn = &mut writer.as_mut().unwrap().conn;
            conn.execute_batch("BEGIN IMMEDIATE; UPDATE records SET deleted = 1;")
                .unwrap();

            scope.spawn(|| {
                let searched = store.search(&any_term(&["x"])).map(|r| r.len());
                let found = store.find_by_id("1").map(|r| r.len());
                let scanned = store.scan(false, |_| Ok(())).is_ok();
                let live = store.stats().map(|s| s.live_records == 1);
                let _ = tx.send((searched, found, scanned, live));
            });
            let result = rx.recv_timeout(Duration::from_secs(10));

            conn.execute_batch("ROLLBACK").unwrap();
            drop(writer);
            result.expect("reads blocked behind the writer")
        });

        assert_eq!(searched.unwrap(), 1);
        assert_eq!(found.unwrap(), 1);
        assert!(scanned);
        assert!(uncommitted_hidden.unwrap());
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = RecordStore::memory().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.scan(false, |_| Ok(())), Err(PercolatorError::IllegalState(_))));
        assert!(store.close().is_ok());
    }

    #[test]
    fn test_closed_file_store_rejects_reads() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("queries.db")).unwrap();
        store.close().unwrap();
        assert!(matches!(store.find_by_id("1"), Err(PercolatorError::IllegalState(_))));
        assert!(matches!(store.search(&any_term(&["x"])), Err(PercolatorError::IllegalState(_))));
        assert!(matches!(store.commit(None), Err(PercolatorError::IllegalState(_))));
    }
}
