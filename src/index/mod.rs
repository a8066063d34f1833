//! Query index: the persistent store plus the compiled-fragment cache
//!
//! The store is authoritative. The cache may hold entries for records that
//! were deleted since the last purge, but it never misses a live record:
//! commits insert their fragments before the records become visible, and a
//! purge that runs while commits are in flight merges whatever those commits
//! inserted into the generation it is building.
//!
//! Lock order is `commit_lock`, `purge_state`, cache, store writer. Store reads
//! use their own connections and take none of these locks.

pub mod cache;

pub use cache::{CompiledCache, FragmentMap};

use crate::error::Result;
use crate::presearch::{CandidateSelector, IndexTerm};
use crate::query::{Fingerprint, QueryFragment};
use crate::storage::{IndexRecord, RecordStore, StoreStats, StoredRecord};
use crate::text::DocumentBatch;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;

/// A live record with its compiled fragment resolved from the cache
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub query_id: String,
    pub fingerprint: Fingerprint,
    /// `None` on a cache miss
    pub fragment: Option<Arc<QueryFragment>>,
    pub original: Option<Vec<u8>>,
    /// Index terms that selected the record; empty for scans
    pub matched_terms: Vec<IndexTerm>,
}

impl QueryRecord {
    fn resolve(record: StoredRecord, cache: &CompiledCache) -> Self {
        Self {
            fragment: cache.get(&record.fingerprint),
            query_id: record.query_id,
            fingerprint: record.fingerprint,
            original: record.original,
            matched_terms: record.matched_terms,
        }
    }
}

/// Lazy sequence of [`QueryRecord`]s over one cache generation
pub struct QueryRecords {
    records: std::vec::IntoIter<StoredRecord>,
    cache: Arc<CompiledCache>,
}

impl QueryRecords {
    fn new(records: Vec<StoredRecord>, cache: Arc<CompiledCache>) -> Self {
        Self {
            records: records.into_iter(),
            cache,
        }
    }
}

impl Iterator for QueryRecords {
    type Item = QueryRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(QueryRecord::resolve(record, &self.cache))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl ExactSizeIterator for QueryRecords {}

/// Candidates for one document batch
pub struct SearchResult {
    /// Time spent building the selection predicate
    pub build_time_nanos: u64,
    pub records: QueryRecords,
}

pub struct QueryIndex {
    store: RecordStore,
    cache: RwLock<Arc<CompiledCache>>,
    commit_lock: Mutex<()>,
    purge_serial: Mutex<()>,
    /// Fragments committed while a rebuild is scanning; `None` when idle
    purge_state: Mutex<Option<FragmentMap>>,
    last_purged: RwLock<Option<DateTime<Utc>>>,
}

impl QueryIndex {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            cache: RwLock::new(Arc::new(CompiledCache::new())),
            commit_lock: Mutex::new(()),
            purge_serial: Mutex::new(()),
            purge_state: Mutex::new(None),
            last_purged: RwLock::new(None),
        }
    }

    fn current_cache(&self) -> Arc<CompiledCache> {
        self.cache.read().clone()
    }

    /// Commit `records` (or only the pending deletions when `None`)
    ///
    /// Fragments enter the cache before the records are written so a search
    /// that sees a record can always resolve it.
    pub fn commit(&self, records: Option<&[IndexRecord]>) -> Result<()> {
        let _commit = self.commit_lock.lock();
        let mut purge_state = self.purge_state.lock();

        if let Some(records) = records {
            let cache = self.current_cache();
            for record in records {
                cache.insert(record.fragment().clone());
                if let Some(side) = purge_state.as_mut() {
                    side.insert(record.fingerprint().clone(), record.fragment().clone());
                }
            }
        }

        self.store.commit(records)
    }

    pub fn delete_by_tag(&self, tag: &str) {
        self.store.delete_by_tag(tag);
    }

    pub fn delete_all(&self) {
        self.store.delete_all();
    }

    /// Visit every live record, streamed from the store
    ///
    /// The cache generation is taken once the first row has been read, so it
    /// resolves every record of the store snapshot being scanned. `visit`
    /// must not call back into the index.
    pub fn scan<F>(&self, include_originals: bool, mut visit: F) -> Result<()>
    where
        F: FnMut(QueryRecord) -> Result<()>,
    {
        let mut cache: Option<Arc<CompiledCache>> = None;
        self.store.scan(include_originals, |record| {
            let cache = cache.get_or_insert_with(|| self.current_cache());
            visit(QueryRecord::resolve(record, cache))
        })
    }

    /// Live records selected for `batch` by `selector`
    pub fn search(&self, selector: &dyn CandidateSelector, batch: &DocumentBatch) -> Result<SearchResult> {
        let started = Instant::now();
        let predicate = selector.build_predicate(batch);
        let build_time_nanos = started.elapsed().as_nanos() as u64;

        let records = self.store.search(&predicate)?;
        // Snapshot after the store read: every record it returned was cached
        // in this generation or carried into it by a purge
        Ok(SearchResult {
            build_time_nanos,
            records: QueryRecords::new(records, self.current_cache()),
        })
    }

    /// Live records owned by `query_id`, originals included
    pub fn find_by_id(&self, query_id: &str) -> Result<Vec<StoredRecord>> {
        self.store.find_by_id(query_id)
    }

    /// Replace the cache with a generation built by `populate`
    ///
    /// Fragments committed while `populate` runs are merged into the new
    /// generation. When `populate` fails nothing is swapped.
    pub fn rebuild_cache<F>(&self, populate: F) -> Result<usize>
    where
        F: FnOnce(&mut FragmentMap) -> Result<()>,
    {
        let _serial = self.purge_serial.lock();
        *self.purge_state.lock() = Some(FragmentMap::new());

        let mut fresh = FragmentMap::new();
        if let Err(e) = populate(&mut fresh) {
            *self.purge_state.lock() = None;
            return Err(e);
        }

        let mut purge_state = self.purge_state.lock();
        if let Some(committed) = purge_state.take() {
            fresh.extend(committed);
        }
        let size = fresh.len();
        *self.cache.write() = Arc::new(CompiledCache::from_map(fresh));
        Ok(size)
    }

    /// Rebuild the cache from the live records, dropping orphaned fragments
    pub fn purge_cache(&self) -> Result<usize> {
        let started = Instant::now();
        let size = self.rebuild_cache(|fresh| {
            self.scan(false, |record| {
                if let Some(fragment) = record.fragment {
                    fresh.insert(record.fingerprint, fragment);
                }
                Ok(())
            })
        })?;
        *self.last_purged.write() = Some(Utc::now());
        log::info!(
            "Purged query cache: {} fragments retained in {:?}",
            size,
            started.elapsed()
        );
        Ok(size)
    }

    pub fn last_purged(&self) -> Option<DateTime<Utc>> {
        *self.last_purged.read()
    }

    /// Live record count, O(1)
    pub fn num_docs(&self) -> usize {
        self.store.num_live_records()
    }

    pub fn cache_size(&self) -> usize {
        self.current_cache().len()
    }

    pub fn store_stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// Remove every record; used when originals are not retained
    pub fn clear(&self) -> Result<()> {
        self.store.delete_all();
        self.commit(None)
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PercolatorError;
    use crate::presearch::{IndexableFields, MatchAllSelector, TermSelector};
    use crate::query::{Metadata, Query};
    use crate::text::InputDocument;

    fn record(id: &str, fp: &str, field_term: (&str, &str)) -> IndexRecord {
        let fragment = Arc::new(QueryFragment::new(
            Fingerprint::from(fp.to_string()),
            Query::term(field_term.0, field_term.1),
            Arc::new(Metadata::new()),
        ));
        let indexable: IndexableFields =
            std::iter::once((field_term.0.to_string(), field_term.1.to_string())).collect();
        IndexRecord::new(id, fragment, indexable, None)
    }

    fn index() -> QueryIndex {
        QueryIndex::new(RecordStore::memory().unwrap())
    }

    #[test]
    fn test_commit_populates_cache() {
        let index = index();
        index
            .commit(Some(&[record("1", "a_0", ("f", "x")), record("2", "b_0", ("f", "y"))]))
            .unwrap();

        assert_eq!(index.num_docs(), 2);
        assert_eq!(index.cache_size(), 2);
        let mut resolved = 0;
        index
            .scan(false, |r| {
                assert!(r.fragment.is_some());
                resolved += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(resolved, 2);
    }

    #[test]
    fn test_delete_keeps_cache_until_purge() {
        let index = index();
        index
            .commit(Some(&[record("1", "a_0", ("f", "x")), record("2", "b_0", ("f", "y"))]))
            .unwrap();

        index.delete_by_tag("1");
        index.commit(None).unwrap();
        assert_eq!(index.num_docs(), 1);
        assert_eq!(index.cache_size(), 2);
        assert!(index.last_purged().is_none());

        assert_eq!(index.purge_cache().unwrap(), 1);
        assert_eq!(index.cache_size(), 1);
        assert!(index.last_purged().is_some());
    }

    #[test]
    fn test_search_resolves_fragments() {
        let index = index();
        index
            .commit(Some(&[record("1", "a_0", ("f", "x")), record("2", "b_0", ("f", "y"))]))
            .unwrap();

        let batch = DocumentBatch::of(InputDocument::builder("d").add_field("f", "y").build());
        let result = index.search(&TermSelector, &batch).unwrap();
        let records: Vec<_> = result.records.collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query_id, "2");
        assert!(records[0].fragment.is_some());

        let all = index.search(&MatchAllSelector, &batch).unwrap();
        assert_eq!(all.records.len(), 2);
    }

    #[test]
    fn test_failed_rebuild_keeps_old_generation() {
        let index = index();
        index.commit(Some(&[record("1", "a_0", ("f", "x"))])).unwrap();

        let result = index.rebuild_cache(|_| Err(PercolatorError::Generic("boom".to_string())));
        assert!(result.is_err());
        assert_eq!(index.cache_size(), 1);
        assert!(index.purge_state.lock().is_none());
    }

    #[test]
    fn test_commit_during_rebuild_is_kept() {
        let index = index();
        index.commit(Some(&[record("1", "a_0", ("f", "x"))])).unwrap();

        let size = index
            .rebuild_cache(|fresh| {
                // Simulates a commit racing with the scan
                index.commit(Some(&[record("2", "b_0", ("f", "y"))]))?;
                index.scan(false, |r| {
                    if r.query_id == "1" {
                        fresh.insert(r.fingerprint, r.fragment.unwrap());
                    }
                    Ok(())
                })
            })
            .unwrap();

        assert_eq!(size, 2);
        assert!(index.current_cache().contains(&Fingerprint::from("b_0".to_string())));
    }
}
