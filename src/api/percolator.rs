//! Percolator - Main stored-query matching API
//!
//! Queries are registered once with [`Percolator::submit`]; documents are then
//! matched against all of them with [`Percolator::match_batch`]. Matching runs
//! in two phases: the candidate selector narrows the stored fragments down to
//! plausible candidates, and the matcher evaluates each candidate exactly.

use crate::config::PercolatorConfig;
use crate::error::{PercolatorError, Result};
use crate::events::{ListenerRegistry, UpdateListener};
use crate::index::{FragmentMap, QueryIndex};
use crate::matchers::{MatchError, Matches, MatcherFactory, PresearcherMatches, SlowLog};
use crate::presearch::{CandidateSelector, IndexTerm};
use crate::query::{
    Fingerprint, FragmentBuilder, IdentityDecomposer, QueryDecomposer, QueryFragment, QueryParser,
    StoredQuery,
};
use crate::scheduler::PeriodicTask;
use crate::storage::{IndexRecord, RecordStore, StoreStats};
use crate::text::{DocumentBatch, InputDocument};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A stored query that could not be parsed or decomposed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryError {
    pub id: String,
    pub query: String,
    pub message: String,
}

impl QueryError {
    fn new(query: &StoredQuery, message: impl Into<String>) -> Self {
        Self {
            id: query.id().to_string(),
            query: query.query().to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.id, self.query, self.message)
    }
}

/// Index and cache diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryCacheStats {
    /// Live records in the store
    pub queries: usize,
    /// Fragments held by the compiled cache
    pub cached_queries: usize,
    /// Completion time of the last successful purge
    pub last_purged: Option<DateTime<Utc>>,
}

/// Builder for [`Percolator`]
pub struct PercolatorBuilder {
    parser: Arc<dyn QueryParser>,
    selector: Arc<dyn CandidateSelector>,
    decomposer: Arc<dyn QueryDecomposer>,
    config: PercolatorConfig,
    listeners: Vec<Arc<dyn UpdateListener>>,
}

impl PercolatorBuilder {
    pub fn decomposer<D: QueryDecomposer + 'static>(mut self, decomposer: D) -> Self {
        self.decomposer = Arc::new(decomposer);
        self
    }

    pub fn config(mut self, config: PercolatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a listener before the cache is loaded
    pub fn listener(mut self, listener: Arc<dyn UpdateListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Open the store, load the cache and start the purge schedule
    pub fn open(self) -> Result<Percolator> {
        self.config.validate()?;

        let store = match &self.config.storage.path {
            Some(path) => RecordStore::open_with_readers(path, self.config.storage.read_pool_size)?,
            None => RecordStore::memory()?,
        };

        let inner = Arc::new(Inner {
            index: QueryIndex::new(store),
            builder: FragmentBuilder::new(self.parser, self.decomposer),
            selector: self.selector,
            listeners: ListenerRegistry::new(),
            config: self.config,
        });
        for listener in self.listeners {
            inner.listeners.add(listener);
        }

        if inner.config.store_queries {
            inner.load_cache()?;
        } else {
            // Records without originals could never be rebuilt
            inner.index.clear()?;
        }

        let task_inner = inner.clone();
        let failure_inner = inner.clone();
        let purge_task = PeriodicTask::schedule(
            "percolator-purge",
            inner.config.purge_interval(),
            move || task_inner.purge_cache(),
            move |e| failure_inner.listeners.after_purge_error(&e),
        )?;

        log::info!(
            "Percolator ready: {} live records, purge every {:?}",
            inner.index.num_docs(),
            inner.config.purge_interval()
        );
        Ok(Percolator {
            inner,
            purge_task,
            closed: AtomicBool::new(false),
        })
    }
}

struct Inner {
    index: QueryIndex,
    builder: FragmentBuilder,
    selector: Arc<dyn CandidateSelector>,
    listeners: ListenerRegistry,
    config: PercolatorConfig,
}

impl Inner {
    fn commit(&self, records: Option<&[IndexRecord]>) -> Result<()> {
        self.listeners.before_commit(records);
        self.index.commit(records)?;
        self.listeners.after_commit(records);
        Ok(())
    }

    fn purge_cache(&self) -> Result<()> {
        self.index.purge_cache()?;
        self.listeners.after_purge();
        Ok(())
    }

    /// Rebuild the cache from the stored originals
    fn load_cache(&self) -> Result<()> {
        let started = Instant::now();
        let mut failures = Vec::new();

        let size = self.index.rebuild_cache(|fresh| {
            let mut seen_ids = HashSet::new();
            let mut seen_roots = HashSet::new();
            let mut distinct = Vec::new();

            // Only the distinct decoded queries are kept, never the raw rows
            self.index.scan(true, |record| {
                if !seen_ids.insert(record.query_id.clone()) {
                    return Ok(());
                }
                let Some(original) = record.original else {
                    failures.push(format!("{}: no stored original", record.query_id));
                    return Ok(());
                };
                match StoredQuery::deserialize(&original) {
                    Ok(query) => {
                        if seen_roots.insert(query.fingerprint()) {
                            distinct.push(query);
                        }
                    }
                    Err(e) => failures.push(format!("{}: {}", record.query_id, e)),
                }
                Ok(())
            })?;

            let built: Vec<_> = distinct
                .par_iter()
                .map(|query| (query.id(), self.builder.build(query)))
                .collect();
            for (id, result) in built {
                match result {
                    Ok(fragments) => insert_fragments(fresh, fragments),
                    Err(e) => failures.push(format!("{}: {:#}", id, e)),
                }
            }
            Ok(())
        })?;

        if !failures.is_empty() {
            log::error!("Cache warm load failed for {} queries", failures.len());
            return Err(PercolatorError::CacheLoad { failures });
        }
        log::info!(
            "Loaded {} cached fragments from {} live records in {:?}",
            size,
            self.index.num_docs(),
            started.elapsed()
        );
        Ok(())
    }
}

fn insert_fragments(map: &mut FragmentMap, fragments: Vec<Arc<QueryFragment>>) {
    for fragment in fragments {
        map.insert(fragment.fingerprint().clone(), fragment);
    }
}

/// Stored-query matching engine
pub struct Percolator {
    inner: Arc<Inner>,
    purge_task: PeriodicTask,
    closed: AtomicBool,
}

impl Percolator {
    /// Builder with the identity decomposer and default configuration
    pub fn builder<P, S>(parser: P, selector: S) -> PercolatorBuilder
    where
        P: QueryParser + 'static,
        S: CandidateSelector + 'static,
    {
        PercolatorBuilder {
            parser: Arc::new(parser),
            selector: Arc::new(selector),
            decomposer: Arc::new(IdentityDecomposer),
            config: PercolatorConfig::default(),
            listeners: Vec::new(),
        }
    }

    /// In-memory percolator with default settings
    pub fn new<P, S>(parser: P, selector: S) -> Result<Self>
    where
        P: QueryParser + 'static,
        S: CandidateSelector + 'static,
    {
        Self::builder(parser, selector).open()
    }

    pub fn config(&self) -> &PercolatorConfig {
        &self.inner.config
    }

    pub fn add_listener(&self, listener: Arc<dyn UpdateListener>) {
        self.inner.listeners.add(listener);
    }

    /// Register `queries`, replacing any live query with the same id
    ///
    /// Returns the queries that failed to parse or decompose; those are not
    /// stored and do not affect the rest of the batch.
    pub fn submit<I>(&self, queries: I) -> Result<Vec<QueryError>>
    where
        I: IntoIterator<Item = StoredQuery>,
    {
        let inner = &self.inner;
        let mut errors = Vec::new();
        let mut updates: Vec<IndexRecord> = Vec::new();
        let mut pending_ids = HashSet::new();
        let mut built: HashMap<Fingerprint, Vec<Arc<QueryFragment>>> = HashMap::new();

        for query in queries {
            if query.id().is_empty() {
                errors.push(QueryError::new(&query, "query id must not be empty"));
                continue;
            }

            let root = query.fingerprint();
            let fragments = match built.get(&root) {
                Some(fragments) => fragments.clone(),
                None => match inner.builder.build(&query) {
                    Ok(fragments) => {
                        built.insert(root, fragments.clone());
                        fragments
                    }
                    Err(e) => {
                        log::debug!("Rejected query {}: {:#}", query.id(), e);
                        errors.push(QueryError::new(&query, format!("{:#}", e)));
                        continue;
                    }
                },
            };

            let original = if inner.config.store_queries {
                match query.serialize() {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        errors.push(QueryError::new(&query, e.to_string()));
                        continue;
                    }
                }
            } else {
                None
            };

            // A later submission in the same batch replaces an earlier one
            if !pending_ids.insert(query.id().to_string()) {
                updates.retain(|record| record.query_id() != query.id());
            }
            for fragment in fragments {
                let indexable = inner
                    .selector
                    .build_indexable(fragment.query(), fragment.metadata());
                updates.push(IndexRecord::new(query.id(), fragment, indexable, original.clone()));
            }

            if updates.len() > inner.config.commit_batch_size {
                inner.commit(Some(&updates))?;
                updates.clear();
                pending_ids.clear();
            }
        }

        inner.commit(Some(&updates))?;
        if !errors.is_empty() {
            log::warn!("{} queries were rejected", errors.len());
        }
        Ok(errors)
    }

    /// Delete stored queries by their ids
    pub fn delete<I>(&self, queries: I) -> Result<()>
    where
        I: IntoIterator<Item = StoredQuery>,
    {
        let ids: Vec<String> = queries.into_iter().map(|q| q.id().to_string()).collect();
        self.delete_by_id(ids)
    }

    pub fn delete_by_id<I, S>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            self.inner.index.delete_by_tag(id.as_ref());
        }
        self.inner.commit(None)
    }

    /// Delete every stored query
    pub fn delete_all(&self) -> Result<()> {
        self.inner.index.delete_all();
        self.inner.commit(None)
    }

    /// Match a document batch against every stored query
    pub fn match_batch<T>(&self, batch: &DocumentBatch, factory: &dyn MatcherFactory<T>) -> Result<Matches<T>> {
        self.run_match(batch, factory, None)
    }

    /// Match a single document
    pub fn match_document<T>(&self, doc: InputDocument, factory: &dyn MatcherFactory<T>) -> Result<Matches<T>> {
        self.match_batch(&DocumentBatch::of(doc), factory)
    }

    /// Like [`Percolator::match_batch`], also reporting the index terms that
    /// selected each candidate
    pub fn debug_match<T>(
        &self,
        batch: &DocumentBatch,
        factory: &dyn MatcherFactory<T>,
    ) -> Result<PresearcherMatches<T>> {
        let mut selected_by = BTreeMap::new();
        let matches = self.run_match(batch, factory, Some(&mut selected_by))?;
        for terms in selected_by.values_mut() {
            terms.sort();
            terms.dedup();
        }
        Ok(PresearcherMatches {
            matches,
            selected_by,
        })
    }

    fn run_match<T>(
        &self,
        batch: &DocumentBatch,
        factory: &dyn MatcherFactory<T>,
        mut trace: Option<&mut BTreeMap<String, Vec<IndexTerm>>>,
    ) -> Result<Matches<T>> {
        let started = Instant::now();
        let inner = &self.inner;
        let mut matcher = factory.create_matcher(batch);
        let search = inner.index.search(inner.selector.as_ref(), batch)?;

        let mut slow_log = SlowLog::new(inner.config.slow_log_limit_nanos);
        let mut queries_run = 0;
        for record in search.records {
            let Some(fragment) = record.fragment else {
                log::warn!(
                    "No cached fragment for query {} ({}), skipping",
                    record.query_id,
                    record.fingerprint
                );
                continue;
            };
            if let Some(trace) = trace.as_deref_mut() {
                trace
                    .entry(record.query_id.clone())
                    .or_default()
                    .extend(record.matched_terms);
            }

            queries_run += 1;
            let eval_started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                matcher.match_query(&record.query_id, fragment.query(), fragment.metadata())
            }));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(_) => Some("matcher panicked".to_string()),
            };
            if let Some(message) = failure {
                log::debug!("Error matching query {}: {}", record.query_id, message);
                matcher.report_error(MatchError::new(&record.query_id, message));
            }

            let elapsed = eval_started.elapsed().as_nanos() as u64;
            if slow_log.record(&record.query_id, elapsed) {
                log::warn!("Slow query {}: {}ns", record.query_id, elapsed);
            }
        }

        let mut matches = matcher.finish(search.build_time_nanos, queries_run);
        matches.set_slow_log(slow_log);
        matches.set_search_time_millis(started.elapsed().as_millis() as u64);
        log::debug!(
            "Matched batch of {} documents: {} candidates, {} matches",
            batch.len(),
            queries_run,
            matches.total_matches()
        );
        Ok(matches)
    }

    /// Original stored query for `id`, if it is live
    ///
    /// Fails with [`PercolatorError::IllegalState`] when originals are not
    /// retained.
    pub fn get_original(&self, id: &str) -> Result<Option<StoredQuery>> {
        if !self.inner.config.store_queries {
            return Err(PercolatorError::IllegalState(
                "Cannot get original query: queries are not stored".to_string(),
            ));
        }
        let records = self.inner.index.find_by_id(id)?;
        match records.into_iter().find_map(|record| record.original) {
            Some(bytes) => Ok(Some(StoredQuery::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            queries: self.inner.index.num_docs(),
            cached_queries: self.inner.index.cache_size(),
            last_purged: self.inner.index.last_purged(),
        }
    }

    /// Record and file-size statistics of the underlying store
    pub fn storage_stats(&self) -> Result<StoreStats> {
        self.inner.index.store_stats()
    }

    /// Ids of every live stored query
    pub fn list_ids(&self) -> Result<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        self.inner.index.scan(false, |record| {
            ids.insert(record.query_id);
            Ok(())
        })?;
        Ok(ids)
    }

    pub fn count_distinct_ids(&self) -> Result<usize> {
        Ok(self.list_ids()?.len())
    }

    /// Number of live fragments over all stored queries
    pub fn disjunct_count(&self) -> usize {
        self.inner.index.num_docs()
    }

    /// Rebuild the compiled cache now
    ///
    /// Listeners are notified of the outcome; a failure is also returned.
    pub fn purge_cache(&self) -> Result<()> {
        self.inner.purge_cache().inspect_err(|e| {
            self.inner.listeners.after_purge_error(e);
        })
    }

    /// Stop the purge schedule and close the store
    ///
    /// Every resource is released even if an earlier one fails; the first
    /// failure is returned and later ones are logged.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut first_error = self.purge_task.cancel().err();
        if let Err(e) = self.inner.index.close() {
            match first_error {
                Some(_) => log::error!("Error closing query store: {}", e),
                None => first_error = Some(e),
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Percolator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Error closing percolator: {}", e);
        }
    }
}
