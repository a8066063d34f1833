//! True evaluation of candidate queries and the match result model
//!
//! A [`MatcherFactory`] creates one [`CandidateMatcher`] per document batch.
//! The pipeline feeds it every selected candidate, reports per-candidate
//! failures through [`CandidateMatcher::report_error`], and finally turns it
//! into a [`Matches`] with [`CandidateMatcher::finish`].

pub mod simple;

pub use simple::{QueryMatch, SimpleMatcher, SimpleMatcherFactory};

use crate::presearch::IndexTerm;
use crate::query::{Metadata, Query};
use crate::text::DocumentBatch;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Evaluator for one document batch
pub trait CandidateMatcher<T> {
    /// Evaluate one candidate fragment against the batch
    fn match_query(&mut self, query_id: &str, query: &Query, metadata: &Metadata) -> anyhow::Result<()>;

    /// Record a failure raised while evaluating a candidate
    fn report_error(&mut self, error: MatchError);

    /// Produce the result set
    fn finish(self: Box<Self>, build_time_nanos: u64, queries_run: usize) -> Matches<T>;
}

/// Creates a [`CandidateMatcher`] per document batch
pub trait MatcherFactory<T>: Send + Sync {
    fn create_matcher<'a>(&self, docs: &'a DocumentBatch) -> Box<dyn CandidateMatcher<T> + 'a>;
}

/// Failure evaluating one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchError {
    pub query_id: String,
    pub message: String,
}

impl MatchError {
    pub fn new(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.query_id, self.message)
    }
}

/// A candidate evaluation that exceeded the slow-log threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlowLogEntry {
    pub query_id: String,
    pub elapsed_nanos: u64,
}

/// Evaluations slower than `limit_nanos`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlowLog {
    pub limit_nanos: u64,
    pub entries: Vec<SlowLogEntry>,
}

impl SlowLog {
    pub fn new(limit_nanos: u64) -> Self {
        Self {
            limit_nanos,
            entries: Vec::new(),
        }
    }

    /// Record the evaluation if it crossed the threshold
    pub fn record(&mut self, query_id: &str, elapsed_nanos: u64) -> bool {
        if elapsed_nanos <= self.limit_nanos {
            return false;
        }
        self.entries.push(SlowLogEntry {
            query_id: query_id.to_string(),
            elapsed_nanos,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for SlowLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Limit: {}ns", self.limit_nanos)?;
        for entry in &self.entries {
            writeln!(f, "\t{} [{}ns]", entry.query_id, entry.elapsed_nanos)?;
        }
        Ok(())
    }
}

/// Matches for one document, keyed by query id
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMatches<T> {
    pub doc_id: String,
    pub matches: BTreeMap<String, T>,
}

impl<T> DocumentMatches<T> {
    fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            matches: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.matches.keys().map(String::as_str)
    }
}

/// Result of matching one document batch
#[derive(Debug, Clone, Serialize)]
pub struct Matches<T> {
    documents: BTreeMap<String, DocumentMatches<T>>,
    errors: Vec<MatchError>,
    slow_log: SlowLog,
    queries_run: usize,
    query_build_time_nanos: u64,
    search_time_millis: u64,
    batch_size: usize,
}

impl<T> Matches<T> {
    pub fn matches(&self, doc_id: &str) -> Option<&DocumentMatches<T>> {
        self.documents.get(doc_id)
    }

    /// The match of `query_id` in document `doc_id`
    pub fn get(&self, doc_id: &str, query_id: &str) -> Option<&T> {
        self.documents.get(doc_id)?.matches.get(query_id)
    }

    /// Number of distinct queries matching `doc_id`
    pub fn match_count(&self, doc_id: &str) -> usize {
        self.documents.get(doc_id).map_or(0, DocumentMatches::len)
    }

    /// Number of (document, query) matches over the batch
    pub fn total_matches(&self) -> usize {
        self.documents.values().map(DocumentMatches::len).sum()
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentMatches<T>> {
        self.documents.values()
    }

    pub fn errors(&self) -> &[MatchError] {
        &self.errors
    }

    pub fn slow_log(&self) -> &SlowLog {
        &self.slow_log
    }

    /// Number of candidates evaluated
    pub fn queries_run(&self) -> usize {
        self.queries_run
    }

    pub fn query_build_time_nanos(&self) -> u64 {
        self.query_build_time_nanos
    }

    pub fn search_time_millis(&self) -> u64 {
        self.search_time_millis
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub(crate) fn set_slow_log(&mut self, slow_log: SlowLog) {
        self.slow_log = slow_log;
    }

    pub(crate) fn set_search_time_millis(&mut self, millis: u64) {
        self.search_time_millis = millis;
    }
}

/// Accumulates per-document matches and errors for a matcher
///
/// Fragments of one stored query share its id; the first match recorded for
/// a (document, query) pair is kept.
#[derive(Debug)]
pub struct MatchCollector<T> {
    documents: BTreeMap<String, DocumentMatches<T>>,
    errors: Vec<MatchError>,
    batch_size: usize,
}

impl<T> MatchCollector<T> {
    pub fn new(batch: &DocumentBatch) -> Self {
        Self {
            documents: BTreeMap::new(),
            errors: Vec::new(),
            batch_size: batch.len(),
        }
    }

    /// Returns `false` when the query already matched this document
    pub fn add_match(&mut self, doc_id: &str, query_id: &str, item: T) -> bool {
        let doc = self
            .documents
            .entry(doc_id.to_string())
            .or_insert_with(|| DocumentMatches::new(doc_id));
        if doc.matches.contains_key(query_id) {
            return false;
        }
        doc.matches.insert(query_id.to_string(), item);
        true
    }

    pub fn add_error(&mut self, error: MatchError) {
        self.errors.push(error);
    }

    pub fn finish(self, build_time_nanos: u64, queries_run: usize) -> Matches<T> {
        Matches {
            documents: self.documents,
            errors: self.errors,
            slow_log: SlowLog::default(),
            queries_run,
            query_build_time_nanos: build_time_nanos,
            search_time_millis: 0,
            batch_size: self.batch_size,
        }
    }
}

/// [`Matches`] plus the index terms that selected each candidate
#[derive(Debug, Clone, Serialize)]
pub struct PresearcherMatches<T> {
    pub matches: Matches<T>,
    /// Selecting `(field, term)` pairs per candidate query id
    pub selected_by: BTreeMap<String, Vec<IndexTerm>>,
}

impl<T> PresearcherMatches<T> {
    /// Terms that selected `query_id`, empty when it was selected without terms
    pub fn terms(&self, query_id: &str) -> &[IndexTerm] {
        self.selected_by.get(query_id).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::InputDocument;

    fn batch() -> DocumentBatch {
        DocumentBatch::new(vec![
            InputDocument::builder("a").build(),
            InputDocument::builder("b").build(),
        ])
        .unwrap()
    }

    #[test]
    fn test_collector_keeps_first_match() {
        let mut collector = MatchCollector::new(&batch());
        assert!(collector.add_match("a", "q1", 1));
        assert!(!collector.add_match("a", "q1", 2));
        assert!(collector.add_match("b", "q1", 3));
        collector.add_error(MatchError::new("q2", "bad"));

        let matches = collector.finish(10, 3);
        assert_eq!(matches.get("a", "q1"), Some(&1));
        assert_eq!(matches.match_count("a"), 1);
        assert_eq!(matches.match_count("missing"), 0);
        assert_eq!(matches.total_matches(), 2);
        assert_eq!(matches.errors()[0].to_string(), "q2: bad");
        assert_eq!(matches.queries_run(), 3);
        assert_eq!(matches.query_build_time_nanos(), 10);
        assert_eq!(matches.batch_size(), 2);
    }

    #[test]
    fn test_slow_log_threshold() {
        let mut log = SlowLog::new(100);
        assert!(!log.record("fast", 100));
        assert!(log.record("slow", 101));
        assert_eq!(log.len(), 1);
        assert!(log.to_string().contains("slow [101ns]"));
    }
}
