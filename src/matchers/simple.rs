//! Boolean matcher reporting which queries matched each document

use crate::matchers::{CandidateMatcher, MatchCollector, MatchError, Matches, MatcherFactory};
use crate::query::{Metadata, Query};
use crate::text::DocumentBatch;
use serde::Serialize;

/// A query that matched a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryMatch {
    pub query_id: String,
}

impl QueryMatch {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
        }
    }
}

/// Evaluates each candidate against every document of the batch
pub struct SimpleMatcher<'a> {
    docs: &'a DocumentBatch,
    collector: MatchCollector<QueryMatch>,
}

impl<'a> SimpleMatcher<'a> {
    pub fn new(docs: &'a DocumentBatch) -> Self {
        Self {
            docs,
            collector: MatchCollector::new(docs),
        }
    }
}

impl CandidateMatcher<QueryMatch> for SimpleMatcher<'_> {
    fn match_query(&mut self, query_id: &str, query: &Query, _metadata: &Metadata) -> anyhow::Result<()> {
        for doc in self.docs.iter() {
            if query.matches(doc) {
                self.collector.add_match(doc.id(), query_id, QueryMatch::new(query_id));
            }
        }
        Ok(())
    }

    fn report_error(&mut self, error: MatchError) {
        self.collector.add_error(error);
    }

    fn finish(self: Box<Self>, build_time_nanos: u64, queries_run: usize) -> Matches<QueryMatch> {
        self.collector.finish(build_time_nanos, queries_run)
    }
}

/// Factory for [`SimpleMatcher`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleMatcherFactory;

impl MatcherFactory<QueryMatch> for SimpleMatcherFactory {
    fn create_matcher<'a>(&self, docs: &'a DocumentBatch) -> Box<dyn CandidateMatcher<QueryMatch> + 'a> {
        Box::new(SimpleMatcher::new(docs))
    }
}
