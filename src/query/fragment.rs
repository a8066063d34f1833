//! Decomposing stored queries into cacheable fragments

use crate::query::{Fingerprint, Metadata, Query, QueryDecomposer, QueryParser, StoredQuery};
use anyhow::{Context, Result, bail};
use std::sync::Arc;

/// One independently evaluable piece of a stored query; the unit of caching
#[derive(Debug, Clone)]
pub struct QueryFragment {
    fingerprint: Fingerprint,
    query: Query,
    metadata: Arc<Metadata>,
}

impl QueryFragment {
    pub fn new(fingerprint: Fingerprint, query: Query, metadata: Arc<Metadata>) -> Self {
        Self {
            fingerprint,
            query,
            metadata,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Metadata inherited from the owning stored query
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Parses and decomposes stored queries into fingerprinted fragments
#[derive(Clone)]
pub struct FragmentBuilder {
    parser: Arc<dyn QueryParser>,
    decomposer: Arc<dyn QueryDecomposer>,
}

impl FragmentBuilder {
    pub fn new(parser: Arc<dyn QueryParser>, decomposer: Arc<dyn QueryDecomposer>) -> Self {
        Self { parser, decomposer }
    }

    /// Fragments of `query`, fingerprinted `root_0`, `root_1`, ...
    pub fn build(&self, query: &StoredQuery) -> Result<Vec<Arc<QueryFragment>>> {
        let parsed = self
            .parser
            .parse(query.query(), query.metadata())
            .with_context(|| format!("failed to parse query '{}'", query.id()))?;

        let root = query.fingerprint();
        let metadata = Arc::new(query.metadata().clone());
        let fragments: Vec<_> = self
            .decomposer
            .decompose(parsed)
            .into_iter()
            .enumerate()
            .map(|(ordinal, sub)| {
                Arc::new(QueryFragment::new(root.fragment(ordinal), sub, metadata.clone()))
            })
            .collect();

        if fragments.is_empty() {
            bail!("query '{}' decomposed into no fragments", query.id());
        }
        Ok(fragments)
    }
}
