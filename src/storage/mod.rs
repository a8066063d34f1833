//! Persistent query store for percolator-rs
//!
//! This module provides the durable record of every query fragment using
//! embedded SQLite. It knows nothing about the compiled-query cache; see
//! [`crate::index`] for the layer that keeps the two consistent.

pub mod database;
pub mod migrations;
pub mod schema;

// Re-export main types
pub use database::{RecordStore, StoreStats};

use crate::presearch::{IndexTerm, IndexableFields};
use crate::query::{Fingerprint, QueryFragment};
use std::sync::Arc;

/// Persisted, searchable representation of one query fragment
#[derive(Debug, Clone)]
pub struct IndexRecord {
    query_id: String,
    fragment: Arc<QueryFragment>,
    indexable: IndexableFields,
    original: Option<Vec<u8>>,
}

impl IndexRecord {
    pub fn new(
        query_id: impl Into<String>,
        fragment: Arc<QueryFragment>,
        indexable: IndexableFields,
        original: Option<Vec<u8>>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            fragment,
            indexable,
            original,
        }
    }

    /// Owning query id; also the deletion tag
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        self.fragment.fingerprint()
    }

    pub fn fragment(&self) -> &Arc<QueryFragment> {
        &self.fragment
    }

    pub fn indexable(&self) -> &IndexableFields {
        &self.indexable
    }

    /// Serialized original stored query, when originals are retained
    pub fn original(&self) -> Option<&[u8]> {
        self.original.as_deref()
    }
}

/// A live record as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub row_id: i64,
    pub query_id: String,
    pub fingerprint: Fingerprint,
    pub original: Option<Vec<u8>>,
    /// Index terms that selected this record; empty for scans
    pub matched_terms: Vec<IndexTerm>,
}

/// Deletion buffered until the next commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeleteTarget {
    Tag(String),
    All,
}
