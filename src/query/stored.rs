//! Caller-registered queries

use crate::error::Result;
use crate::query::{Fingerprint, Metadata};
use serde::{Deserialize, Serialize};

/// A query registered under a caller-chosen id
///
/// Submitting another query with the same id replaces this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQuery {
    id: String,
    query: String,
    metadata: Metadata,
}

impl StoredQuery {
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw query expression
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Root content fingerprint of the expression and metadata
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::root(&self.query, &self.metadata)
    }

    /// Binary form kept alongside each index record
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
