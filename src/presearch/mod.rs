//! Candidate selection
//!
//! A [`CandidateSelector`] decides what gets indexed for each query fragment
//! and builds the predicate that narrows the stored fragments down to the
//! plausible matches for a document batch. Selection may over-approximate
//! but must never drop a fragment that would match.

pub mod term;

use crate::query::{Metadata, Query};
use crate::text::DocumentBatch;
use std::collections::BTreeSet;

pub use term::TermSelector;

/// A `(field, term)` pair in the query index
pub type IndexTerm = (String, String);

/// Indexable representation of one fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexableFields {
    terms: BTreeSet<IndexTerm>,
}

impl IndexableFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, term: impl Into<String>) {
        self.terms.insert((field.into(), term.into()));
    }

    pub fn terms(&self) -> impl Iterator<Item = &IndexTerm> {
        self.terms.iter()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl FromIterator<IndexTerm> for IndexableFields {
    fn from_iter<I: IntoIterator<Item = IndexTerm>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
        }
    }
}

/// Predicate executed against the query index for one document batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPredicate {
    /// Every live record is a candidate
    All,
    /// Records indexed under at least one of these terms
    AnyTerm(BTreeSet<IndexTerm>),
}

/// Pluggable candidate-selection strategy
pub trait CandidateSelector: Send + Sync {
    /// Indexable representation of a compiled fragment
    fn build_indexable(&self, query: &Query, metadata: &Metadata) -> IndexableFields;

    /// Selection predicate over the terms of a document batch
    fn build_predicate(&self, batch: &DocumentBatch) -> SelectionPredicate;
}

/// Selects every stored fragment for every document
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAllSelector;

impl CandidateSelector for MatchAllSelector {
    fn build_indexable(&self, _query: &Query, _metadata: &Metadata) -> IndexableFields {
        IndexableFields::new()
    }

    fn build_predicate(&self, _batch: &DocumentBatch) -> SelectionPredicate {
        SelectionPredicate::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::InputDocument;

    #[test]
    fn test_match_all_selector() {
        let batch = DocumentBatch::of(InputDocument::builder("d").add_field("f", "x").build());
        assert_eq!(MatchAllSelector.build_predicate(&batch), SelectionPredicate::All);
        assert!(MatchAllSelector
            .build_indexable(&Query::term("f", "x"), &Metadata::new())
            .is_empty());
    }

    #[test]
    fn test_indexable_fields_dedupe() {
        let mut fields = IndexableFields::new();
        fields.add("f", "a");
        fields.add("f", "a");
        fields.add("g", "a");
        assert_eq!(fields.len(), 2);
    }
}
