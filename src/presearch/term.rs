//! Term-extraction candidate selection

use crate::presearch::{CandidateSelector, IndexTerm, IndexableFields, SelectionPredicate};
use crate::query::{Metadata, Query};
use crate::text::DocumentBatch;

/// Field of the marker term indexed for fragments with no usable terms
pub const ANY_TOKEN_FIELD: &str = "__anytokenfield";

/// Marker term indexed for fragments with no usable terms
pub const ANY_TOKEN: &str = "__ANYTOKEN__";

/// Indexes each fragment under terms a matching document must contain
///
/// A conjunction is indexed under its most selective required clause, a
/// disjunction under the union of its clauses. Fragments that cannot be
/// restricted this way (`*:*`, pure exclusions) are indexed under a marker
/// term that every predicate includes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermSelector;

impl TermSelector {
    /// `None` means the query cannot be restricted to any term set
    fn extract(query: &Query) -> Option<Vec<IndexTerm>> {
        match query {
            Query::MatchAll => None,
            Query::Term { field, term } => Some(vec![(field.clone(), term.clone())]),
            Query::Boolean(boolean) if !boolean.must.is_empty() => boolean
                .must
                .iter()
                .filter_map(Self::extract)
                .min_by_key(|terms| {
                    let longest = terms.iter().map(|(_, t)| t.len()).max().unwrap_or(0);
                    (terms.len(), std::cmp::Reverse(longest))
                }),
            Query::Boolean(boolean) if !boolean.should.is_empty() => {
                let mut terms = Vec::new();
                for clause in &boolean.should {
                    terms.extend(Self::extract(clause)?);
                }
                Some(terms)
            }
            Query::Boolean(_) => None,
        }
    }
}

impl CandidateSelector for TermSelector {
    fn build_indexable(&self, query: &Query, _metadata: &Metadata) -> IndexableFields {
        match Self::extract(query) {
            Some(terms) => terms.into_iter().collect(),
            None => {
                let mut fields = IndexableFields::new();
                fields.add(ANY_TOKEN_FIELD, ANY_TOKEN);
                fields
            }
        }
    }

    fn build_predicate(&self, batch: &DocumentBatch) -> SelectionPredicate {
        let mut terms = batch.term_set();
        terms.insert((ANY_TOKEN_FIELD.to_string(), ANY_TOKEN.to_string()));
        SelectionPredicate::AnyTerm(terms)
    }
}
