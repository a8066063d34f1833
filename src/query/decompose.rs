//! Splitting queries into independently matchable pieces
//!
//! A document matches a query iff it matches at least one of the pieces the
//! decomposer returns, so a decomposer may only split along disjunctions.

use crate::query::{BooleanQuery, Query};

/// Splits a parsed query into sub-queries whose disjunction is equivalent
pub trait QueryDecomposer: Send + Sync {
    fn decompose(&self, query: Query) -> Vec<Query>;
}

/// Returns every query unchanged as a single piece
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDecomposer;

impl QueryDecomposer for IdentityDecomposer {
    fn decompose(&self, query: Query) -> Vec<Query> {
        vec![query]
    }
}

/// Splits pure disjunctions into their clauses, recursively
///
/// Exclusions of a split query are attached to each of its pieces. A boolean
/// query with exactly one required clause and no optional ones is treated as
/// that clause. Anything else is returned whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisjunctionDecomposer;

impl DisjunctionDecomposer {
    fn decompose_boolean(&self, mut boolean: BooleanQuery) -> Vec<Query> {
        let pieces = if boolean.must.is_empty() && !boolean.should.is_empty() {
            std::mem::take(&mut boolean.should)
                .into_iter()
                .flat_map(|clause| self.decompose(clause))
                .collect::<Vec<_>>()
        } else if boolean.must.len() == 1 && boolean.should.is_empty() {
            self.decompose(boolean.must.remove(0))
        } else {
            return vec![Query::Boolean(boolean)];
        };

        if boolean.must_not.is_empty() {
            return pieces;
        }
        pieces
            .into_iter()
            .map(|piece| {
                Query::from(BooleanQuery {
                    must: vec![piece],
                    should: Vec::new(),
                    must_not: boolean.must_not.clone(),
                })
            })
            .collect()
    }
}

impl QueryDecomposer for DisjunctionDecomposer {
    fn decompose(&self, query: Query) -> Vec<Query> {
        match query {
            Query::Boolean(boolean) => self.decompose_boolean(boolean),
            other => vec![other],
        }
    }
}
