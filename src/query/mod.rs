//! Queries: the structured form, stored originals, fingerprints and fragments
//!
//! A [`StoredQuery`] is what callers register. It is parsed into a [`Query`],
//! split by a [`QueryDecomposer`] into independently matchable pieces, and
//! each piece becomes a content-addressed [`QueryFragment`].

pub mod decompose;
pub mod fingerprint;
pub mod fragment;
pub mod parser;
pub mod stored;

use crate::text::InputDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Re-export main types
pub use decompose::{DisjunctionDecomposer, IdentityDecomposer, QueryDecomposer};
pub use fingerprint::Fingerprint;
pub use fragment::{FragmentBuilder, QueryFragment};
pub use parser::{QueryParser, TermQueryParser};
pub use stored::StoredQuery;

/// Opaque key/value metadata attached to a stored query
pub type Metadata = BTreeMap<String, String>;

/// Structured, executable query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Query {
    /// Matches every document
    MatchAll,
    /// Matches documents whose `field` contains `term`
    Term { field: String, term: String },
    /// Combination of sub-queries
    Boolean(BooleanQuery),
}

/// Boolean combination of clauses
///
/// With at least one `must` clause the `should` clauses are optional; with
/// none, at least one `should` clause has to match. A query made only of
/// `must_not` clauses matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BooleanQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
}

impl Query {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    /// Exact evaluation against one analyzed document
    pub fn matches(&self, doc: &InputDocument) -> bool {
        match self {
            Query::MatchAll => true,
            Query::Term { field, term } => doc.has_term(field, term),
            Query::Boolean(boolean) => boolean.matches(doc),
        }
    }
}

impl BooleanQuery {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    pub fn matches(&self, doc: &InputDocument) -> bool {
        if self.must_not.iter().any(|q| q.matches(doc)) {
            return false;
        }
        if !self.must.is_empty() {
            return self.must.iter().all(|q| q.matches(doc));
        }
        self.should.iter().any(|q| q.matches(doc))
    }
}

impl From<BooleanQuery> for Query {
    fn from(boolean: BooleanQuery) -> Self {
        Query::Boolean(boolean)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::MatchAll => write!(f, "*:*"),
            Query::Term { field, term } => write!(f, "{}:{}", field, term),
            Query::Boolean(boolean) => {
                let clauses = boolean
                    .must
                    .iter()
                    .map(|q| format!("+{}", q))
                    .chain(boolean.should.iter().map(|q| q.to_string()))
                    .chain(boolean.must_not.iter().map(|q| format!("-{}", q)))
                    .collect::<Vec<_>>();
                write!(f, "({})", clauses.join(" "))
            }
        }
    }
}
