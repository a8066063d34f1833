//! # percolator-rs
//!
//! A stored-query matching engine: register a large set of queries once,
//! then stream documents through it to find which queries each document
//! matches.
//!
//! Queries are decomposed into fingerprinted fragments, indexed in an
//! embedded SQLite store for cheap candidate selection, and kept compiled in
//! an in-memory cache for exact evaluation. A background task periodically
//! rebuilds the cache to reclaim memory held by deleted queries.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use percolator::{
//!     InputDocument, Percolator, SimpleMatcherFactory, StoredQuery, TermQueryParser, TermSelector,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let percolator = Percolator::new(TermQueryParser::new("body"), TermSelector)?;
//!
//!     let rejected = percolator.submit(vec![
//!         StoredQuery::new("rust", "+rust -oxidation"),
//!         StoredQuery::new("db", "sqlite postgres"),
//!     ])?;
//!     assert!(rejected.is_empty());
//!
//!     let doc = InputDocument::builder("doc1")
//!         .add_field("body", "Embedding SQLite in a Rust service")
//!         .build();
//!     let matches = percolator.match_document(doc, &SimpleMatcherFactory)?;
//!
//!     println!("{} queries matched", matches.match_count("doc1"));
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod matchers;
pub mod presearch;
pub mod query;
pub mod scheduler;
pub mod storage;
pub mod text;

// Re-export main API types
pub use api::{Percolator, PercolatorBuilder, QueryCacheStats, QueryError};
pub use config::{PercolatorConfig, TimeUnit};
pub use error::{PercolatorError, Result};
pub use events::UpdateListener;

// Re-export commonly used types
pub use matchers::{
    CandidateMatcher, MatchError, MatcherFactory, Matches, PresearcherMatches, QueryMatch,
    SimpleMatcherFactory,
};
pub use presearch::{CandidateSelector, MatchAllSelector, TermSelector};
pub use query::{
    DisjunctionDecomposer, IdentityDecomposer, Metadata, Query, QueryDecomposer, QueryParser,
    StoredQuery, TermQueryParser,
};
pub use text::{Analyzer, DocumentBatch, InputDocument};
