//! API layer for percolator-rs
//!
//! This module provides the main public interface for registering queries
//! and matching documents against them.

pub mod percolator;

// Re-export main API types
pub use percolator::{Percolator, PercolatorBuilder, QueryCacheStats, QueryError};
