//! Document text processing for percolator-rs
//!
//! This module turns raw document fields into the analyzed term sets that
//! candidate selection and query evaluation work on.

pub mod analyzer;
pub mod document;

// Re-export main types and functions
pub use analyzer::Analyzer;
pub use document::{DocumentBatch, DocumentBuilder, InputDocument};
