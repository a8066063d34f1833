//! Input documents and document batches

use crate::error::{PercolatorError, Result};
use crate::text::analyzer::Analyzer;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A document to match against the stored queries
///
/// Fields are analyzed when the document is built; only the resulting terms
/// are kept.
#[derive(Debug, Clone)]
pub struct InputDocument {
    id: String,
    terms: HashMap<String, HashSet<String>>,
}

/// Builder for [`InputDocument`]
#[derive(Debug)]
pub struct DocumentBuilder {
    id: String,
    analyzer: Analyzer,
    terms: HashMap<String, HashSet<String>>,
}

impl InputDocument {
    pub fn builder(id: impl Into<String>) -> DocumentBuilder {
        DocumentBuilder {
            id: id.into(),
            analyzer: Analyzer::standard(),
            terms: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether `field` contains `term` after analysis
    pub fn has_term(&self, field: &str, term: &str) -> bool {
        self.terms
            .get(field)
            .is_some_and(|terms| terms.contains(term))
    }

    /// Names of the fields holding at least one term
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }

    /// All `(field, term)` pairs of the document
    pub fn field_terms(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms.iter().flat_map(|(field, terms)| {
            terms.iter().map(move |term| (field.as_str(), term.as_str()))
        })
    }
}

impl DocumentBuilder {
    /// Analyzer used by subsequent [`DocumentBuilder::add_field`] calls
    pub fn analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn add_field(mut self, field: impl Into<String>, text: &str) -> Self {
        let tokens = self.analyzer.tokenize(text);
        self.terms.entry(field.into()).or_default().extend(tokens);
        self
    }

    pub fn add_field_with(mut self, field: impl Into<String>, text: &str, analyzer: &Analyzer) -> Self {
        let tokens = analyzer.tokenize(text);
        self.terms.entry(field.into()).or_default().extend(tokens);
        self
    }

    pub fn build(self) -> InputDocument {
        InputDocument {
            id: self.id,
            terms: self.terms,
        }
    }
}

/// One or more documents matched together in a single pass over the store
#[derive(Debug, Clone)]
pub struct DocumentBatch {
    documents: Vec<InputDocument>,
}

impl DocumentBatch {
    /// Create a batch; fails when `documents` is empty
    pub fn new(documents: Vec<InputDocument>) -> Result<Self> {
        if documents.is_empty() {
            return Err(PercolatorError::IllegalState(
                "Cannot create an empty document batch".to_string(),
            ));
        }
        Ok(Self { documents })
    }

    /// Batch holding a single document
    pub fn of(document: InputDocument) -> Self {
        Self {
            documents: vec![document],
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputDocument> {
        self.documents.iter()
    }

    pub fn get(&self, id: &str) -> Option<&InputDocument> {
        self.documents.iter().find(|doc| doc.id() == id)
    }

    /// Union of the `(field, term)` pairs of every document in the batch
    pub fn term_set(&self) -> BTreeSet<(String, String)> {
        self.documents
            .iter()
            .flat_map(|doc| doc.field_terms())
            .map(|(field, term)| (field.to_string(), term.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_terms() {
        let doc = InputDocument::builder("doc1")
            .add_field("field", "Test1 test2")
            .add_field("title", "Hello")
            .build();

        assert_eq!(doc.id(), "doc1");
        assert!(doc.has_term("field", "test1"));
        assert!(doc.has_term("title", "hello"));
        assert!(!doc.has_term("title", "test1"));
        assert!(!doc.has_term("missing", "test1"));
    }

    #[test]
    fn test_repeated_field_accumulates() {
        let doc = InputDocument::builder("doc1")
            .add_field("field", "one")
            .add_field("field", "two")
            .build();
        assert!(doc.has_term("field", "one"));
        assert!(doc.has_term("field", "two"));
    }

    #[test]
    fn test_batch_term_set() {
        let batch = DocumentBatch::new(vec![
            InputDocument::builder("a").add_field("f", "x y").build(),
            InputDocument::builder("b").add_field("f", "y z").build(),
        ])
        .unwrap();

        let terms: Vec<_> = batch.term_set().into_iter().map(|(_, t)| t).collect();
        assert_eq!(terms, vec!["x", "y", "z"]);
        assert_eq!(batch.len(), 2);
        assert!(batch.get("b").is_some());
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(DocumentBatch::new(Vec::new()).is_err());
    }
}
