//! Tokenization shared by documents and the reference query parser

use crate::error::{PercolatorError, Result};
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is a valid regex"));

/// Splits text into normalized terms
///
/// Text is NFKC-normalized and lowercased before the token pattern runs, so
/// `"Ｔｅｓｔ"` and `"test"` produce the same term.
#[derive(Debug, Clone)]
pub struct Analyzer {
    token_pattern: Regex,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::standard()
    }
}

impl Analyzer {
    /// Word-character tokenizer
    pub fn standard() -> Self {
        Self {
            token_pattern: WORD_PATTERN.clone(),
        }
    }

    /// Tokenizer that emits every match of `pattern` as a term
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let token_pattern = Regex::new(pattern).map_err(|e| {
            PercolatorError::Config(format!("Invalid token pattern '{}': {}", pattern, e))
        })?;
        Ok(Self { token_pattern })
    }

    /// Produce the terms of `text` in order of appearance
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized: String = text.nfkc().collect::<String>().to_lowercase();
        self.token_pattern
            .find_iter(&normalized)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tokenization() {
        let analyzer = Analyzer::standard();
        assert_eq!(
            analyzer.tokenize("Test1, test2 -- TEST3!"),
            vec!["test1", "test2", "test3"]
        );
        assert!(analyzer.tokenize("  ,;  ").is_empty());
    }

    #[test]
    fn test_nfkc_normalization() {
        let analyzer = Analyzer::standard();
        assert_eq!(analyzer.tokenize("Ｔｅｓｔ"), vec!["test"]);
    }

    #[test]
    fn test_custom_pattern() {
        let analyzer = Analyzer::with_pattern(r"[^\s]+").unwrap();
        assert_eq!(analyzer.tokenize("foo-bar baz"), vec!["foo-bar", "baz"]);
        assert!(Analyzer::with_pattern("(").is_err());
    }
}
