//! Turning raw query expressions into [`Query`] values

use crate::query::{BooleanQuery, Metadata, Query};
use crate::text::Analyzer;
use anyhow::{Result, bail};

/// Parses the raw expression of a stored query
pub trait QueryParser: Send + Sync {
    /// Fails with a descriptive error on malformed input
    fn parse(&self, query: &str, metadata: &Metadata) -> Result<Query>;
}

impl<F> QueryParser for F
where
    F: Fn(&str, &Metadata) -> Result<Query> + Send + Sync,
{
    fn parse(&self, query: &str, metadata: &Metadata) -> Result<Query> {
        self(query, metadata)
    }
}

/// Parser for whitespace-separated term clauses
///
/// Each clause is `[+|-][field:]text` or `*:*`. `+` marks a required clause,
/// `-` an excluded one, and bare clauses are optional. Clause text runs
/// through the analyzer; text that yields several terms becomes a
/// conjunction of them.
#[derive(Debug, Clone)]
pub struct TermQueryParser {
    default_field: String,
    analyzer: Analyzer,
}

enum Occur {
    Must,
    Should,
    MustNot,
}

impl TermQueryParser {
    pub fn new(default_field: impl Into<String>) -> Self {
        Self {
            default_field: default_field.into(),
            analyzer: Analyzer::standard(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    fn parse_clause(&self, token: &str) -> Result<(Occur, Query)> {
        let (occur, body) = match token.as_bytes().first() {
            Some(b'+') => (Occur::Must, &token[1..]),
            Some(b'-') => (Occur::MustNot, &token[1..]),
            _ => (Occur::Should, token),
        };
        if body.is_empty() {
            bail!("dangling operator '{}'", token);
        }
        if body == "*:*" {
            return Ok((occur, Query::MatchAll));
        }

        let (field, text) = match body.split_once(':') {
            Some((field, text)) => {
                if field.is_empty() || text.is_empty() {
                    bail!("malformed field clause '{}'", body);
                }
                (field, text)
            }
            None => (self.default_field.as_str(), body),
        };

        let mut terms = self.analyzer.tokenize(text);
        let query = match terms.len() {
            0 => bail!("clause '{}' contains no terms", body),
            1 => Query::term(field, terms.remove(0)),
            _ => Query::from(BooleanQuery {
                must: terms.into_iter().map(|t| Query::term(field, t)).collect(),
                ..Default::default()
            }),
        };
        Ok((occur, query))
    }
}

impl QueryParser for TermQueryParser {
    fn parse(&self, query: &str, _metadata: &Metadata) -> Result<Query> {
        let mut boolean = BooleanQuery::default();
        for token in query.split_whitespace() {
            let (occur, clause) = self.parse_clause(token)?;
            match occur {
                Occur::Must => boolean.must.push(clause),
                Occur::Should => boolean.should.push(clause),
                Occur::MustNot => boolean.must_not.push(clause),
            }
        }

        if boolean.is_empty() {
            bail!("empty query");
        }
        if boolean.must.is_empty() && boolean.must_not.is_empty() && boolean.should.len() == 1 {
            return Ok(boolean.should.remove(0));
        }
        Ok(Query::Boolean(boolean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Query> {
        TermQueryParser::new("field").parse(text, &Metadata::new())
    }

    #[test]
    fn test_single_term() {
        assert_eq!(parse("Test2").unwrap(), Query::term("field", "test2"));
    }

    #[test]
    fn test_disjunction() {
        let expected = Query::from(BooleanQuery {
            should: vec![Query::term("field", "test1"), Query::term("field", "test4")],
            ..Default::default()
        });
        assert_eq!(parse("test1 test4").unwrap(), expected);
    }

    #[test]
    fn test_operators_and_fields() {
        let expected = Query::from(BooleanQuery {
            must: vec![Query::term("field", "test")],
            should: vec![Query::term("title", "17")],
            must_not: vec![Query::MatchAll],
        });
        assert_eq!(parse("+test title:17 -*:*").unwrap(), expected);
    }

    #[test]
    fn test_multi_term_clause_is_conjunction() {
        let expected = Query::from(BooleanQuery {
            must: vec![Query::term("field", "foo"), Query::term("field", "bar")],
            ..Default::default()
        });
        assert_eq!(parse("foo-bar").unwrap(), expected);
    }

    #[test]
    fn test_malformed_input() {
        assert!(parse("").is_err());
        assert!(parse("+").is_err());
        assert!(parse("title:").is_err());
        assert!(parse(":x").is_err());
        assert!(parse("...").is_err());
    }

    #[test]
    fn test_closure_parser() {
        let parser = |q: &str, _: &Metadata| -> Result<Query> { Ok(Query::term("raw", q)) };
        assert_eq!(
            parser.parse("Anything", &Metadata::new()).unwrap(),
            Query::term("raw", "Anything")
        );
    }
}
