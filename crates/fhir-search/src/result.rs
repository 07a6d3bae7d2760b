//! Parse result type returned by the non-failing entry points.

use crate::ast::SearchQuery;
use crate::error::{ParseError, SearchResult};

/// Outcome of parsing a search URL: a query, or the errors that stopped it.
///
/// Exactly one side is populated. Parsing stops at the first error, so a
/// failed result currently carries one entry.
///
/// # Example
///
/// ```rust
/// let result = fhir_search::parse("/Patient?_has:invalid");
/// assert!(!result.is_ok());
/// assert!(result.errors()[0].message.contains("reverse-chain"));
///
/// let result = fhir_search::parse("/Patient?name=John");
/// assert_eq!(result.query().map(|q| q.resource.as_str()), Some("Patient"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParseResult {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    query: Option<SearchQuery>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    errors: Vec<ParseError>,
}

impl ParseResult {
    /// A successful result.
    pub fn success(query: SearchQuery) -> Self {
        Self {
            query: Some(query),
            errors: Vec::new(),
        }
    }

    /// A failed result.
    pub fn failure(error: impl Into<ParseError>) -> Self {
        Self {
            query: None,
            errors: vec![error.into()],
        }
    }

    /// The parsed query, if parsing succeeded.
    pub fn query(&self) -> Option<&SearchQuery> {
        self.query.as_ref()
    }

    /// The errors, empty on success.
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// True when a query was produced.
    pub fn is_ok(&self) -> bool {
        self.query.is_some()
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<SearchQuery, Vec<ParseError>> {
        match self.query {
            Some(query) => Ok(query),
            None => Err(self.errors),
        }
    }
}

impl From<SearchResult<SearchQuery>> for ParseResult {
    fn from(result: SearchResult<SearchQuery>) -> Self {
        match result {
            Ok(query) => ParseResult::success(query),
            Err(err) => ParseResult::failure(err),
        }
    }
}
