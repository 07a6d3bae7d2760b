//! Search URL parsing: splits the URL, decodes parameters and assembles the query.
//!
//! Parameters are processed in the order they appear. Filtering parameters
//! contribute one expression each; the contributions are AND-ed into
//! [`SearchQuery::filter`]. Result-control parameters (`_sort`, `_count`,
//! `_include`, ...) set their own fields. Other `_`-prefixed parameters are
//! ignored.

use std::borrow::Cow;

use tracing::{debug, trace};

use crate::ast::{Expression, SearchQuery};
use crate::config::ParserConfig;
use crate::control::Control;
use crate::error::{SearchError, SearchResult};
use crate::filter::parse_filter_with_depth;
use crate::join::JoinBuilder;
use crate::param::ParamName;
use crate::result::ParseResult;

/// `_`-prefixed parameters that filter like ordinary ones.
const RESOURCE_PARAMS: &[&str] = &[
    "_id",
    "_lastUpdated",
    "_tag",
    "_profile",
    "_security",
    "_source",
    "_text",
    "_content",
    "_list",
    "_query",
    "_type",
];

/// A search URL parser with a fixed configuration.
///
/// # Example
///
/// ```rust
/// use fhir_search::{ParserConfig, SearchParser};
///
/// let parser = SearchParser::with_config(
///     ParserConfig::builder().with_chain_target("focus", "Condition").build(),
/// );
/// let query = parser.parse_query("/Observation?focus.code=1234-5").unwrap();
/// assert_eq!(query.resource, "Observation");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchParser {
    config: ParserConfig,
}

impl SearchParser {
    /// A parser with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// A parser with the given configuration.
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// The parser's configuration.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses a search URL, reporting failure inside the result.
    pub fn parse(&self, url: &str) -> ParseResult {
        let result = self.parse_query(url);
        if let Err(ref err) = result {
            debug!(url, error = %err, "search url rejected");
        }
        result.into()
    }

    /// Parses a search URL.
    ///
    /// # Errors
    ///
    /// The first structural error met. Errors raised while handling a
    /// parameter are wrapped in [`SearchError::Parameter`].
    pub fn parse_query(&self, url: &str) -> SearchResult<SearchQuery> {
        let (path, query_string) = split_url(url);
        let resource = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .last()
            .ok_or(SearchError::MissingResourceType)?;

        let mut query = SearchQuery::new(resource);
        let mut contributions = Vec::new();

        for (key, value) in decode_pairs(query_string)? {
            if let Some(expr) = self
                .dispatch(&key, &value, &mut query)
                .map_err(|err| err.in_parameter(key.as_str(), value.as_str()))?
            {
                contributions.push(expr);
            }
        }

        query.filter = Expression::all(contributions);
        Ok(query)
    }

    /// Handles one decoded parameter. Filtering parameters return their
    /// expression; control parameters update `query` and return `None`.
    fn dispatch(
        &self,
        key: &str,
        value: &str,
        query: &mut SearchQuery,
    ) -> SearchResult<Option<Expression>> {
        if key == "_filter" {
            trace!(key, "filter expression");
            return parse_filter_with_depth(value, self.config.max_depth).map(Some);
        }

        if is_filter_key(key) {
            trace!(key, "filter parameter");
            let name = ParamName::parse_with_depth(key, self.config.max_depth)?;
            return JoinBuilder::new(&self.config).build(&name, value).map(Some);
        }

        match Control::from_key(key) {
            Some(control) => {
                trace!(key, "control parameter");
                control.apply(key, value, self.config.max_depth, query)?;
            }
            None => debug!(key, "ignoring unsupported parameter"),
        }
        Ok(None)
    }
}

/// True for keys handled as filtering parameters (other than `_filter`).
pub(crate) fn is_filter_key(key: &str) -> bool {
    if !key.starts_with('_') || key.starts_with("_has:") {
        return true;
    }
    let end = key.find([':', '.']).unwrap_or(key.len());
    RESOURCE_PARAMS.contains(&&key[..end])
}

/// Splits off the fragment and query string, and strips scheme and host
/// from absolute URLs.
fn split_url(url: &str) -> (&str, &str) {
    let url = url.trim();
    let url = url.split_once('#').map_or(url, |(before, _)| before);
    let (path, query_string) = url.split_once('?').unwrap_or((url, ""));
    let path = match path.split_once("://") {
        Some((_, after_scheme)) => after_scheme.find('/').map_or("", |i| &after_scheme[i..]),
        None => path,
    };
    (path, query_string)
}

/// Decodes `key=value` pairs in order. A pair without `=` has an empty value.
fn decode_pairs(query_string: &str) -> SearchResult<Vec<(String, String)>> {
    query_string
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode(key)?.into_owned(), decode(value)?.into_owned()))
        })
        .collect()
}

fn decode(raw: &str) -> SearchResult<Cow<'_, str>> {
    if !raw.contains(['%', '+']) {
        return Ok(Cow::Borrowed(raw));
    }
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| Cow::Owned(decoded.into_owned()))
        .map_err(|_| SearchError::InvalidEncoding(raw.to_string()))
}

/// Parses a search URL with the default configuration.
///
/// Never fails: errors are reported inside the [`ParseResult`].
///
/// # Examples
///
/// ```rust
/// use fhir_search::{parse, Expression};
///
/// let result = parse("/Patient?name=John,Peter");
/// let query = result.query().unwrap();
/// assert!(matches!(query.filter, Some(Expression::Or(ref c)) if c.len() == 2));
/// ```
pub fn parse(url: &str) -> ParseResult {
    SearchParser::new().parse(url)
}

/// Parses a search URL with the default configuration, as a `Result`.
///
/// # Examples
///
/// ```rust
/// use fhir_search::parse_query;
///
/// let query = parse_query("/Patient?_count=10&_sort=-birthdate").unwrap();
/// assert_eq!(query.count, Some(10));
/// ```
pub fn parse_query(url: &str) -> SearchResult<SearchQuery> {
    SearchParser::new().parse_query(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DatePrecision, JoinKind, Operator, Value};

    mod urls {
        use super::*;

        #[test]
        fn test_split_relative() {
            assert_eq!(split_url("/Patient?name=x"), ("/Patient", "name=x"));
            assert_eq!(split_url("Patient"), ("Patient", ""));
        }

        #[test]
        fn test_split_absolute() {
            assert_eq!(
                split_url("https://example.org/fhir/Patient?name=x#top"),
                ("/fhir/Patient", "name=x")
            );
        }

        #[test]
        fn test_resource_is_last_segment() {
            let query = parse_query("http://example.org/fhir/Observation/").unwrap();
            assert_eq!(query.resource, "Observation");
        }

        #[test]
        fn test_missing_resource() {
            assert_eq!(parse_query("/?name=x"), Err(SearchError::MissingResourceType));
            assert_eq!(parse_query(""), Err(SearchError::MissingResourceType));
        }
    }

    mod decoding {
        use super::*;

        #[test]
        fn test_plus_and_percent() {
            let pairs = decode_pairs("name=John+Smith&family=O%27Brien").unwrap();
            assert_eq!(
                pairs,
                vec![
                    ("name".to_string(), "John Smith".to_string()),
                    ("family".to_string(), "O'Brien".to_string()),
                ]
            );
        }

        #[test]
        fn test_encoded_separators_are_literal() {
            let pairs = decode_pairs("_has%3AObservation%3Apatient%3Acode=a%26b").unwrap();
            assert_eq!(pairs[0].0, "_has:Observation:patient:code");
            assert_eq!(pairs[0].1, "a&b");
        }

        #[test]
        fn test_invalid_utf8() {
            let err = decode_pairs("name=%FF").unwrap_err();
            assert_eq!(err, SearchError::InvalidEncoding("%FF".to_string()));
        }

        #[test]
        fn test_empty_pairs_skipped() {
            let pairs = decode_pairs("&a=1&&b&").unwrap();
            assert_eq!(
                pairs,
                vec![
                    ("a".to_string(), "1".to_string()),
                    ("b".to_string(), String::new()),
                ]
            );
        }
    }

    mod assembly {
        use super::*;

        #[test]
        fn test_resource_only() {
            assert_eq!(parse_query("/Patient").unwrap(), SearchQuery::new("Patient"));
        }

        #[test]
        fn test_single_parameter_is_bare() {
            let query = parse_query("/Patient?name=John").unwrap();
            assert_eq!(
                query.filter,
                Some(Expression::compare(
                    Operator::Equal,
                    "name",
                    Value::string("John")
                ))
            );
        }

        #[test]
        fn test_distinct_keys_are_anded() {
            let query = parse_query("/Patient?name=John&birthdate=ge2010-01-01").unwrap();
            assert_eq!(
                query.filter,
                Some(Expression::And(vec![
                    Expression::compare(Operator::Equal, "name", Value::string("John")),
                    Expression::compare(
                        Operator::GreaterOrEqual,
                        "birthdate",
                        Value::date("2010-01-01", DatePrecision::Day)
                    ),
                ]))
            );
        }

        #[test]
        fn test_filter_parameter_joins_top_level_and() {
            let query = parse_query("/Patient?_filter=name eq x and gender eq y&active=true").unwrap();
            match query.filter {
                Some(Expression::And(children)) => assert_eq!(children.len(), 3),
                other => panic!("Expected And, got {:?}", other),
            }
        }

        #[test]
        fn test_resource_level_underscore_params_filter() {
            let query = parse_query("/Patient?_id=123&_lastUpdated=gt2020").unwrap();
            match query.filter {
                Some(Expression::And(children)) => {
                    assert_eq!(children[0].kind(), "=");
                    assert_eq!(children[1].kind(), ">");
                }
                other => panic!("Expected And, got {:?}", other),
            }
        }

        #[test]
        fn test_unknown_control_ignored() {
            let query = parse_query("/Patient?_format=json&_pretty=true").unwrap();
            assert_eq!(query, SearchQuery::new("Patient"));
        }

        #[test]
        fn test_controls_and_filters_together() {
            let query =
                parse_query("/Observation?code=1234-5&_count=5&_include=Observation:subject")
                    .unwrap();
            assert_eq!(query.count, Some(5));
            assert_eq!(query.includes.len(), 1);
            assert!(matches!(query.filter, Some(Expression::Compare(_))));
        }

        #[test]
        fn test_reverse_chain() {
            let query = parse_query("/Patient?_has:Observation:patient:code=1234-5").unwrap();
            match query.filter {
                Some(Expression::Join(join)) => {
                    assert_eq!(join.resource, "Observation");
                    assert_eq!(join.on.kind, JoinKind::ReverseReference);
                }
                other => panic!("Expected Join, got {:?}", other),
            }
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_error_carries_parameter() {
            let err = parse_query("/Patient?name=x&_has:invalid").unwrap_err();
            match err {
                SearchError::Parameter {
                    parameter, source, ..
                } => {
                    assert_eq!(parameter, "_has:invalid");
                    assert!(matches!(*source, SearchError::InvalidReverseChain { .. }));
                }
                other => panic!("Expected Parameter, got {:?}", other),
            }
        }

        #[test]
        fn test_filter_error_position() {
            let result = parse("/Patient?_filter=name eq 'John");
            let error = &result.errors()[0];
            assert_eq!(error.position, Some(8));
            assert_eq!(error.parameter.as_deref(), Some("_filter"));
        }

        #[test]
        fn test_invalid_count() {
            let result = parse("/Patient?_count=many");
            assert!(result.query().is_none());
            assert_eq!(result.errors()[0].value.as_deref(), Some("many"));
        }

        #[test]
        fn test_configured_depth() {
            let parser = SearchParser::with_config(ParserConfig::builder().with_max_depth(1).build());
            assert!(parser.parse_query("/Observation?subject.name=x").is_ok());
            assert!(parser
                .parse_query("/Observation?subject.organization.name=x")
                .is_err());
        }
    }
}
