//! Error types for search query parsing.

use thiserror::Error;

/// Errors that can occur while parsing a search URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The URL path has no resource type segment.
    #[error("no resource type specified in URL")]
    MissingResourceType,

    /// A query-string key or value did not decode to valid UTF-8.
    #[error("invalid percent-encoding in '{0}'")]
    InvalidEncoding(String),

    /// A `_has` parameter without the `Type:param:` header.
    #[error("invalid _has reverse-chain structure: {reason}")]
    InvalidReverseChain {
        /// What is wrong with the header.
        reason: String,
    },

    /// A quoted string in a filter expression was never closed.
    #[error("unterminated string starting at position {position}")]
    UnterminatedString {
        /// Offset of the opening quote.
        position: usize,
    },

    /// A character the filter tokenizer does not recognise.
    #[error("unexpected character '{character}' at position {position}")]
    UnexpectedCharacter {
        /// The offending character.
        character: char,
        /// Offset of the character.
        position: usize,
    },

    /// A token that cannot start or continue the filter expression.
    #[error("unexpected token '{token}' at position {position}")]
    UnexpectedToken {
        /// Text of the token (empty at end of input).
        token: String,
        /// Offset of the token.
        position: usize,
    },

    /// Tokens left over after a complete filter expression.
    #[error("unexpected token after expression: '{token}' at position {position}")]
    TrailingInput {
        /// Text of the first left-over token.
        token: String,
        /// Offset of the token.
        position: usize,
    },

    /// A filter parameter path not followed by a comparison operator.
    #[error("expected operator after parameter '{param}' but found '{found}' at position {position}")]
    ExpectedOperator {
        /// The parameter path.
        param: String,
        /// Text of the token found instead.
        found: String,
        /// Offset of the token.
        position: usize,
    },

    /// A filter comparison operator not followed by a value.
    #[error("expected value but found '{found}' at position {position}")]
    ExpectedValue {
        /// Text of the token found instead.
        found: String,
        /// Offset of the token.
        position: usize,
    },

    /// Nesting (groups, `not`, chain hops, `_has`) exceeded the configured limit.
    #[error("nesting exceeds the maximum depth of {limit}")]
    NestingTooDeep {
        /// The configured maximum depth.
        limit: usize,
        /// Offset inside a filter expression, when the nesting came from one.
        position: Option<usize>,
    },

    /// A control parameter (`_count`, `_summary`, ...) with a value outside its domain.
    #[error("invalid {parameter} value: '{value}'")]
    InvalidControlValue {
        /// Parameter name.
        parameter: String,
        /// The rejected value.
        value: String,
    },

    /// An AST that has no query-string rendering.
    #[error("cannot render as a query string: {0}")]
    Unrepresentable(String),

    /// An error raised while processing one query parameter.
    #[error("parameter '{parameter}': {source}")]
    Parameter {
        /// The decoded parameter key.
        parameter: String,
        /// The decoded parameter value.
        value: String,
        /// The underlying error.
        #[source]
        source: Box<SearchError>,
    },
}

impl SearchError {
    /// Wraps this error with the query parameter it came from.
    pub fn in_parameter(self, parameter: impl Into<String>, value: impl Into<String>) -> Self {
        SearchError::Parameter {
            parameter: parameter.into(),
            value: value.into(),
            source: Box::new(self),
        }
    }

    /// Character offset within a filter expression, if the error has one.
    pub fn position(&self) -> Option<usize> {
        match self {
            SearchError::UnterminatedString { position }
            | SearchError::UnexpectedCharacter { position, .. }
            | SearchError::UnexpectedToken { position, .. }
            | SearchError::TrailingInput { position, .. }
            | SearchError::ExpectedOperator { position, .. }
            | SearchError::ExpectedValue { position, .. } => Some(*position),
            SearchError::NestingTooDeep { position, .. } => *position,
            SearchError::Parameter { source, .. } => source.position(),
            _ => None,
        }
    }
}

/// Result type for search parsing operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// A user-facing parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// Character offset inside a `_filter` expression.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub position: Option<usize>,
    /// The query parameter being processed.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub parameter: Option<String>,
    /// The raw value of that parameter.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub value: Option<String>,
}

impl From<SearchError> for ParseError {
    fn from(err: SearchError) -> Self {
        let position = err.position();
        match err {
            SearchError::Parameter {
                parameter,
                value,
                source,
            } => ParseError {
                message: source.to_string(),
                position,
                parameter: Some(parameter),
                value: Some(value),
            },
            other => ParseError {
                message: other.to_string(),
                position,
                parameter: None,
                value: None,
            },
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref parameter) = self.parameter {
            write!(f, "{}: ", parameter)?;
        }
        write!(f, "{}", self.message)
    }
}
