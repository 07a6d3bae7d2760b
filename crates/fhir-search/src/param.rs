//! Search parameter name grammar.
//!
//! `:` and `.` each play more than one role in a parameter key, so a key is
//! decomposed by an ordered decision table (first match wins):
//!
//! | # | Shape | Result |
//! |---|-------|--------|
//! | 1 | `_has:Type:param:rest` | reverse chain; `rest` is decomposed again |
//! | 2 | `ref.a.b` (no `:` before the first `.`) | forward chain, target type inferred later |
//! | 3 | `ref:Type.a.b` | forward chain with explicit target type |
//! | 4 | `name:exact` (known modifier) | modifier parameter |
//! | 5 | `name` | plain parameter |
//!
//! A `:` token that is neither a known modifier nor followed by `.` is kept
//! as a type modifier (`subject:Patient=123`). Reordering the rows changes
//! the meaning of keys like `subject:Patient.name`.

use crate::ast::Operator;
use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{SearchError, SearchResult};

const REVERSE_CHAIN_PREFIX: &str = "_has:";

/// A parameter modifier: the text after `:` in `name:modifier`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// `:exact`
    Exact,
    /// `:contains`
    Contains,
    /// `:missing`
    Missing,
    /// `:text`
    Text,
    /// `:in`
    In,
    /// `:not-in`
    NotIn,
    /// `:above`
    Above,
    /// `:below`
    Below,
    /// `:not`
    Not,
    /// `:identifier`
    Identifier,
    /// `:of-type`
    OfType,
    /// A resource type constraint (`subject:Patient`), or any unrecognised token.
    Type(String),
}

impl Modifier {
    /// Looks up a modifier from the fixed vocabulary.
    pub fn known(text: &str) -> Option<Self> {
        Some(match text {
            "exact" => Modifier::Exact,
            "contains" => Modifier::Contains,
            "missing" => Modifier::Missing,
            "text" => Modifier::Text,
            "in" => Modifier::In,
            "not-in" => Modifier::NotIn,
            "above" => Modifier::Above,
            "below" => Modifier::Below,
            "not" => Modifier::Not,
            "identifier" => Modifier::Identifier,
            "of-type" => Modifier::OfType,
            _ => return None,
        })
    }

    /// A known modifier, or a type modifier for anything else.
    pub fn parse(text: &str) -> Self {
        Modifier::known(text).unwrap_or_else(|| Modifier::Type(text.to_string()))
    }

    /// The text after the `:`.
    pub fn as_str(&self) -> &str {
        match self {
            Modifier::Exact => "exact",
            Modifier::Contains => "contains",
            Modifier::Missing => "missing",
            Modifier::Text => "text",
            Modifier::In => "in",
            Modifier::NotIn => "not-in",
            Modifier::Above => "above",
            Modifier::Below => "below",
            Modifier::Not => "not",
            Modifier::Identifier => "identifier",
            Modifier::OfType => "of-type",
            Modifier::Type(t) => t,
        }
    }

    /// The comparison operator this modifier selects, if any.
    pub fn operator(&self) -> Option<Operator> {
        Some(match self {
            Modifier::Exact => Operator::Exact,
            Modifier::Contains => Operator::Contains,
            Modifier::Missing => Operator::Missing,
            Modifier::Text => Operator::Text,
            Modifier::In => Operator::In,
            Modifier::NotIn => Operator::NotIn,
            Modifier::Above => Operator::Subsumes,
            Modifier::Below => Operator::SubsumedBy,
            Modifier::Not => Operator::Not,
            Modifier::Identifier => Operator::IdentifiedBy,
            Modifier::OfType | Modifier::Type(_) => return None,
        })
    }

    /// The modifier whose operator is `operator`, for rendering.
    pub fn for_operator(operator: Operator) -> Option<Self> {
        Some(match operator {
            Operator::Exact => Modifier::Exact,
            Operator::Contains => Modifier::Contains,
            Operator::Missing => Modifier::Missing,
            Operator::Text => Modifier::Text,
            Operator::In => Modifier::In,
            Operator::NotIn => Modifier::NotIn,
            Operator::Subsumes => Modifier::Above,
            Operator::SubsumedBy => Modifier::Below,
            Operator::Not => Modifier::Not,
            Operator::IdentifiedBy => Modifier::Identifier,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `_has:Type:param:` header of a reverse chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseChain {
    /// Resource type that points back at the searched resource.
    pub resource_type: String,
    /// Its reference parameter that points back.
    pub param: String,
    /// The parameter applied to the referring resource; may itself be a
    /// reverse chain or a forward chain.
    pub target: Box<ParamName>,
}

/// Structural decomposition of a query parameter key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamName {
    /// Parameter name before any `:` or `.`; for a reverse chain, the base
    /// of the innermost parameter.
    pub base: String,
    /// Modifier, or explicit chain target type.
    pub modifier: Option<Modifier>,
    /// Chained parameter names after the first `.`, in order.
    pub chain: Vec<String>,
    /// Reverse-chain header, when the key starts with `_has:`.
    pub reverse: Option<ReverseChain>,
}

impl ParamName {
    fn simple(base: &str, modifier: Option<Modifier>, chain: Vec<String>) -> Self {
        Self {
            base: base.to_string(),
            modifier,
            chain,
            reverse: None,
        }
    }

    /// Decomposes a decoded query key, allowing up to [`DEFAULT_MAX_DEPTH`]
    /// nested `_has:` headers.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fhir_search::{Modifier, ParamName};
    ///
    /// let name = ParamName::parse("subject:Patient.name").unwrap();
    /// assert_eq!(name.base, "subject");
    /// assert_eq!(name.target_type(), Some("Patient"));
    /// assert_eq!(name.chain, vec!["name".to_string()]);
    ///
    /// let name = ParamName::parse("name:exact").unwrap();
    /// assert_eq!(name.modifier, Some(Modifier::Exact));
    /// ```
    ///
    /// # Errors
    ///
    /// A `_has:` key needs a non-empty type, parameter and trailing search
    /// parameter; anything less is [`SearchError::InvalidReverseChain`].
    /// More headers than the limit is [`SearchError::NestingTooDeep`].
    pub fn parse(key: &str) -> SearchResult<Self> {
        Self::parse_with_depth(key, DEFAULT_MAX_DEPTH)
    }

    /// Like [`ParamName::parse`], with an explicit limit on `_has:` headers.
    pub fn parse_with_depth(key: &str, max_depth: usize) -> SearchResult<Self> {
        // Reverse-chain headers are collected first, then wrapped around the
        // innermost parameter from the inside out.
        let mut headers = Vec::new();
        let mut rest = key;
        while let Some(after) = rest.strip_prefix(REVERSE_CHAIN_PREFIX) {
            if headers.len() >= max_depth {
                return Err(SearchError::NestingTooDeep {
                    limit: max_depth,
                    position: None,
                });
            }
            let mut segments = after.splitn(3, ':');
            let resource_type = segments.next().unwrap_or_default();
            let param = segments.next().unwrap_or_default();
            if resource_type.is_empty() || param.is_empty() {
                return Err(SearchError::InvalidReverseChain {
                    reason: format!("expected _has:Type:param:name, found '{}'", truncated(rest)),
                });
            }
            let remainder = segments.next().unwrap_or_default();
            if remainder.is_empty() {
                return Err(SearchError::InvalidReverseChain {
                    reason: format!("missing search parameter after '{}'", truncated(rest)),
                });
            }
            headers.push((resource_type, param));
            rest = remainder;
        }

        let mut name = Self::parse_forward(rest);
        for (resource_type, param) in headers.into_iter().rev() {
            name = ParamName {
                base: name.base.clone(),
                modifier: None,
                chain: Vec::new(),
                reverse: Some(ReverseChain {
                    resource_type: resource_type.to_string(),
                    param: param.to_string(),
                    target: Box::new(name),
                }),
            };
        }
        Ok(name)
    }

    /// Rows 2-5 of the decision table.
    fn parse_forward(key: &str) -> Self {
        let colon = key.find(':');
        let dot = key.find('.');

        match (colon, dot) {
            // Row 2: a dot with no colon before it.
            (None, Some(d)) => Self::simple(&key[..d], None, split_chain(&key[d + 1..])),
            (Some(c), Some(d)) if d < c => {
                Self::simple(&key[..d], None, split_chain(&key[d + 1..]))
            }
            // Row 3: colon, then a dot.
            (Some(c), Some(d)) => {
                let target = &key[c + 1..d];
                Self::simple(
                    &key[..c],
                    Some(Modifier::Type(target.to_string())),
                    split_chain(&key[d + 1..]),
                )
            }
            // Rows 4-5 and the type-modifier fallback.
            (Some(c), None) => Self::simple(&key[..c], Some(Modifier::parse(&key[c + 1..])), Vec::new()),
            (None, None) => Self::simple(key, None, Vec::new()),
        }
    }

    /// True for `_has:` keys.
    pub fn is_reverse_chain(&self) -> bool {
        self.reverse.is_some()
    }

    /// True for keys with a forward chain.
    pub fn is_chained(&self) -> bool {
        !self.chain.is_empty()
    }

    /// Resource type of the outermost `_has:` header.
    pub fn reverse_resource_type(&self) -> Option<&str> {
        self.reverse.as_ref().map(|r| r.resource_type.as_str())
    }

    /// Linking parameter of the outermost `_has:` header.
    pub fn reverse_param(&self) -> Option<&str> {
        self.reverse.as_ref().map(|r| r.param.as_str())
    }

    /// Explicit target type of a chain (`subject:Patient.name`).
    pub fn target_type(&self) -> Option<&str> {
        match self.modifier {
            Some(Modifier::Type(ref t)) => Some(t),
            _ => None,
        }
    }

    /// Operator selected by the modifier, if any.
    pub fn modifier_operator(&self) -> Option<Operator> {
        self.modifier.as_ref().and_then(Modifier::operator)
    }
}

/// The start of `text`, for error messages about very long keys.
fn truncated(text: &str) -> &str {
    match text.char_indices().nth(64) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

fn split_chain(text: &str) -> Vec<String> {
    text.split('.').map(str::to_string).collect()
}

/// Splits one chain segment into its name and an optional `:` suffix.
pub(crate) fn split_segment(segment: &str) -> (&str, Option<Modifier>) {
    match segment.split_once(':') {
        Some((name, suffix)) => (name, Some(Modifier::parse(suffix))),
        None => (segment, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod decision_table {
        use super::*;

        #[test]
        fn test_plain_parameter() {
            let name = ParamName::parse("name").unwrap();
            assert_eq!(name.base, "name");
            assert!(name.modifier.is_none());
            assert!(name.chain.is_empty());
            assert!(!name.is_reverse_chain());
        }

        #[test]
        fn test_known_modifiers() {
            let cases = [
                ("name:exact", Modifier::Exact),
                ("name:contains", Modifier::Contains),
                ("gender:missing", Modifier::Missing),
                ("code:text", Modifier::Text),
                ("code:in", Modifier::In),
                ("code:not-in", Modifier::NotIn),
                ("code:above", Modifier::Above),
                ("code:below", Modifier::Below),
                ("gender:not", Modifier::Not),
                ("subject:identifier", Modifier::Identifier),
                ("identifier:of-type", Modifier::OfType),
            ];
            for (key, modifier) in cases {
                let name = ParamName::parse(key).unwrap();
                assert_eq!(name.modifier, Some(modifier), "key {}", key);
                assert!(name.chain.is_empty());
            }
        }

        #[test]
        fn test_unknown_modifier_is_type() {
            let name = ParamName::parse("subject:Patient").unwrap();
            assert_eq!(name.base, "subject");
            assert_eq!(name.target_type(), Some("Patient"));
            assert!(name.chain.is_empty());
            assert_eq!(name.modifier_operator(), None);
        }

        #[test]
        fn test_dot_chain_without_type() {
            let name = ParamName::parse("subject.name").unwrap();
            assert_eq!(name.base, "subject");
            assert!(name.modifier.is_none());
            assert_eq!(name.chain, vec!["name".to_string()]);
        }

        #[test]
        fn test_dot_chain_with_trailing_modifier() {
            let name = ParamName::parse("subject.name:exact").unwrap();
            assert_eq!(name.base, "subject");
            assert!(name.modifier.is_none());
            assert_eq!(name.chain, vec!["name:exact".to_string()]);
        }

        #[test]
        fn test_colon_then_dot_is_typed_chain() {
            let name = ParamName::parse("subject:Patient.organization.name").unwrap();
            assert_eq!(name.base, "subject");
            assert_eq!(name.target_type(), Some("Patient"));
            assert_eq!(
                name.chain,
                vec!["organization".to_string(), "name".to_string()]
            );
        }
    }

    mod reverse_chains {
        use super::*;

        #[test]
        fn test_simple_has() {
            let name = ParamName::parse("_has:Observation:patient:code").unwrap();
            assert!(name.is_reverse_chain());
            assert_eq!(name.reverse_resource_type(), Some("Observation"));
            assert_eq!(name.reverse_param(), Some("patient"));
            assert_eq!(name.base, "code");
            let target = &name.reverse.as_ref().unwrap().target;
            assert_eq!(target.base, "code");
            assert!(!target.is_reverse_chain());
        }

        #[test]
        fn test_nested_has() {
            let name =
                ParamName::parse("_has:Observation:patient:_has:AuditEvent:entity:agent").unwrap();
            let outer = name.reverse.as_ref().unwrap();
            assert_eq!(outer.resource_type, "Observation");
            let inner = outer.target.reverse.as_ref().unwrap();
            assert_eq!(inner.resource_type, "AuditEvent");
            assert_eq!(inner.param, "entity");
            assert_eq!(inner.target.base, "agent");
            assert_eq!(name.base, "agent");
        }

        #[test]
        fn test_header_limit() {
            let key = format!("{}code", "_has:Observation:patient:".repeat(4));
            assert!(ParamName::parse_with_depth(&key, 4).is_ok());
            assert_eq!(
                ParamName::parse_with_depth(&key, 3).unwrap_err(),
                SearchError::NestingTooDeep {
                    limit: 3,
                    position: None
                }
            );
        }

        #[test]
        fn test_many_headers_fail_before_building() {
            let key = format!("{}code", "_has:Observation:patient:".repeat(10_000));
            let err = ParamName::parse(&key).unwrap_err();
            assert_eq!(
                err,
                SearchError::NestingTooDeep {
                    limit: DEFAULT_MAX_DEPTH,
                    position: None
                }
            );
        }

        #[test]
        fn test_has_with_modifier_target() {
            let name = ParamName::parse("_has:Observation:patient:code:text").unwrap();
            let target = &name.reverse.as_ref().unwrap().target;
            assert_eq!(target.base, "code");
            assert_eq!(target.modifier, Some(Modifier::Text));
        }

        #[test]
        fn test_has_with_single_segment_is_error() {
            let err = ParamName::parse("_has:invalid").unwrap_err();
            assert!(matches!(err, SearchError::InvalidReverseChain { .. }));
        }

        #[test]
        fn test_has_without_target_is_error() {
            let err = ParamName::parse("_has:Observation:patient").unwrap_err();
            assert!(matches!(err, SearchError::InvalidReverseChain { .. }));
        }

        #[test]
        fn test_has_with_empty_segment_is_error() {
            assert!(ParamName::parse("_has::patient:code").is_err());
        }
    }

    #[test]
    fn test_split_segment() {
        assert_eq!(split_segment("name"), ("name", None));
        assert_eq!(split_segment("name:exact"), ("name", Some(Modifier::Exact)));
        assert_eq!(
            split_segment("organization:Organization"),
            ("organization", Some(Modifier::Type("Organization".to_string())))
        );
    }

    #[test]
    fn test_modifier_operator_roundtrip() {
        for text in ["exact", "contains", "missing", "text", "in", "not-in", "above", "below", "not", "identifier"] {
            let modifier = Modifier::parse(text);
            let op = modifier.operator().unwrap();
            assert_eq!(Modifier::for_operator(op), Some(modifier));
        }
    }
}
