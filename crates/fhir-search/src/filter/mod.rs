//! The `_filter` expression language.
//!
//! A small boolean language over comparisons:
//!
//! ```text
//! name eq 'John' and (birthdate ge 2010 or not active eq false)
//! ```
//!
//! `not` binds tighter than `and`, which binds tighter than `or`. Runs of
//! the same connective produce one n-ary node.
//!
//! | Keyword | Operator | Keyword | Operator |
//! |---------|----------|---------|----------|
//! | `eq` | `=` | `co` | `contains` |
//! | `ne` | `!=` | `sw` | `starts-with` |
//! | `gt` | `>` | `ew` | `ends-with` |
//! | `lt` | `<` | `pr` | `exists` |
//! | `ge` | `>=` | `po` | `overlaps` |
//! | `le` | `<=` | `ss` | `subsumes` |
//! | `sa` | `starts-after` | `sb` | `subsumed-by` |
//! | `eb` | `ends-before` | `re` | `references` |
//! | `ap` | `~` | `in` / `ni` | `in` / `not-in` |

mod lexer;
mod parser;

pub use lexer::{tokenize, Token, TokenKind};

use crate::ast::Expression;
use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::SearchResult;
use parser::FilterParser;

/// Parses a `_filter` expression with the default nesting limit.
///
/// # Examples
///
/// ```rust
/// use fhir_search::{parse_filter, Expression};
///
/// let expr = parse_filter("name eq 'John' and gender eq male").unwrap();
/// assert!(matches!(expr, Expression::And(ref children) if children.len() == 2));
/// ```
pub fn parse_filter(text: &str) -> SearchResult<Expression> {
    parse_filter_with_depth(text, DEFAULT_MAX_DEPTH)
}

/// Parses a `_filter` expression, allowing at most `max_depth` nested
/// groups and `not`s.
pub fn parse_filter_with_depth(text: &str, max_depth: usize) -> SearchResult<Expression> {
    let tokens = tokenize(text)?;
    FilterParser::new(&tokens, max_depth).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DatePrecision, Operator, Value};
    use crate::error::SearchError;

    fn eq(param: &str, value: Value) -> Expression {
        Expression::compare(Operator::Equal, param, value)
    }

    mod precedence {
        use super::*;

        #[test]
        fn test_single_comparison() {
            let expr = parse_filter("name eq 'John'").unwrap();
            assert_eq!(expr, eq("name", Value::string("John")));
        }

        #[test]
        fn test_and_flattens() {
            let expr = parse_filter("a eq x and b eq y and c eq z").unwrap();
            match expr {
                Expression::And(children) => assert_eq!(children.len(), 3),
                other => panic!("Expected And, got {:?}", other),
            }
        }

        #[test]
        fn test_and_binds_tighter_than_or() {
            let expr = parse_filter("a eq x or b eq y and c eq z").unwrap();
            match expr {
                Expression::Or(children) => {
                    assert_eq!(children.len(), 2);
                    assert_eq!(children[0], eq("a", Value::string("x")));
                    assert!(matches!(children[1], Expression::And(ref c) if c.len() == 2));
                }
                other => panic!("Expected Or, got {:?}", other),
            }
        }

        #[test]
        fn test_not_binds_tighter_than_and() {
            let expr = parse_filter("not a eq x and b eq y").unwrap();
            match expr {
                Expression::And(children) => {
                    assert!(matches!(children[0], Expression::Not(_)));
                    assert_eq!(children[1], eq("b", Value::string("y")));
                }
                other => panic!("Expected And, got {:?}", other),
            }
        }

        #[test]
        fn test_parentheses_override() {
            let expr = parse_filter("(a eq x or b eq y) and c eq z").unwrap();
            match expr {
                Expression::And(children) => {
                    assert!(matches!(children[0], Expression::Or(_)));
                }
                other => panic!("Expected And, got {:?}", other),
            }
        }

        #[test]
        fn test_double_negation_is_kept() {
            let expr = parse_filter("not not a eq x").unwrap();
            match expr {
                Expression::Not(inner) => assert!(matches!(*inner, Expression::Not(_))),
                other => panic!("Expected Not, got {:?}", other),
            }
        }
    }

    mod values {
        use super::*;

        #[test]
        fn test_year_value_is_date() {
            let expr = parse_filter("birthdate ge 2010").unwrap();
            assert_eq!(
                expr,
                Expression::compare(
                    Operator::GreaterOrEqual,
                    "birthdate",
                    Value::date("2010", DatePrecision::Year)
                )
            );
        }

        #[test]
        fn test_number_and_boolean() {
            let expr = parse_filter("value-quantity gt 5.4 and active eq true").unwrap();
            match expr {
                Expression::And(children) => {
                    assert_eq!(
                        children[0],
                        Expression::compare(Operator::GreaterThan, "value-quantity", Value::number(5.4))
                    );
                    assert_eq!(children[1], eq("active", Value::boolean(true)));
                }
                other => panic!("Expected And, got {:?}", other),
            }
        }

        #[test]
        fn test_filter_only_operators() {
            let expr = parse_filter("name sw 'Jo'").unwrap();
            assert_eq!(expr.kind(), "starts-with");
            let expr = parse_filter("code ss 'abc'").unwrap();
            assert_eq!(expr.kind(), "subsumes");
        }
    }

    mod errors {
        use super::*;

        #[test]
        fn test_missing_operator() {
            let err = parse_filter("name 'John'").unwrap_err();
            assert_eq!(
                err,
                SearchError::ExpectedOperator {
                    param: "name".to_string(),
                    found: "John".to_string(),
                    position: 5
                }
            );
        }

        #[test]
        fn test_missing_value() {
            let err = parse_filter("name eq").unwrap_err();
            assert_eq!(
                err,
                SearchError::ExpectedValue {
                    found: String::new(),
                    position: 7
                }
            );
        }

        #[test]
        fn test_trailing_tokens() {
            let err = parse_filter("name eq x y").unwrap_err();
            assert_eq!(
                err,
                SearchError::TrailingInput {
                    token: "y".to_string(),
                    position: 10
                }
            );
        }

        #[test]
        fn test_unclosed_group() {
            let err = parse_filter("(name eq x").unwrap_err();
            assert_eq!(
                err,
                SearchError::UnexpectedToken {
                    token: String::new(),
                    position: 10
                }
            );
        }

        #[test]
        fn test_empty_expression() {
            let err = parse_filter("   ").unwrap_err();
            assert!(matches!(err, SearchError::UnexpectedToken { position: 3, .. }));
        }

        #[test]
        fn test_depth_limit() {
            let text = format!("{}a eq x{}", "(".repeat(5), ")".repeat(5));
            assert!(parse_filter_with_depth(&text, 5).is_ok());
            let err = parse_filter_with_depth(&text, 4).unwrap_err();
            assert_eq!(
                err,
                SearchError::NestingTooDeep {
                    limit: 4,
                    position: Some(4)
                }
            );
        }

        #[test]
        fn test_deep_nesting_does_not_overflow() {
            let text = format!("{}a eq x{}", "(".repeat(10_000), ")".repeat(10_000));
            assert!(matches!(
                parse_filter(&text),
                Err(SearchError::NestingTooDeep { limit: 32, .. })
            ));
        }
    }
}
