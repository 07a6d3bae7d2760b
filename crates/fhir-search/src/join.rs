//! Join-tree construction for chained and reverse-chained parameters.
//!
//! Forward chains (`subject.organization.name`) and reverse chains
//! (`_has:Observation:patient:code`) both become nested [`Join`] nodes. Each
//! hop owns the next one through its `filter`, and the innermost hop holds the
//! comparisons built from the parameter value.

use tracing::trace;

use crate::ast::{Expression, Join, JoinKind, JoinOn, Operator};
use crate::config::ParserConfig;
use crate::error::{SearchError, SearchResult};
use crate::escape::split_unescaped;
use crate::infer::classify;
use crate::param::{split_segment, Modifier, ParamName};

/// Builds filter expressions for decomposed parameter keys.
pub(crate) struct JoinBuilder<'a> {
    config: &'a ParserConfig,
}

impl<'a> JoinBuilder<'a> {
    pub(crate) fn new(config: &'a ParserConfig) -> Self {
        Self { config }
    }

    /// The expression for one `key=value` pair.
    ///
    /// Plain parameters yield comparisons; chains and `_has` keys yield a
    /// join tree with the comparisons at the deepest level.
    pub(crate) fn build(&self, name: &ParamName, raw_value: &str) -> SearchResult<Expression> {
        let mut reverse_hops = Vec::new();
        let mut current = name;
        while let Some(ref reverse) = current.reverse {
            reverse_hops.push((reverse.resource_type.as_str(), reverse.param.as_str()));
            current = &reverse.target;
        }

        let forward_hops = self.forward_hops(current);
        let depth = reverse_hops.len() + forward_hops.len();
        if depth > self.config.max_depth {
            return Err(SearchError::NestingTooDeep {
                limit: self.config.max_depth,
                position: None,
            });
        }

        let mut expr = match current.chain.split_last() {
            Some((last, _)) => {
                let (param, modifier) = split_segment(last);
                comparisons(param, modifier.as_ref(), raw_value)
            }
            None => comparisons(&current.base, current.modifier.as_ref(), raw_value),
        };

        for hop in forward_hops.into_iter().rev() {
            expr = wrap(hop.resource, hop.inferred, JoinKind::Reference, hop.param, expr);
        }
        for (resource, param) in reverse_hops.into_iter().rev() {
            expr = wrap(resource.to_string(), false, JoinKind::ReverseReference, param, expr);
        }

        if depth > 0 {
            trace!(depth, key = %name.base, "built join tree");
        }
        Ok(expr)
    }

    /// Every reference hop of a forward chain, outermost first.
    fn forward_hops<'n>(&self, name: &'n ParamName) -> Vec<ForwardHop<'n>> {
        let Some((_, intermediates)) = name.chain.split_last() else {
            return Vec::new();
        };

        let mut hops = Vec::with_capacity(name.chain.len());
        hops.push(self.hop(&name.base, name.target_type()));
        for segment in intermediates {
            let (param, modifier) = split_segment(segment);
            let explicit = match modifier {
                Some(Modifier::Type(ref t)) => Some(t.as_str()),
                _ => None,
            };
            hops.push(self.hop(param, explicit));
        }
        hops
    }

    fn hop<'n>(&self, param: &'n str, explicit: Option<&str>) -> ForwardHop<'n> {
        match explicit {
            Some(resource_type) => ForwardHop {
                param,
                resource: resource_type.to_string(),
                inferred: false,
            },
            None => ForwardHop {
                param,
                resource: self.config.chain_targets.resolve(param),
                inferred: true,
            },
        }
    }
}

struct ForwardHop<'n> {
    param: &'n str,
    resource: String,
    inferred: bool,
}

fn wrap(
    resource: String,
    inferred: bool,
    kind: JoinKind,
    param: &str,
    filter: Expression,
) -> Expression {
    Expression::Join(Box::new(Join {
        resource,
        inferred,
        on: JoinOn {
            kind,
            param: param.to_string(),
        },
        filter: Some(filter),
        search_param: None,
    }))
}

/// Comparisons for a parameter value, one per comma-separated fragment.
///
/// The operator comes from the modifier if it maps to one, then from a
/// prefix the value consumed, and is `=` otherwise. Two or more fragments
/// are OR-ed.
pub(crate) fn comparisons(param: &str, modifier: Option<&Modifier>, raw_value: &str) -> Expression {
    let hint = modifier.and_then(Modifier::operator);
    let mut terms: Vec<Expression> = split_unescaped(raw_value, ',')
        .into_iter()
        .map(|fragment| {
            let inferred = classify(fragment, hint);
            let operator = hint
                .or_else(|| inferred.prefix.and_then(Operator::from_prefix))
                .unwrap_or(Operator::Equal);
            Expression::compare(operator, param, inferred.value)
        })
        .collect();

    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Expression::Or(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DatePrecision, Value};

    fn build(key: &str, value: &str) -> SearchResult<Expression> {
        let config = ParserConfig::default();
        let name = ParamName::parse(key)?;
        JoinBuilder::new(&config).build(&name, value)
    }

    fn as_join(expr: &Expression) -> &Join {
        match expr {
            Expression::Join(join) => join,
            other => panic!("Expected Join, got {:?}", other),
        }
    }

    mod plain {
        use super::*;

        #[test]
        fn test_single_value() {
            let expr = build("name", "John").unwrap();
            assert_eq!(
                expr,
                Expression::compare(Operator::Equal, "name", Value::string("John"))
            );
        }

        #[test]
        fn test_or_values() {
            let expr = build("name", "John,Peter").unwrap();
            match expr {
                Expression::Or(children) => {
                    assert_eq!(children.len(), 2);
                    for child in &children {
                        assert_eq!(child.kind(), "=");
                    }
                }
                other => panic!("Expected Or, got {:?}", other),
            }
        }

        #[test]
        fn test_prefix_selects_operator() {
            let expr = build("birthdate", "ge2010-01-01").unwrap();
            assert_eq!(
                expr,
                Expression::compare(
                    Operator::GreaterOrEqual,
                    "birthdate",
                    Value::date("2010-01-01", DatePrecision::Day)
                )
            );
        }

        #[test]
        fn test_unconsumed_prefix_keeps_equal() {
            let expr = build("name", "lemon").unwrap();
            assert_eq!(
                expr,
                Expression::compare(Operator::Equal, "name", Value::string("lemon"))
            );
        }

        #[test]
        fn test_modifier_beats_prefix() {
            let expr = build("name:contains", "ge5").unwrap();
            assert_eq!(expr.kind(), "contains");
        }

        #[test]
        fn test_missing_modifier() {
            let expr = build("gender:missing", "true").unwrap();
            assert_eq!(
                expr,
                Expression::compare(Operator::Missing, "gender", Value::boolean(true))
            );
        }

        #[test]
        fn test_unknown_modifier_is_equal() {
            let expr = build("name:fuzzy", "John").unwrap();
            assert_eq!(expr.kind(), "=");
        }

        #[test]
        fn test_escaped_comma_is_one_value() {
            let expr = build("name", r"Smith\, John").unwrap();
            assert_eq!(
                expr,
                Expression::compare(Operator::Equal, "name", Value::string("Smith, John"))
            );
        }
    }

    mod forward {
        use super::*;

        #[test]
        fn test_inferred_target() {
            let expr = build("subject.name", "Peter").unwrap();
            let join = as_join(&expr);
            assert_eq!(join.resource, "Patient");
            assert!(join.inferred);
            assert_eq!(join.on.kind, JoinKind::Reference);
            assert_eq!(join.on.param, "subject");
            assert_eq!(
                join.filter,
                Some(Expression::compare(
                    Operator::Equal,
                    "name",
                    Value::string("Peter")
                ))
            );
        }

        #[test]
        fn test_explicit_target() {
            let expr = build("subject:Group.name", "x").unwrap();
            assert_eq!(as_join(&expr).resource, "Group");
            assert!(!as_join(&expr).inferred);
        }

        #[test]
        fn test_multi_hop() {
            let expr = build("subject.organization:Organization.name", "Acme").unwrap();
            let outer = as_join(&expr);
            assert_eq!(outer.resource, "Patient");
            let inner = as_join(outer.filter.as_ref().unwrap());
            assert!(outer.inferred);
            assert_eq!(inner.resource, "Organization");
            assert!(!inner.inferred);
            assert_eq!(inner.on.param, "organization");
            assert_eq!(inner.filter.as_ref().unwrap().kind(), "=");
        }

        #[test]
        fn test_terminal_modifier() {
            let expr = build("subject.name:exact", "Peter").unwrap();
            let join = as_join(&expr);
            assert_eq!(join.filter.as_ref().unwrap().kind(), "exact");
        }

        #[test]
        fn test_or_values_inside_innermost_join() {
            let expr = build("subject.name", "A,B").unwrap();
            let join = as_join(&expr);
            match join.filter.as_ref() {
                Some(Expression::Or(children)) => assert_eq!(children.len(), 2),
                other => panic!("Expected Or, got {:?}", other),
            }
        }

        #[test]
        fn test_configured_target_table() {
            let config = ParserConfig::builder()
                .with_chain_target("subject", "Group")
                .build();
            let name = ParamName::parse("subject.name").unwrap();
            let expr = JoinBuilder::new(&config).build(&name, "x").unwrap();
            assert_eq!(as_join(&expr).resource, "Group");
        }
    }

    mod reverse {
        use super::*;

        #[test]
        fn test_single_reverse_hop() {
            let expr = build("_has:Observation:patient:code", "1234-5").unwrap();
            let join = as_join(&expr);
            assert_eq!(join.resource, "Observation");
            assert_eq!(join.on.kind, JoinKind::ReverseReference);
            assert_eq!(join.on.param, "patient");
            assert_eq!(
                join.filter,
                Some(Expression::compare(
                    Operator::Equal,
                    "code",
                    Value::code("1234-5")
                ))
            );
        }

        #[test]
        fn test_nested_reverse_hops() {
            let expr = build("_has:Observation:patient:_has:AuditEvent:entity:agent", "x").unwrap();
            let outer = as_join(&expr);
            assert_eq!(outer.resource, "Observation");
            let inner = as_join(outer.filter.as_ref().unwrap());
            assert_eq!(inner.resource, "AuditEvent");
            assert_eq!(inner.on.kind, JoinKind::ReverseReference);
            assert_eq!(inner.on.param, "entity");
        }

        #[test]
        fn test_reverse_then_forward() {
            let expr = build("_has:Observation:patient:performer.name", "Smith").unwrap();
            let outer = as_join(&expr);
            assert_eq!(outer.on.kind, JoinKind::ReverseReference);
            let inner = as_join(outer.filter.as_ref().unwrap());
            assert_eq!(inner.on.kind, JoinKind::Reference);
            assert_eq!(inner.resource, "Practitioner");
        }
    }

    #[test]
    fn test_depth_limit() {
        let config = ParserConfig::builder().with_max_depth(2).build();
        let name = ParamName::parse("a.b.c.d").unwrap();
        let err = JoinBuilder::new(&config).build(&name, "x").unwrap_err();
        assert_eq!(
            err,
            SearchError::NestingTooDeep {
                limit: 2,
                position: None
            }
        );
    }

    #[test]
    fn test_depth_at_limit_succeeds() {
        let config = ParserConfig::builder().with_max_depth(3).build();
        let name = ParamName::parse("a.b.c.d").unwrap();
        assert!(JoinBuilder::new(&config).build(&name, "x").is_ok());
    }
}
