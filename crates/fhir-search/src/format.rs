//! Canonical query-string rendering of a [`SearchQuery`].
//!
//! Each top-level filter contribution becomes one parameter. A contribution
//! is written as `key=value` when re-parsing that pair gives back the same
//! expression; otherwise it is written as a `_filter` expression, and if the
//! filter language cannot express it either, rendering fails with
//! [`SearchError::Unrepresentable`]. Parameter definitions attached by
//! [`crate::enrich`] are not rendered.

use crate::ast::{
    Comparison, Expression, IncludeDirection, IncludeExpression, JoinKind, Operator, SearchQuery,
    SortDirection, Value,
};
use crate::config::ParserConfig;
use crate::error::{SearchError, SearchResult};
use crate::escape::escape;
use crate::filter::parse_filter;
use crate::join::JoinBuilder;
use crate::param::{Modifier, ParamName};
use crate::parser::is_filter_key;

/// Renders the query string (without `?`) that parses back to `query`.
///
/// # Examples
///
/// ```rust
/// use fhir_search::{parse_query, to_query_string};
///
/// let query = parse_query("/Patient?name=John,Peter&_count=10").unwrap();
/// assert_eq!(to_query_string(&query).unwrap(), "name=John,Peter&_count=10");
/// ```
///
/// # Errors
///
/// [`SearchError::Unrepresentable`] when a part of the query has no
/// query-string form, such as a join nested under `or`, a multi-valued
/// comparison, or an include with a `select`.
pub fn to_query_string(query: &SearchQuery) -> SearchResult<String> {
    let renderer = Renderer::new();
    let mut pairs = Vec::new();

    if let Some(ref filter) = query.filter {
        let filter = without_definitions(filter);
        let contributions = match filter {
            Expression::And(children) => children,
            other => vec![other],
        };
        for expr in &contributions {
            pairs.push(renderer.contribution(expr)?);
        }
    }

    if !query.sort.is_empty() {
        let keys: Vec<String> = query
            .sort
            .iter()
            .map(|s| match s.direction {
                SortDirection::Asc => s.param.clone(),
                SortDirection::Desc => format!("-{}", s.param),
            })
            .collect();
        pairs.push(("_sort".to_string(), keys.join(",")));
    }
    if let Some(count) = query.count {
        pairs.push(("_count".to_string(), count.to_string()));
    }
    if let Some(offset) = query.offset {
        pairs.push(("_offset".to_string(), offset.to_string()));
    }
    if let Some(summary) = query.summary {
        pairs.push(("_summary".to_string(), summary.as_str().to_string()));
    }
    if let Some(ref elements) = query.elements {
        pairs.push(("_elements".to_string(), elements.paths().join(",")));
    }
    for include in &query.includes {
        pairs.push(include_pair(include)?);
    }
    if let Some(contained) = query.contained {
        pairs.push(("_contained".to_string(), contained.as_str().to_string()));
    }
    if let Some(contained_type) = query.contained_type {
        pairs.push(("_containedType".to_string(), contained_type.as_str().to_string()));
    }

    let rendered: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect();
    Ok(rendered.join("&"))
}

/// Renders `query` as a relative search URL (`/Type?...`).
pub fn to_url(query: &SearchQuery) -> SearchResult<String> {
    let query_string = to_query_string(query)?;
    if query_string.is_empty() {
        Ok(format!("/{}", query.resource))
    } else {
        Ok(format!("/{}?{}", query.resource, query_string))
    }
}

struct Renderer {
    config: ParserConfig,
}

impl Renderer {
    fn new() -> Self {
        Self {
            config: ParserConfig::default(),
        }
    }

    fn contribution(&self, expr: &Expression) -> SearchResult<(String, String)> {
        if let Some(pair) = self.parameter(expr) {
            return Ok(pair);
        }
        if let Some(text) = filter_text(expr) {
            if matches!(parse_filter(&text), Ok(ref parsed) if parsed == expr) {
                return Ok(("_filter".to_string(), text));
            }
        }
        Err(SearchError::Unrepresentable(expr.to_string()))
    }

    /// The first `key=value` form that rebuilds `expr`.
    fn parameter(&self, expr: &Expression) -> Option<(String, String)> {
        self.parameter_forms(expr)
            .into_iter()
            .find(|(key, value)| self.rebuilds(key, value, expr))
    }

    fn rebuilds(&self, key: &str, value: &str, expected: &Expression) -> bool {
        if !is_filter_key(key) {
            return false;
        }
        ParamName::parse_with_depth(key, self.config.max_depth)
            .and_then(|name| JoinBuilder::new(&self.config).build(&name, value))
            .map_or(false, |built| built == *expected)
    }

    /// Candidate `key=value` forms, most canonical first. Unverified.
    fn parameter_forms(&self, expr: &Expression) -> Vec<(String, String)> {
        match expr {
            Expression::Compare(comparison) => comparison_forms(comparison),
            Expression::Or(children) => {
                let mut key: Option<String> = None;
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    if !matches!(child, Expression::Compare(_)) {
                        return Vec::new();
                    }
                    let Some((child_key, value)) = self.parameter(child) else {
                        return Vec::new();
                    };
                    match key {
                        Some(ref k) if *k != child_key => return Vec::new(),
                        Some(_) => {}
                        None => key = Some(child_key),
                    }
                    values.push(value);
                }
                key.map(|k| vec![(k, values.join(","))]).unwrap_or_default()
            }
            Expression::Join(join) => {
                let Some(ref filter) = join.filter else {
                    return Vec::new();
                };
                let mut forms = Vec::new();
                for (inner, value) in self.parameter_forms(filter) {
                    match join.on.kind {
                        JoinKind::Reference => {
                            // An inferred hop must stay untyped to parse back as inferred.
                            if join.inferred {
                                forms.push((format!("{}.{}", join.on.param, inner), value));
                            } else {
                                forms.push((
                                    format!("{}:{}.{}", join.on.param, join.resource, inner),
                                    value,
                                ));
                            }
                        }
                        JoinKind::ReverseReference => forms.push((
                            format!("_has:{}:{}:{}", join.resource, join.on.param, inner),
                            value,
                        )),
                    }
                }
                forms
            }
            Expression::And(_) | Expression::Not(_) => Vec::new(),
        }
    }
}

fn comparison_forms(comparison: &Comparison) -> Vec<(String, String)> {
    let [value] = comparison.value.as_slice() else {
        return Vec::new();
    };

    let (key, prefixes) = match Modifier::for_operator(comparison.operator) {
        Some(modifier) => (format!("{}:{}", comparison.param, modifier), vec![""]),
        None if comparison.operator == Operator::Equal => (comparison.param.clone(), vec!["", "eq"]),
        None => match comparison.operator.prefix() {
            Some(prefix) => (comparison.param.clone(), vec![prefix]),
            None => return Vec::new(),
        },
    };

    let texts = value_texts(value);
    let mut forms = Vec::with_capacity(prefixes.len() * texts.len());
    for prefix in prefixes {
        for text in &texts {
            forms.push((key.clone(), format!("{}{}", prefix, text)));
        }
    }
    forms
}

/// Escaped spellings of a value, most canonical first.
fn value_texts(value: &Value) -> Vec<String> {
    match value {
        Value::String { value } => vec![escape(value)],
        Value::Number { value } => vec![
            format!("{}", value),
            format!("{:?}", value),
            format!("{:e}", value),
        ],
        Value::Boolean { value } => vec![value.to_string()],
        Value::Date(date) => vec![date.value.clone()],
        Value::Token(token) => {
            let code = escape(&token.code);
            match (&token.system, &token.display) {
                (None, None) => vec![code.clone(), format!("|{}", code)],
                (Some(system), None) => vec![format!("{}|{}", escape(system), code)],
                (system, Some(display)) => {
                    let system = system.as_deref().map(escape).unwrap_or_default();
                    let mut texts = vec![format!("{}|{}|{}", system, code, escape(display))];
                    if system.is_empty() {
                        texts.push(format!("{}|{}", code, escape(display)));
                    }
                    texts
                }
            }
        }
        Value::Reference(reference) => match (&reference.url, &reference.resource_type) {
            (Some(url), _) => vec![escape(url)],
            (None, Some(resource_type)) => vec![format!("{}/{}", resource_type, escape(&reference.id))],
            (None, None) => vec![escape(&reference.id)],
        },
        Value::Quantity(quantity) => {
            let mut base = quantity.value.to_string();
            if let Some(ref unit) = quantity.unit {
                base.push('|');
                base.push_str(&escape(unit));
            }
            if let Some(ref system) = quantity.system {
                base.push('|');
                base.push_str(&escape(system));
            }
            match quantity.comparator {
                Some(comparator) => vec![base.clone(), format!("{}{}", comparator, base)],
                None => vec![base],
            }
        }
        Value::Composite { parts } => {
            let texts: Option<Vec<String>> = parts.iter().map(composite_part_text).collect();
            texts.map(|t| vec![t.join("$")]).unwrap_or_default()
        }
    }
}

/// Component text inside a composite, where a comparator is written as a prefix.
fn composite_part_text(part: &Value) -> Option<String> {
    let text = value_texts(part).into_iter().next()?;
    match part {
        Value::Quantity(quantity) => match quantity.comparator {
            Some(comparator) => Some(format!("{}{}", comparator.prefix(), text)),
            None => Some(text),
        },
        _ => Some(text),
    }
}

/// The `_filter` spelling of an expression without joins.
fn filter_text(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Compare(comparison) => {
            let [value] = comparison.value.as_slice() else {
                return None;
            };
            let keyword = comparison.operator.filter_keyword()?;
            Some(format!("{} {} {}", comparison.param, keyword, filter_value(value)?))
        }
        Expression::And(children) | Expression::Or(children) => {
            let connective = if matches!(expr, Expression::And(_)) {
                " and "
            } else {
                " or "
            };
            let parts: Option<Vec<String>> = children.iter().map(grouped_filter_text).collect();
            Some(parts?.join(connective))
        }
        Expression::Not(inner) => Some(format!("not {}", grouped_filter_text(inner)?)),
        Expression::Join(_) => None,
    }
}

fn grouped_filter_text(expr: &Expression) -> Option<String> {
    let text = filter_text(expr)?;
    match expr {
        Expression::And(_) | Expression::Or(_) => Some(format!("({})", text)),
        _ => Some(text),
    }
}

fn filter_value(value: &Value) -> Option<String> {
    match value {
        Value::String { value } => {
            let mut quoted = String::with_capacity(value.len() + 2);
            quoted.push('\'');
            for c in value.chars() {
                if matches!(c, '\'' | '\\') {
                    quoted.push('\\');
                }
                quoted.push(c);
            }
            quoted.push('\'');
            Some(quoted)
        }
        // Debug keeps a decimal point, so `2010.0` does not lex as a year.
        Value::Number { value } if value.is_finite() => Some(format!("{:?}", value)),
        Value::Boolean { value } => Some(value.to_string()),
        Value::Date(date) => Some(date.value.clone()),
        _ => None,
    }
}

fn include_pair(include: &IncludeExpression) -> SearchResult<(String, String)> {
    let unrepresentable = || {
        SearchError::Unrepresentable(format!(
            "include {}",
            include.param.as_deref().unwrap_or("<none>")
        ))
    };
    if include.select.is_some() || !include.includes.is_empty() {
        return Err(unrepresentable());
    }

    let key = match include.direction {
        IncludeDirection::Forward => "_include",
        IncludeDirection::Reverse => "_revinclude",
    };
    let mut value = String::new();
    if include.iterate {
        value.push_str("iterate:");
    }
    if include.recurse {
        value.push_str("recurse:");
    }
    if include.logical {
        value.push_str("logical:");
    }
    match (&include.source, &include.param) {
        (None, Some(param)) if param == "*" => value.push('*'),
        (Some(source), Some(param)) => {
            value.push_str(source);
            value.push(':');
            value.push_str(param);
            if let Some(ref target) = include.target {
                value.push(':');
                value.push_str(target);
            }
        }
        _ => return Err(unrepresentable()),
    }
    Ok((key.to_string(), value))
}

/// Percent-encodes the characters that would break query-string splitting.
fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_graphic() && !matches!(c, '%' | '&' | '=' | '+' | '#' | '?') {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    out
}

fn without_definitions(expr: &Expression) -> Expression {
    match expr {
        Expression::Compare(comparison) => Expression::Compare(Comparison {
            search_param: None,
            ..comparison.clone()
        }),
        Expression::And(children) => {
            Expression::And(children.iter().map(without_definitions).collect())
        }
        Expression::Or(children) => {
            Expression::Or(children.iter().map(without_definitions).collect())
        }
        Expression::Not(inner) => Expression::negate(without_definitions(inner)),
        Expression::Join(join) => {
            let mut join = join.clone();
            join.search_param = None;
            join.filter = join.filter.as_ref().map(without_definitions);
            Expression::Join(join)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DatePrecision, QuantityValue, TokenValue};
    use crate::parser::parse_query;

    fn render(url: &str) -> String {
        to_query_string(&parse_query(url).unwrap()).unwrap()
    }

    mod parameters {
        use super::*;

        #[test]
        fn test_plain_values() {
            assert_eq!(render("/Patient?name=John"), "name=John");
            assert_eq!(
                render("/Patient?birthdate=ge2010-01-01"),
                "birthdate=ge2010-01-01"
            );
            assert_eq!(render("/Patient?gender:missing=true"), "gender:missing=true");
        }

        #[test]
        fn test_chains_keep_their_written_form() {
            assert_eq!(
                render("/Observation?subject.name=Peter"),
                "subject.name=Peter"
            );
            assert_eq!(
                render("/Observation?subject:Group.name=Peter"),
                "subject:Group.name=Peter"
            );
            assert_eq!(
                render("/Observation?subject:Group.organization.name=Acme"),
                "subject:Group.organization.name=Acme"
            );
            assert_eq!(
                render("/Patient?_has:Observation:patient:code=1234-5"),
                "_has:Observation:patient:code=1234-5"
            );
        }

        #[test]
        fn test_spaces_encoded() {
            assert_eq!(render("/Patient?name=John+Smith"), "name=John%20Smith");
        }

        #[test]
        fn test_filter_fallback() {
            assert_eq!(
                render("/Patient?_filter=name eq 'John' or gender eq male"),
                "_filter=name%20eq%20'John'%20or%20gender%20eq%20'male'"
            );
        }

        #[test]
        fn test_year_filter_stays_in_filter() {
            let query = parse_query("/Patient?_filter=birthdate ge 2010").unwrap();
            let rendered = to_query_string(&query).unwrap();
            assert!(rendered.starts_with("_filter="));
            assert_eq!(parse_query(&format!("/Patient?{}", rendered)).unwrap(), query);
        }
    }

    mod values {
        use super::*;

        #[test]
        fn test_bare_token_text() {
            let texts = value_texts(&Value::code("abc"));
            assert_eq!(texts, vec!["abc".to_string(), "|abc".to_string()]);
        }

        #[test]
        fn test_quantity_with_unit() {
            let mut quantity = QuantityValue::new(5.4);
            quantity.unit = Some("mg".to_string());
            assert_eq!(value_texts(&Value::Quantity(quantity)), vec!["5.4|mg".to_string()]);
        }

        #[test]
        fn test_composite_keeps_component_prefix() {
            assert_eq!(
                render("/Observation?code-value-quantity=1234-5$gt5.4"),
                "code-value-quantity=1234-5$gt5.4"
            );
        }

        #[test]
        fn test_filter_number_keeps_decimal_point() {
            assert_eq!(filter_value(&Value::number(2010.0)), Some("2010.0".to_string()));
        }

        #[test]
        fn test_filter_string_escapes_quote() {
            assert_eq!(
                filter_value(&Value::string("O'Brien")),
                Some(r"'O\'Brien'".to_string())
            );
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn test_token_under_filter_only_operator() {
            let mut query = SearchQuery::new("Observation");
            query.filter = Some(Expression::compare(
                Operator::StartsWith,
                "code",
                Value::Token(TokenValue {
                    system: Some("http://loinc.org".to_string()),
                    code: "1234-5".to_string(),
                    display: None,
                }),
            ));
            assert!(matches!(
                to_query_string(&query),
                Err(SearchError::Unrepresentable(_))
            ));
        }

        #[test]
        fn test_multi_valued_comparison() {
            let mut comparison = Comparison::new(Operator::Equal, "name", Value::string("A"));
            comparison.value.push(Value::string("B"));
            let mut query = SearchQuery::new("Patient");
            query.filter = Some(Expression::Compare(comparison));
            assert!(to_query_string(&query).is_err());
        }

        #[test]
        fn test_include_with_select() {
            let mut query = SearchQuery::new("Patient");
            query.includes.push(
                IncludeExpression::new(IncludeDirection::Forward)
                    .with_param("Patient", "organization")
                    .with_select(crate::ast::ElementSelection::from_paths(["name"])),
            );
            assert!(to_query_string(&query).is_err());
        }
    }

    #[test]
    fn test_to_url() {
        let query = parse_query("/Patient").unwrap();
        assert_eq!(to_url(&query).unwrap(), "/Patient");
        let mut query = SearchQuery::new("Patient");
        query.filter = Some(Expression::compare(
            Operator::Equal,
            "birthdate",
            Value::date("2010", DatePrecision::Year),
        ));
        assert_eq!(to_url(&query).unwrap(), "/Patient?_filter=birthdate%20eq%202010");
    }
}
