//! Literal type inference for untyped search values.
//!
//! A value fragment (one comma-separated piece of a parameter value) is
//! classified by a fixed cascade. The first step that matches decides the
//! type; later steps are never consulted. The order is:
//!
//! 1. `:missing` hint and `true`/`false` → boolean
//! 2. strip a two-letter comparison prefix (`eq ne gt lt ge le sa eb ap`)
//! 3. contains `$` → composite, each part inferred on its own
//! 4. contains `|` → token (`system|code`, `code|display`, `system|code|display`)
//! 5. prefix + plain number → quantity with comparator
//! 6. `[<|<=|>|>=|=]digits[.digits][|unit][|system]` → quantity
//! 7. `YYYY[-MM[-DD[Thh:mm[:ss[.s+]][Z|±hh:mm]]]]` → date
//! 8. `Type/id` or an absolute URL ending in `Type/id` → reference
//! 9. number → number
//! 10. `true` / `false` → boolean
//! 11. short code-like text → token; capitalised text → string
//! 12. anything else → string
//!
//! A prefix is only consumed by steps 3, 5, 6 and 7. When any other step
//! matches, the cascade is rerun on the fragment as written, so `lemon`
//! stays the string `"lemon"` rather than `le` + `"mon"`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1, take_while_m_n},
    character::complete::{char, digit1, one_of, satisfy},
    combinator::{all_consuming, map_res, opt, recognize},
    number::complete::recognize_float,
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::ast::{
    DatePrecision, DateValue, Operator, QuantityComparator, QuantityValue, ReferenceValue,
    TokenValue, Value,
};
use crate::escape::{contains_unescaped, split_unescaped, unescape};

const PREFIXES: [&str; 9] = ["eq", "ne", "gt", "lt", "ge", "le", "sa", "eb", "ap"];

/// A classified fragment plus the prefix it consumed, if any.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Inferred {
    pub value: Value,
    pub prefix: Option<&'static str>,
}

/// Infers the typed value of one search value fragment.
///
/// `hint` is the operator implied by the parameter's modifier; only
/// [`Operator::Missing`] changes the outcome.
///
/// # Examples
///
/// ```rust
/// use fhir_search::{infer_value, DatePrecision, Value};
///
/// assert_eq!(
///     infer_value("2010-01-01", None),
///     Value::date("2010-01-01", DatePrecision::Day)
/// );
/// assert_eq!(infer_value("John", None), Value::string("John"));
/// assert_eq!(infer_value("1234-5", None), Value::code("1234-5"));
/// ```
pub fn infer_value(raw: &str, hint: Option<Operator>) -> Value {
    classify(raw, hint).value
}

/// Runs the cascade and reports which prefix, if any, the value consumed.
pub(crate) fn classify(raw: &str, hint: Option<Operator>) -> Inferred {
    if hint == Some(Operator::Missing) {
        match raw {
            "true" => return unprefixed(Value::boolean(true)),
            "false" => return unprefixed(Value::boolean(false)),
            _ => {}
        }
    }

    if let Some((prefix, remainder)) = split_prefix(raw) {
        if let Some(value) = prefixed(prefix, remainder) {
            return Inferred {
                value,
                prefix: Some(prefix),
            };
        }
    }
    unprefixed(cascade(raw))
}

fn unprefixed(value: Value) -> Inferred {
    Inferred {
        value,
        prefix: None,
    }
}

fn split_prefix(raw: &str) -> Option<(&'static str, &str)> {
    let head = raw.get(..2)?;
    let remainder = &raw[2..];
    if remainder.is_empty() {
        return None;
    }
    PREFIXES
        .iter()
        .find(|p| **p == head)
        .map(|p| (*p, remainder))
}

/// Steps 3-7 on the text after a prefix. `None` means the matching step
/// does not take a prefix (or nothing matched).
fn prefixed(prefix: &str, remainder: &str) -> Option<Value> {
    if contains_unescaped(remainder, '$') {
        return Some(composite(remainder));
    }
    if contains_unescaped(remainder, '|') {
        return None;
    }
    let text = unescape(remainder);
    if let Some(number) = plain_number(&text) {
        let mut quantity = QuantityValue::new(number);
        quantity.comparator = QuantityComparator::from_prefix(prefix);
        return Some(Value::Quantity(quantity));
    }
    if let Some(quantity) = quantity(&text) {
        return Some(Value::Quantity(quantity));
    }
    date(&text).map(Value::Date)
}

/// Steps 3-12 on an unprefixed fragment.
fn cascade(raw: &str) -> Value {
    if contains_unescaped(raw, '$') {
        return composite(raw);
    }
    if contains_unescaped(raw, '|') {
        if let Some(token) = token(raw) {
            return Value::Token(token);
        }
    }

    let text = unescape(raw);
    if let Some(quantity) = quantity(&text) {
        return Value::Quantity(quantity);
    }
    if let Some(date) = date(&text) {
        return Value::Date(date);
    }
    if let Some(reference) = reference(&text) {
        return Value::Reference(reference);
    }
    if let Some(number) = plain_number(&text) {
        return Value::number(number);
    }
    match text.as_str() {
        "true" => return Value::boolean(true),
        "false" => return Value::boolean(false),
        _ => {}
    }
    if looks_like_code(&text) {
        return Value::code(text);
    }
    Value::string(text)
}

fn composite(raw: &str) -> Value {
    let parts = split_unescaped(raw, '$')
        .into_iter()
        .map(|part| classify(part, None).value)
        .collect();
    Value::Composite { parts }
}

fn token(raw: &str) -> Option<TokenValue> {
    let parts: Vec<String> = split_unescaped(raw, '|').into_iter().map(unescape).collect();
    match parts.as_slice() {
        [first, second] if first.is_empty() => Some(TokenValue {
            system: None,
            code: second.clone(),
            display: None,
        }),
        [first, second] if looks_like_system(first) => Some(TokenValue {
            system: Some(first.clone()),
            code: second.clone(),
            display: None,
        }),
        [first, second] => Some(TokenValue {
            system: None,
            code: first.clone(),
            display: Some(second.clone()),
        }),
        [system, code, display] => Some(TokenValue {
            system: non_empty(system),
            code: code.clone(),
            display: non_empty(display),
        }),
        _ => None,
    }
}

fn looks_like_system(text: &str) -> bool {
    text.starts_with("http://")
        || text.starts_with("https://")
        || text.starts_with("urn:")
        || text.contains('/')
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Step 11.
fn looks_like_code(text: &str) -> bool {
    if text.is_empty()
        || !text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return false;
    }
    if text.contains('-') && text.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    text.len() <= 3 && text.chars().all(|c| !c.is_ascii_uppercase())
}

// =============================================================================
// Literal recognisers
// =============================================================================

/// A plain decimal number, with optional sign and exponent.
pub(crate) fn plain_number(text: &str) -> Option<f64> {
    let (_, literal) = all_consuming(recognize_float::<&str, nom::error::Error<&str>>)(text).ok()?;
    literal.parse::<f64>().ok()
}

fn quantity(text: &str) -> Option<QuantityValue> {
    all_consuming(quantity_literal)(text).ok().map(|(_, q)| q)
}

fn quantity_literal(input: &str) -> IResult<&str, QuantityValue> {
    let (input, comparator) = opt(alt((tag("<="), tag(">="), tag("<"), tag(">"), tag("="))))(input)?;
    let (input, value) = map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |s: &str| s.parse::<f64>(),
    )(input)?;
    let (input, unit) = opt(preceded(char('|'), take_while1(|c: char| c != '|')))(input)?;
    let (input, system) = opt(preceded(char('|'), take_while1(|_: char| true)))(input)?;

    Ok((
        input,
        QuantityValue {
            value,
            comparator: comparator.and_then(QuantityComparator::from_symbol),
            unit: unit.map(str::to_string),
            system: system.map(str::to_string),
            code: None,
        },
    ))
}

/// Parses a complete date literal.
pub(crate) fn date(text: &str) -> Option<DateValue> {
    let (_, precision) = all_consuming(date_literal)(text).ok()?;
    Some(DateValue {
        value: text.to_string(),
        precision,
    })
}

fn digits(count: usize) -> impl Fn(&str) -> IResult<&str, &str> {
    move |input| take_while_m_n(count, count, |c: char| c.is_ascii_digit())(input)
}

/// Recognises a date prefix of `input` and reports its precision.
///
/// Precision follows the components present: year, month, day, `Thh:mm`
/// (time) and `:ss` (second).
pub(crate) fn date_literal(input: &str) -> IResult<&str, DatePrecision> {
    let (input, _) = digits(4)(input)?;
    let (input, month) = opt(preceded(char('-'), digits(2)))(input)?;
    if month.is_none() {
        return Ok((input, DatePrecision::Year));
    }
    let (input, day) = opt(preceded(char('-'), digits(2)))(input)?;
    if day.is_none() {
        return Ok((input, DatePrecision::Month));
    }
    let (input, time) = opt(tuple((char('T'), digits(2), char(':'), digits(2))))(input)?;
    if time.is_none() {
        return Ok((input, DatePrecision::Day));
    }
    let (input, seconds) = opt(recognize(pair(
        preceded(char(':'), digits(2)),
        opt(pair(char('.'), digit1)),
    )))(input)?;
    let (input, _) = opt(timezone)(input)?;

    let precision = if seconds.is_some() {
        DatePrecision::Second
    } else {
        DatePrecision::Time
    };
    Ok((input, precision))
}

fn timezone(input: &str) -> IResult<&str, &str> {
    alt((
        tag("Z"),
        recognize(tuple((one_of("+-"), digits(2), char(':'), digits(2)))),
    ))(input)
}

fn reference(text: &str) -> Option<ReferenceValue> {
    let absolute = text
        .strip_prefix("http://")
        .or_else(|| text.strip_prefix("https://"));
    if let Some(path) = absolute {
        // host, then at least `Type/id`
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 3 {
            return None;
        }
        let tail = segments[segments.len() - 2..].join("/");
        let (_, (resource_type, id)) = all_consuming(relative_reference)(&tail).ok()?;
        return Some(ReferenceValue {
            resource_type: Some(resource_type.to_string()),
            id: id.to_string(),
            url: Some(text.to_string()),
        });
    }
    let (_, (resource_type, id)) = all_consuming(relative_reference)(text).ok()?;
    Some(ReferenceValue {
        resource_type: Some(resource_type.to_string()),
        id: id.to_string(),
        url: None,
    })
}

fn relative_reference(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, resource_type) = recognize(pair(
        satisfy(|c| c.is_ascii_uppercase()),
        take_while(|c: char| c.is_ascii_alphabetic()),
    ))(input)?;
    let (input, _) = char('/')(input)?;
    let (input, id) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))(input)?;
    Ok((input, (resource_type, id)))
}
