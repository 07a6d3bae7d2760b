//! Abstract Syntax Tree types for search queries.

use std::collections::BTreeMap;

use crate::enrich::SearchParamDefinition;

// =============================================================================
// Operators
// =============================================================================

/// Comparison operator of a search expression, named by its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    /// `=`
    #[cfg_attr(feature = "serde", serde(rename = "="))]
    Equal,
    /// `!=`
    #[cfg_attr(feature = "serde", serde(rename = "!="))]
    NotEqual,
    /// `>`
    #[cfg_attr(feature = "serde", serde(rename = ">"))]
    GreaterThan,
    /// `<`
    #[cfg_attr(feature = "serde", serde(rename = "<"))]
    LessThan,
    /// `>=`
    #[cfg_attr(feature = "serde", serde(rename = ">="))]
    GreaterOrEqual,
    /// `<=`
    #[cfg_attr(feature = "serde", serde(rename = "<="))]
    LessOrEqual,
    /// `~` (approximately)
    #[cfg_attr(feature = "serde", serde(rename = "~"))]
    Approximately,
    /// Case-insensitive substring match.
    #[cfg_attr(feature = "serde", serde(rename = "contains"))]
    Contains,
    /// String prefix match.
    #[cfg_attr(feature = "serde", serde(rename = "starts-with"))]
    StartsWith,
    /// String suffix match.
    #[cfg_attr(feature = "serde", serde(rename = "ends-with"))]
    EndsWith,
    /// Case-sensitive exact match.
    #[cfg_attr(feature = "serde", serde(rename = "exact"))]
    Exact,
    /// Period starts after the value.
    #[cfg_attr(feature = "serde", serde(rename = "starts-after"))]
    StartsAfter,
    /// Period ends before the value.
    #[cfg_attr(feature = "serde", serde(rename = "ends-before"))]
    EndsBefore,
    /// Period overlaps the value.
    #[cfg_attr(feature = "serde", serde(rename = "overlaps"))]
    Overlaps,
    /// Element is present.
    #[cfg_attr(feature = "serde", serde(rename = "exists"))]
    Exists,
    /// Element is absent (`:missing`).
    #[cfg_attr(feature = "serde", serde(rename = "missing"))]
    Missing,
    /// Full-text search.
    #[cfg_attr(feature = "serde", serde(rename = "text"))]
    Text,
    /// Pattern match.
    #[cfg_attr(feature = "serde", serde(rename = "match"))]
    Match,
    /// Code is in a value set.
    #[cfg_attr(feature = "serde", serde(rename = "in"))]
    In,
    /// Code is not in a value set.
    #[cfg_attr(feature = "serde", serde(rename = "not-in"))]
    NotIn,
    /// Concept subsumes the value (`:above`, `ss`).
    #[cfg_attr(feature = "serde", serde(rename = "subsumes"))]
    Subsumes,
    /// Concept is subsumed by the value (`:below`, `sb`).
    #[cfg_attr(feature = "serde", serde(rename = "subsumed-by"))]
    SubsumedBy,
    /// References the value (`re`).
    #[cfg_attr(feature = "serde", serde(rename = "references"))]
    References,
    /// Match by identifier (`:identifier`).
    #[cfg_attr(feature = "serde", serde(rename = "identified-by"))]
    IdentifiedBy,
    /// Negated token match (`:not`).
    #[cfg_attr(feature = "serde", serde(rename = "not"))]
    Not,
}

impl Operator {
    /// The symbol or keyword naming this operator in the AST.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Approximately => "~",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts-with",
            Operator::EndsWith => "ends-with",
            Operator::Exact => "exact",
            Operator::StartsAfter => "starts-after",
            Operator::EndsBefore => "ends-before",
            Operator::Overlaps => "overlaps",
            Operator::Exists => "exists",
            Operator::Missing => "missing",
            Operator::Text => "text",
            Operator::Match => "match",
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::Subsumes => "subsumes",
            Operator::SubsumedBy => "subsumed-by",
            Operator::References => "references",
            Operator::IdentifiedBy => "identified-by",
            Operator::Not => "not",
        }
    }

    /// Maps a two-letter value prefix (`ge`, `ne`, ...) to its operator.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "eq" => Operator::Equal,
            "ne" => Operator::NotEqual,
            "gt" => Operator::GreaterThan,
            "lt" => Operator::LessThan,
            "ge" => Operator::GreaterOrEqual,
            "le" => Operator::LessOrEqual,
            "sa" => Operator::StartsAfter,
            "eb" => Operator::EndsBefore,
            "ap" => Operator::Approximately,
            _ => return None,
        })
    }

    /// The value prefix that selects this operator, if there is one.
    pub fn prefix(self) -> Option<&'static str> {
        Some(match self {
            Operator::Equal => "eq",
            Operator::NotEqual => "ne",
            Operator::GreaterThan => "gt",
            Operator::LessThan => "lt",
            Operator::GreaterOrEqual => "ge",
            Operator::LessOrEqual => "le",
            Operator::StartsAfter => "sa",
            Operator::EndsBefore => "eb",
            Operator::Approximately => "ap",
            _ => return None,
        })
    }

    /// Maps a `_filter` comparison keyword (`co`, `sw`, ...) to its operator.
    pub fn from_filter_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "co" => Operator::Contains,
            "sw" => Operator::StartsWith,
            "ew" => Operator::EndsWith,
            "pr" => Operator::Exists,
            "po" => Operator::Overlaps,
            "ss" => Operator::Subsumes,
            "sb" => Operator::SubsumedBy,
            "re" => Operator::References,
            "in" => Operator::In,
            "ni" => Operator::NotIn,
            other => return Operator::from_prefix(other),
        })
    }

    /// The `_filter` keyword for this operator, if the filter language has one.
    pub fn filter_keyword(self) -> Option<&'static str> {
        Some(match self {
            Operator::Contains => "co",
            Operator::StartsWith => "sw",
            Operator::EndsWith => "ew",
            Operator::Exists => "pr",
            Operator::Overlaps => "po",
            Operator::Subsumes => "ss",
            Operator::SubsumedBy => "sb",
            Operator::References => "re",
            Operator::In => "in",
            Operator::NotIn => "ni",
            other => return other.prefix(),
        })
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// =============================================================================
// Values
// =============================================================================

/// Precision of a date literal, derived from which components are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DatePrecision {
    /// `YYYY`
    Year,
    /// `YYYY-MM`
    Month,
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DDThh:mm`
    Time,
    /// `YYYY-MM-DDThh:mm:ss[.sss]`
    Second,
}

/// A calendar date or date-time literal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DateValue {
    /// The literal as written (ISO 8601).
    pub value: String,
    /// Precision implied by the literal.
    pub precision: DatePrecision,
}

/// A coded value: `[system|]code[|display]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TokenValue {
    /// Code system URI.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub system: Option<String>,
    /// The code.
    pub code: String,
    /// Display text.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub display: Option<String>,
}

/// A resource reference: `Type/id` or an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ReferenceValue {
    /// Referenced resource type.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub resource_type: Option<String>,
    /// Logical id.
    pub id: String,
    /// Absolute URL the reference was written as.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub url: Option<String>,
}

/// Comparator carried inside a quantity literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuantityComparator {
    /// `<`
    #[cfg_attr(feature = "serde", serde(rename = "<"))]
    LessThan,
    /// `<=`
    #[cfg_attr(feature = "serde", serde(rename = "<="))]
    LessOrEqual,
    /// `>=`
    #[cfg_attr(feature = "serde", serde(rename = ">="))]
    GreaterOrEqual,
    /// `>`
    #[cfg_attr(feature = "serde", serde(rename = ">"))]
    GreaterThan,
}

impl QuantityComparator {
    /// Maps a value prefix to a comparator; only the four ordering prefixes have one.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "gt" => Some(QuantityComparator::GreaterThan),
            "lt" => Some(QuantityComparator::LessThan),
            "ge" => Some(QuantityComparator::GreaterOrEqual),
            "le" => Some(QuantityComparator::LessOrEqual),
            _ => None,
        }
    }

    /// The value prefix that produces this comparator.
    pub fn prefix(self) -> &'static str {
        match self {
            QuantityComparator::LessThan => "lt",
            QuantityComparator::LessOrEqual => "le",
            QuantityComparator::GreaterOrEqual => "ge",
            QuantityComparator::GreaterThan => "gt",
        }
    }

    /// Parses a literal comparator symbol. `=` and the empty string have none.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(QuantityComparator::LessThan),
            "<=" => Some(QuantityComparator::LessOrEqual),
            ">=" => Some(QuantityComparator::GreaterOrEqual),
            ">" => Some(QuantityComparator::GreaterThan),
            _ => None,
        }
    }
}

impl std::fmt::Display for QuantityComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantityComparator::LessThan => write!(f, "<"),
            QuantityComparator::LessOrEqual => write!(f, "<="),
            QuantityComparator::GreaterOrEqual => write!(f, ">="),
            QuantityComparator::GreaterThan => write!(f, ">"),
        }
    }
}

/// A numeric quantity with optional comparator and unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct QuantityValue {
    /// Numeric value.
    pub value: f64,
    /// Comparator from a value prefix or an inline symbol.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub comparator: Option<QuantityComparator>,
    /// Unit.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub unit: Option<String>,
    /// Unit system.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub system: Option<String>,
    /// Unit code.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub code: Option<String>,
}

impl QuantityValue {
    /// A bare quantity with no comparator or unit.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            comparator: None,
            unit: None,
            system: None,
            code: None,
        }
    }
}

/// A typed literal value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum Value {
    /// Free text.
    String {
        /// The text.
        value: String,
    },
    /// A plain number.
    Number {
        /// The number.
        value: f64,
    },
    /// `true` / `false`.
    Boolean {
        /// The flag.
        value: bool,
    },
    /// A date or date-time.
    Date(DateValue),
    /// A coded value.
    Token(TokenValue),
    /// A resource reference.
    Reference(ReferenceValue),
    /// A quantity.
    Quantity(QuantityValue),
    /// Components of a composite parameter, in order.
    Composite {
        /// The component values.
        parts: Vec<Value>,
    },
}

impl Value {
    /// A string value.
    pub fn string(value: impl Into<String>) -> Self {
        Value::String {
            value: value.into(),
        }
    }

    /// A number value.
    pub fn number(value: f64) -> Self {
        Value::Number { value }
    }

    /// A boolean value.
    pub fn boolean(value: bool) -> Self {
        Value::Boolean { value }
    }

    /// A token value holding only a code.
    pub fn code(code: impl Into<String>) -> Self {
        Value::Token(TokenValue {
            code: code.into(),
            ..TokenValue::default()
        })
    }

    /// A date value with the given precision.
    pub fn date(value: impl Into<String>, precision: DatePrecision) -> Self {
        Value::Date(DateValue {
            value: value.into(),
            precision,
        })
    }

    /// The `type` tag of this value.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String { .. } => "string",
            Value::Number { .. } => "number",
            Value::Boolean { .. } => "boolean",
            Value::Date(_) => "date",
            Value::Token(_) => "token",
            Value::Reference(_) => "reference",
            Value::Quantity(_) => "quantity",
            Value::Composite { .. } => "composite",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String { value } => write!(f, "\"{}\"", value),
            Value::Number { value } => write!(f, "{}", value),
            Value::Boolean { value } => write!(f, "{}", value),
            Value::Date(d) => write!(f, "{}", d.value),
            Value::Token(t) => {
                if let Some(ref system) = t.system {
                    write!(f, "{}|", system)?;
                }
                write!(f, "{}", t.code)?;
                if let Some(ref display) = t.display {
                    write!(f, "|{}", display)?;
                }
                Ok(())
            }
            Value::Reference(r) => match (&r.url, &r.resource_type) {
                (Some(url), _) => write!(f, "{}", url),
                (None, Some(rt)) => write!(f, "{}/{}", rt, r.id),
                (None, None) => write!(f, "{}", r.id),
            },
            Value::Quantity(q) => {
                if let Some(c) = q.comparator {
                    write!(f, "{}", c)?;
                }
                write!(f, "{}", q.value)?;
                if let Some(ref unit) = q.unit {
                    write!(f, " {}", unit)?;
                }
                Ok(())
            }
            Value::Composite { parts } => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "$")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// A single parameter comparison: `param <operator> value[, value...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// The operator.
    pub operator: Operator,
    /// Parameter name (or `_filter` path).
    pub param: String,
    /// Values, OR-combined. Never empty.
    pub value: Vec<Value>,
    /// Parameter definition attached by [`crate::enrich`].
    pub search_param: Option<SearchParamDefinition>,
}

impl Comparison {
    /// Creates a comparison against a single value.
    pub fn new(operator: Operator, param: impl Into<String>, value: Value) -> Self {
        Self {
            operator,
            param: param.into(),
            value: vec![value],
            search_param: None,
        }
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A comparison on one parameter.
    Compare(Comparison),
    /// Conjunction of two or more expressions.
    And(Vec<Expression>),
    /// Disjunction of two or more expressions.
    Or(Vec<Expression>),
    /// Negation.
    Not(Box<Expression>),
    /// A condition on a related resource.
    Join(Box<Join>),
}

impl Expression {
    /// Shorthand for a single-valued comparison.
    pub fn compare(operator: Operator, param: impl Into<String>, value: Value) -> Self {
        Expression::Compare(Comparison::new(operator, param, value))
    }

    /// Combines expressions with AND.
    ///
    /// Nested `and` children are spliced in, and a single expression is
    /// returned unwrapped. Returns `None` for an empty input.
    pub fn all(expressions: Vec<Expression>) -> Option<Expression> {
        Self::combine(expressions, true)
    }

    /// Combines expressions with OR; same flattening rules as [`Expression::all`].
    pub fn any(expressions: Vec<Expression>) -> Option<Expression> {
        Self::combine(expressions, false)
    }

    fn combine(expressions: Vec<Expression>, conjunction: bool) -> Option<Expression> {
        let mut flat = Vec::with_capacity(expressions.len());
        for expr in expressions {
            match expr {
                Expression::And(children) if conjunction => flat.extend(children),
                Expression::Or(children) if !conjunction => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ if conjunction => Some(Expression::And(flat)),
            _ => Some(Expression::Or(flat)),
        }
    }

    /// Negates an expression.
    pub fn negate(expression: Expression) -> Expression {
        Expression::Not(Box::new(expression))
    }

    /// The `type` tag of this node: the operator symbol for comparisons.
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Compare(c) => c.operator.symbol(),
            Expression::And(_) => "and",
            Expression::Or(_) => "or",
            Expression::Not(_) => "not",
            Expression::Join(_) => "join",
        }
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Compare(c) => {
                write!(f, "{} {} ", c.param, c.operator)?;
                for (i, v) in c.value.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
            Expression::And(children) | Expression::Or(children) => {
                let keyword = if matches!(self, Expression::And(_)) {
                    " and "
                } else {
                    " or "
                };
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", keyword)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Expression::Not(inner) => write!(f, "not {}", inner),
            Expression::Join(join) => write!(f, "{}", join),
        }
    }
}

// =============================================================================
// Joins
// =============================================================================

/// Direction of the reference a join follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum JoinKind {
    /// `parent.param -> joined.id` (forward chain).
    Reference,
    /// `joined.param -> parent.id` (`_has` reverse chain).
    ReverseReference,
}

/// The link between a join and its parent resource.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct JoinOn {
    /// Link direction.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: JoinKind,
    /// The reference parameter driving the link.
    pub param: String,
}

/// One hop across a reference.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Join {
    /// Resource type on the far side of the hop.
    pub resource: String,
    /// True when `resource` was guessed from the parameter name rather
    /// than written in the key; only such hops are narrowed by [`crate::enrich`].
    #[cfg_attr(feature = "serde", serde(skip))]
    pub inferred: bool,
    /// How the joined resource relates to its parent.
    pub on: JoinOn,
    /// Conditions on the joined resource, possibly further joins.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "where", skip_serializing_if = "Option::is_none")
    )]
    pub filter: Option<Expression>,
    /// Definition of the linking parameter attached by [`crate::enrich`].
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub search_param: Option<SearchParamDefinition>,
}

impl std::fmt::Display for Join {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arrow = match self.on.kind {
            JoinKind::Reference => "->",
            JoinKind::ReverseReference => "<-",
        };
        write!(f, "join {} {} {}", self.on.param, arrow, self.resource)?;
        if let Some(ref filter) = self.filter {
            write!(f, " where {}", filter)?;
        }
        Ok(())
    }
}

// =============================================================================
// Includes
// =============================================================================

/// `_include` (forward) or `_revinclude` (reverse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IncludeDirection {
    /// `_include`
    Forward,
    /// `_revinclude`
    Reverse,
}

/// An eager-loading directive. Does not filter the result set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IncludeExpression {
    /// Include direction.
    pub direction: IncludeDirection,
    /// Source resource type.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub source: Option<String>,
    /// Reference parameter, or `*`.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub param: Option<String>,
    /// Target resource type constraint.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub target: Option<String>,
    /// Apply to included resources as well (`:iterate`).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "std::ops::Not::not"))]
    pub iterate: bool,
    /// Alternative spelling of `iterate` (`:recurse`).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "std::ops::Not::not"))]
    pub recurse: bool,
    /// Follow logical (identifier) references.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "std::ops::Not::not"))]
    pub logical: bool,
    /// Elements to return from included resources.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub select: Option<ElementSelection>,
    /// Includes applied to the included resources.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub includes: Vec<IncludeExpression>,
}

impl IncludeExpression {
    /// An empty include in the given direction.
    pub fn new(direction: IncludeDirection) -> Self {
        Self {
            direction,
            source: None,
            param: None,
            target: None,
            iterate: false,
            recurse: false,
            logical: false,
            select: None,
            includes: Vec::new(),
        }
    }

    /// Sets the source type and parameter.
    pub fn with_param(mut self, source: impl Into<String>, param: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self.param = Some(param.into());
        self
    }

    /// Restricts the target type.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Selects elements of the included resources.
    pub fn with_select(mut self, select: ElementSelection) -> Self {
        self.select = Some(select);
        self
    }

    /// Adds a nested include.
    pub fn with_include(mut self, include: IncludeExpression) -> Self {
        self.includes.push(include);
        self
    }
}

// =============================================================================
// Result controls
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending (`-param`).
    Desc,
}

/// One `_sort` key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SortParam {
    /// Parameter to sort by.
    pub param: String,
    /// Direction.
    pub direction: SortDirection,
}

/// `_summary` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SummaryMode {
    /// `true`
    True,
    /// `false`
    False,
    /// `count`
    Count,
    /// `data`
    Data,
    /// `text`
    Text,
}

impl SummaryMode {
    /// Parses a `_summary` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "true" => Some(SummaryMode::True),
            "false" => Some(SummaryMode::False),
            "count" => Some(SummaryMode::Count),
            "data" => Some(SummaryMode::Data),
            "text" => Some(SummaryMode::Text),
            _ => None,
        }
    }

    /// The query-string spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryMode::True => "true",
            SummaryMode::False => "false",
            SummaryMode::Count => "count",
            SummaryMode::Data => "data",
            SummaryMode::Text => "text",
        }
    }
}

/// `_contained` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ContainedMode {
    /// Only contained resources.
    True,
    /// Only non-contained resources.
    False,
    /// Both.
    Both,
}

impl ContainedMode {
    /// Parses a `_contained` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "true" => Some(ContainedMode::True),
            "false" => Some(ContainedMode::False),
            "both" => Some(ContainedMode::Both),
            _ => None,
        }
    }

    /// The query-string spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ContainedMode::True => "true",
            ContainedMode::False => "false",
            ContainedMode::Both => "both",
        }
    }
}

/// `_containedType` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ContainedType {
    /// Return the container resource.
    Container,
    /// Return the contained resource.
    Contained,
}

impl ContainedType {
    /// Parses a `_containedType` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "container" => Some(ContainedType::Container),
            "contained" => Some(ContainedType::Contained),
            _ => None,
        }
    }

    /// The query-string spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ContainedType::Container => "container",
            ContainedType::Contained => "contained",
        }
    }
}

// =============================================================================
// Element selection
// =============================================================================

/// A node of an [`ElementSelection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementNode {
    /// The whole element is selected.
    Leaf,
    /// Only the listed sub-elements are selected.
    Nested(ElementSelection),
}

/// Selected elements as a tree, built from dotted paths.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ElementSelection {
    fields: BTreeMap<String, ElementNode>,
}

impl ElementSelection {
    /// Folds dotted paths (`name.given`) into a selection tree.
    ///
    /// A later path wins over an earlier one at the same field: `a,a.b`
    /// narrows `a` to `b`, `a.b,a` widens it back to the whole element.
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut root = ElementSelection::default();
        for path in paths {
            root.insert_path(path);
        }
        root
    }

    /// Adds one dotted path, replacing whatever was selected at that field.
    pub fn insert_path(&mut self, path: &str) {
        let mut segments = path.split('.').filter(|s| !s.is_empty()).peekable();
        let mut current = self;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.fields.insert(segment.to_string(), ElementNode::Leaf);
                return;
            }
            let node = current
                .fields
                .entry(segment.to_string())
                .or_insert(ElementNode::Leaf);
            if matches!(node, ElementNode::Leaf) {
                *node = ElementNode::Nested(ElementSelection::default());
            }
            let ElementNode::Nested(child) = node else {
                return;
            };
            current = child;
        }
    }

    /// Looks up a top-level field.
    pub fn get(&self, field: &str) -> Option<&ElementNode> {
        self.fields.get(field)
    }

    /// True when nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates top-level fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ElementNode)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Dotted paths of all selected leaves, in name order.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, node) in &self.fields {
            match node {
                ElementNode::Leaf => out.push(name.clone()),
                ElementNode::Nested(child) => {
                    out.extend(child.paths().into_iter().map(|p| format!("{}.{}", name, p)))
                }
            }
        }
        out
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ElementNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ElementNode::Leaf => serializer.serialize_bool(true),
            ElementNode::Nested(child) => child.serialize(serializer),
        }
    }
}

// =============================================================================
// Query root
// =============================================================================

/// A parsed search request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SearchQuery {
    /// The resource type searched.
    pub resource: String,
    /// Combined filter over all filtering parameters.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "where", skip_serializing_if = "Option::is_none")
    )]
    pub filter: Option<Expression>,
    /// Eager-loading directives in request order.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub includes: Vec<IncludeExpression>,
    /// Sort keys in priority order.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub sort: Vec<SortParam>,
    /// Page size.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub count: Option<u64>,
    /// Page offset.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub offset: Option<u64>,
    /// Summary mode.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub summary: Option<SummaryMode>,
    /// Element selection.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub elements: Option<ElementSelection>,
    /// Contained-resource handling.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub contained: Option<ContainedMode>,
    /// Which side of a containment to return.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub contained_type: Option<ContainedType>,
}

impl SearchQuery {
    /// A query on `resource` with no other fields set.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            filter: None,
            includes: Vec::new(),
            sort: Vec::new(),
            count: None,
            offset: None,
            summary: None,
            elements: None,
            contained: None,
            contained_type: None,
        }
    }
}

// =============================================================================
// Serde shapes that do not derive
// =============================================================================

#[cfg(feature = "serde")]
impl serde::Serialize for Expression {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.kind())?;
        match self {
            Expression::Compare(c) => {
                map.serialize_entry("param", &c.param)?;
                map.serialize_entry("value", &c.value)?;
                if let Some(ref sp) = c.search_param {
                    map.serialize_entry("searchParam", sp)?;
                }
            }
            Expression::And(children) | Expression::Or(children) => {
                map.serialize_entry("expressions", children)?;
            }
            Expression::Not(inner) => map.serialize_entry("expression", inner)?,
            Expression::Join(join) => map.serialize_entry("join", join)?,
        }
        map.end()
    }
}
