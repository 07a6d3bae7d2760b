//! Attaching search parameter definitions to a parsed query.
//!
//! The parser never needs schema knowledge. A caller that has it implements
//! [`SearchParamProvider`] and runs [`enrich`] over the parsed query:
//!
//! ```rust
//! use fhir_search::{
//!     enrich, parse_query, SearchParamDefinition, SearchParamProvider, SearchParamType,
//! };
//!
//! struct Registry;
//!
//! impl SearchParamProvider for Registry {
//!     fn search_param(&self, resource_type: &str, code: &str) -> Option<SearchParamDefinition> {
//!         match (resource_type, code) {
//!             ("Observation", "subject") => Some(
//!                 SearchParamDefinition::new("subject", SearchParamType::Reference)
//!                     .with_base("Observation")
//!                     .with_target("Group"),
//!             ),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let query = parse_query("/Observation?subject.name=Peter").unwrap();
//! let query = enrich(query, &Registry);
//! ```

use tracing::trace;

use crate::ast::{Expression, JoinKind, SearchQuery};

/// Declared value type of a search parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SearchParamType {
    /// Numeric search.
    Number,
    /// Date or date-time search.
    Date,
    /// Free-text string search.
    String,
    /// Coded value search.
    Token,
    /// Reference search.
    Reference,
    /// Multi-part search.
    Composite,
    /// Quantity search.
    Quantity,
    /// URI search.
    Uri,
    /// Server-defined search.
    Special,
}

/// Metadata about one search parameter, as supplied by a schema registry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SearchParamDefinition {
    /// Computer-friendly name.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "String::is_empty"))]
    pub name: String,
    /// The code used in query strings.
    pub code: String,
    /// Declared value type.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: SearchParamType,
    /// Resource types the parameter applies to.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub base: Vec<String>,
    /// Resource types a reference parameter may point to.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub target: Vec<String>,
    /// Extraction expression.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub expression: Option<String>,
    /// Allowed modifiers.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub modifier: Vec<String>,
    /// Allowed value prefixes.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub comparator: Vec<String>,
    /// Parameters that may be chained through this one.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub chain: Vec<String>,
}

impl SearchParamDefinition {
    /// A definition with only a code and type.
    pub fn new(code: impl Into<String>, kind: SearchParamType) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            kind,
            base: Vec::new(),
            target: Vec::new(),
            expression: None,
            modifier: Vec::new(),
            comparator: Vec::new(),
            chain: Vec::new(),
        }
    }

    /// Adds a base resource type.
    pub fn with_base(mut self, resource_type: impl Into<String>) -> Self {
        self.base.push(resource_type.into());
        self
    }

    /// Adds a reference target type.
    pub fn with_target(mut self, resource_type: impl Into<String>) -> Self {
        self.target.push(resource_type.into());
        self
    }

    /// Sets the extraction expression.
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

/// Source of search parameter definitions.
///
/// Implement this for whatever holds your server's capability data; the
/// parser only calls it from [`enrich`].
pub trait SearchParamProvider {
    /// The definition of `code` on `resource_type`, if known.
    fn search_param(&self, resource_type: &str, code: &str) -> Option<SearchParamDefinition>;
}

impl<P: SearchParamProvider + ?Sized> SearchParamProvider for &P {
    fn search_param(&self, resource_type: &str, code: &str) -> Option<SearchParamDefinition> {
        (**self).search_param(resource_type, code)
    }
}

/// Attaches parameter definitions to the comparisons and joins of `query`.
///
/// Lookups use the resource type in scope at each node: the searched type at
/// the top, the joined type below a join. A forward join whose type was
/// inferred from the parameter name, and whose definition declares exactly
/// one other target, is retargeted. A type written in the key is kept. Nodes
/// the provider knows nothing about are left as they are.
pub fn enrich<P: SearchParamProvider + ?Sized>(mut query: SearchQuery, provider: &P) -> SearchQuery {
    if let Some(filter) = query.filter.take() {
        query.filter = Some(enrich_expression(filter, &query.resource, provider));
    }
    query
}

fn enrich_expression<P: SearchParamProvider + ?Sized>(
    expr: Expression,
    resource: &str,
    provider: &P,
) -> Expression {
    match expr {
        Expression::Compare(mut comparison) => {
            if comparison.search_param.is_none() {
                comparison.search_param = provider.search_param(resource, &comparison.param);
            }
            Expression::Compare(comparison)
        }
        Expression::And(children) => Expression::And(
            children
                .into_iter()
                .map(|c| enrich_expression(c, resource, provider))
                .collect(),
        ),
        Expression::Or(children) => Expression::Or(
            children
                .into_iter()
                .map(|c| enrich_expression(c, resource, provider))
                .collect(),
        ),
        Expression::Not(inner) => {
            Expression::negate(enrich_expression(*inner, resource, provider))
        }
        Expression::Join(mut join) => {
            let definition = match join.on.kind {
                JoinKind::Reference => provider.search_param(resource, &join.on.param),
                JoinKind::ReverseReference => provider.search_param(&join.resource, &join.on.param),
            };
            if let Some(ref def) = definition {
                if join.inferred
                    && join.on.kind == JoinKind::Reference
                    && def.target.len() == 1
                    && def.target[0] != join.resource
                {
                    trace!(
                        param = %join.on.param,
                        from = %join.resource,
                        to = %def.target[0],
                        "retargeting join"
                    );
                    join.resource = def.target[0].clone();
                    join.inferred = false;
                }
            }
            if join.search_param.is_none() {
                join.search_param = definition;
            }
            let joined = join.resource.clone();
            join.filter = join
                .filter
                .take()
                .map(|f| enrich_expression(f, &joined, provider));
            Expression::Join(join)
        }
    }
}
