//! # fhir-search
//!
//! A Rust library that parses FHIR RESTful search URLs into a typed
//! abstract syntax tree, ready for a query planner.
//!
//! This crate provides:
//! - **Search parser**: `/Type?key=value&...` into a [`SearchQuery`]
//! - **Value inference**: typed literals (dates, tokens, quantities, references)
//!   from untyped parameter values
//! - **Join trees**: forward chains (`subject.name`) and reverse chains
//!   (`_has:Observation:patient:code`) as nested [`Join`] nodes
//! - **`_filter` parser**: the boolean filter sub-language
//! - **Rendering**: canonical query strings back from a [`SearchQuery`]
//!
//! ## Usage
//!
//! ```rust
//! use fhir_search::{parse, Expression, JoinKind};
//!
//! let result = parse("/Observation?subject.name=Peter&_count=10");
//! let query = result.query().unwrap();
//!
//! assert_eq!(query.resource, "Observation");
//! assert_eq!(query.count, Some(10));
//! match query.filter {
//!     Some(Expression::Join(ref join)) => {
//!         assert_eq!(join.resource, "Patient");
//!         assert_eq!(join.on.kind, JoinKind::Reference);
//!     }
//!     _ => unreachable!(),
//! }
//! ```
//!
//! Failures never panic; they come back in the result:
//!
//! ```rust
//! let result = fhir_search::parse("/Patient?_has:invalid");
//! assert!(result.query().is_none());
//! assert_eq!(result.errors()[0].parameter.as_deref(), Some("_has:invalid"));
//! ```
//!
//! ## Parameter Syntax Quick Reference
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `name=v` | Equality | `name=John` |
//! | `name=v1,v2` | Any of | `name=John,Peter` |
//! | `name=ge2010` | Value prefix | `birthdate=ge2010-01-01` |
//! | `name:mod=v` | Modifier | `name:exact=John` |
//! | `ref.name=v` | Forward chain | `subject.name=Peter` |
//! | `ref:Type.name=v` | Typed chain | `subject:Patient.name=Peter` |
//! | `_has:T:ref:name=v` | Reverse chain | `_has:Observation:patient:code=1234-5` |
//! | `_filter=expr` | Filter language | `_filter=name eq 'John' or gender eq male` |
//! | `a$b` | Composite value | `code-value-quantity=1234-5$gt5` |
//! | `sys\|code` | Token value | `code=http://loinc.org\|1234-5` |
//!
//! ## Features
//!
//! - `serde`: `Serialize` for the AST, [`ParseResult`] and [`ParseError`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod ast;
mod config;
mod control;
mod enrich;
mod error;
mod escape;
pub mod filter;
mod format;
mod infer;
mod join;
mod param;
mod parser;
mod result;

pub use ast::{
    Comparison, ContainedMode, ContainedType, DatePrecision, DateValue, ElementNode,
    ElementSelection, Expression, IncludeDirection, IncludeExpression, Join, JoinKind, JoinOn,
    Operator, QuantityComparator, QuantityValue, ReferenceValue, SearchQuery, SortDirection,
    SortParam, SummaryMode, TokenValue, Value,
};
pub use config::{ChainTargets, ParserConfig, ParserConfigBuilder, DEFAULT_MAX_DEPTH};
pub use enrich::{enrich, SearchParamDefinition, SearchParamProvider, SearchParamType};
pub use error::{ParseError, SearchError, SearchResult};
pub use filter::{parse_filter, parse_filter_with_depth};
pub use format::{to_query_string, to_url};
pub use infer::infer_value;
pub use param::{Modifier, ParamName, ReverseChain};
pub use parser::{parse, parse_query, SearchParser};
pub use result::ParseResult;
