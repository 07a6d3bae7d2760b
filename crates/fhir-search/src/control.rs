//! Result-control parameters: `_sort`, `_count`, `_include` and friends.
//!
//! Each setter converts one raw value and writes it to the query, replacing
//! what an earlier occurrence of the same key wrote. Includes are the one
//! exception: every `_include` / `_revinclude` appends.

use crate::ast::{
    ContainedMode, ContainedType, ElementSelection, IncludeDirection, IncludeExpression,
    SearchQuery, SortDirection, SortParam, SummaryMode,
};
use crate::error::{SearchError, SearchResult};

/// A recognised control parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Sort,
    Count,
    Offset,
    Summary,
    Elements,
    Include { direction: IncludeDirection, iterate: bool, recurse: bool },
    Contained,
    ContainedType,
}

impl Control {
    /// Recognises a control key, including `_include:iterate` style modifiers.
    pub(crate) fn from_key(key: &str) -> Option<Self> {
        let (base, modifier) = match key.split_once(':') {
            Some((base, modifier)) => (base, Some(modifier)),
            None => (key, None),
        };
        let direction = match base {
            "_include" => IncludeDirection::Forward,
            "_revinclude" => IncludeDirection::Reverse,
            _ if modifier.is_some() => return None,
            "_sort" => return Some(Control::Sort),
            "_count" => return Some(Control::Count),
            "_offset" => return Some(Control::Offset),
            "_summary" => return Some(Control::Summary),
            "_elements" => return Some(Control::Elements),
            "_contained" => return Some(Control::Contained),
            "_containedType" => return Some(Control::ContainedType),
            _ => return None,
        };
        let (iterate, recurse) = match modifier {
            None => (false, false),
            Some("iterate") => (true, false),
            Some("recurse") => (false, true),
            Some(_) => return None,
        };
        Some(Control::Include {
            direction,
            iterate,
            recurse,
        })
    }

    /// Applies `value` to `query`.
    ///
    /// `max_depth` bounds the number of segments in one `_elements` path.
    pub(crate) fn apply(
        self,
        key: &str,
        value: &str,
        max_depth: usize,
        query: &mut SearchQuery,
    ) -> SearchResult<()> {
        let invalid = || SearchError::InvalidControlValue {
            parameter: key.to_string(),
            value: value.to_string(),
        };

        match self {
            Control::Sort => query.sort = parse_sort(value),
            Control::Count => query.count = Some(value.trim().parse().map_err(|_| invalid())?),
            Control::Offset => query.offset = Some(value.trim().parse().map_err(|_| invalid())?),
            Control::Summary => query.summary = Some(SummaryMode::parse(value).ok_or_else(invalid)?),
            Control::Elements => {
                let selection = parse_elements(value, max_depth).ok_or_else(invalid)?;
                query.elements = (!selection.is_empty()).then_some(selection);
            }
            Control::Include {
                direction,
                iterate,
                recurse,
            } => {
                let mut include = parse_include(direction, value).ok_or_else(invalid)?;
                include.iterate |= iterate;
                include.recurse |= recurse;
                query.includes.push(include);
            }
            Control::Contained => {
                query.contained = Some(ContainedMode::parse(value).ok_or_else(invalid)?)
            }
            Control::ContainedType => {
                query.contained_type = Some(ContainedType::parse(value).ok_or_else(invalid)?)
            }
        }
        Ok(())
    }
}

/// `_sort=a,-b` → `a` ascending, `b` descending. Empty entries are skipped.
fn parse_sort(value: &str) -> Vec<SortParam> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.strip_prefix('-') {
            Some(param) => SortParam {
                param: param.to_string(),
                direction: SortDirection::Desc,
            },
            None => SortParam {
                param: entry.to_string(),
                direction: SortDirection::Asc,
            },
        })
        .collect()
}

/// `_elements=id,name.given` → a selection tree, or `None` when a path is
/// deeper than `max_depth` segments.
fn parse_elements(value: &str, max_depth: usize) -> Option<ElementSelection> {
    let mut selection = ElementSelection::default();
    for path in value.split(',').map(str::trim) {
        if path.split('.').filter(|s| !s.is_empty()).count() > max_depth {
            return None;
        }
        selection.insert_path(path);
    }
    Some(selection)
}

/// `[iterate:|recurse:][logical:]Source:param[:Target]`, or `*`.
fn parse_include(direction: IncludeDirection, value: &str) -> Option<IncludeExpression> {
    let mut include = IncludeExpression::new(direction);
    let mut rest = value.trim();

    loop {
        if let Some(after) = rest.strip_prefix("iterate:") {
            include.iterate = true;
            rest = after;
        } else if let Some(after) = rest.strip_prefix("recurse:") {
            include.recurse = true;
            rest = after;
        } else if let Some(after) = rest.strip_prefix("logical:") {
            include.logical = true;
            rest = after;
        } else {
            break;
        }
    }

    let parts: Vec<&str> = rest.split(':').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    match parts.as_slice() {
        ["*"] => include.param = Some("*".to_string()),
        [source, param] => include = include.with_param(*source, *param),
        [source, param, target] => include = include.with_param(*source, *param).with_target(*target),
        _ => return None,
    }
    Some(include)
}
