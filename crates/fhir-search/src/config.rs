//! Configuration types for the search parser.

use std::collections::HashMap;

/// Default bound on nested groups, chain hops, `_has` levels and `_elements`
/// path segments.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Configuration for the search parser.
///
/// # Example
///
/// ```rust
/// use fhir_search::ParserConfig;
///
/// let config = ParserConfig::builder()
///     .with_max_depth(16)
///     .with_chain_target("author", "Practitioner")
///     .build();
/// assert_eq!(config.max_depth, 16);
/// ```
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum nesting depth for `_filter` groups, forward chains, `_has` and
    /// `_elements` paths.
    pub max_depth: usize,
    /// Resource types assumed for chains without an explicit type.
    pub chain_targets: ChainTargets,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            chain_targets: ChainTargets::default(),
        }
    }
}

impl ParserConfig {
    /// Creates a new builder for ParserConfig.
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::default()
    }
}

/// Builder for ParserConfig.
#[derive(Debug, Clone, Default)]
pub struct ParserConfigBuilder {
    max_depth: Option<usize>,
    chain_targets: Option<ChainTargets>,
    extra_targets: Vec<(String, String)>,
}

impl ParserConfigBuilder {
    /// Sets the maximum nesting depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Replaces the whole chain-target table.
    pub fn with_chain_targets(mut self, targets: ChainTargets) -> Self {
        self.chain_targets = Some(targets);
        self
    }

    /// Adds or overrides one chain-target entry.
    pub fn with_chain_target(
        mut self,
        param: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        self.extra_targets.push((param.into(), resource_type.into()));
        self
    }

    /// Builds the ParserConfig.
    pub fn build(self) -> ParserConfig {
        let mut chain_targets = self.chain_targets.unwrap_or_default();
        for (param, resource_type) in self.extra_targets {
            chain_targets.insert(param, resource_type);
        }
        ParserConfig {
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            chain_targets,
        }
    }
}

/// Reference parameter name → resource type, for chains like `subject.name`
/// that do not name their target type.
///
/// A schema-aware caller can narrow join targets with [`crate::enrich`]
/// after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTargets {
    table: HashMap<String, String>,
}

impl Default for ChainTargets {
    fn default() -> Self {
        const DEFAULTS: &[(&str, &str)] = &[
            ("subject", "Patient"),
            ("patient", "Patient"),
            ("beneficiary", "Patient"),
            ("performer", "Practitioner"),
            ("practitioner", "Practitioner"),
            ("general-practitioner", "Practitioner"),
            ("requester", "Practitioner"),
            ("organization", "Organization"),
            ("managing-organization", "Organization"),
            ("managingOrganization", "Organization"),
            ("custodian", "Organization"),
            ("encounter", "Encounter"),
            ("location", "Location"),
            ("device", "Device"),
        ];
        let table = DEFAULTS
            .iter()
            .map(|(p, r)| (p.to_string(), r.to_string()))
            .collect();
        Self { table }
    }
}

impl ChainTargets {
    /// An empty table; every lookup falls back to the PascalCase name.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, param: impl Into<String>, resource_type: impl Into<String>) {
        self.table.insert(param.into(), resource_type.into());
    }

    /// The table entry for `param`, if any.
    pub fn get(&self, param: &str) -> Option<&str> {
        self.table.get(param).map(String::as_str)
    }

    /// The resource type assumed for a chain through `param`.
    ///
    /// Falls back to the parameter name in PascalCase (`based-on` → `BasedOn`).
    pub fn resolve(&self, param: &str) -> String {
        match self.get(param) {
            Some(resource_type) => resource_type.to_string(),
            None => pascal_case(param),
        }
    }
}

fn pascal_case(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_config_default() {
        let config = ParserConfig::default();
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.chain_targets.get("subject"), Some("Patient"));
    }

    #[test]
    fn test_parser_config_builder() {
        let config = ParserConfig::builder()
            .with_max_depth(4)
            .with_chain_target("subject", "Group")
            .build();

        assert_eq!(config.max_depth, 4);
        assert_eq!(config.chain_targets.resolve("subject"), "Group");
        assert_eq!(config.chain_targets.resolve("patient"), "Patient");
    }

    #[test]
    fn test_builder_replaces_table() {
        let config = ParserConfig::builder()
            .with_chain_targets(ChainTargets::empty())
            .with_chain_target("focus", "Condition")
            .build();

        assert_eq!(config.chain_targets.get("subject"), None);
        assert_eq!(config.chain_targets.resolve("focus"), "Condition");
    }

    #[test]
    fn test_resolve_falls_back_to_pascal_case() {
        let targets = ChainTargets::default();
        assert_eq!(targets.resolve("encounter"), "Encounter");
        assert_eq!(targets.resolve("based-on"), "BasedOn");
        assert_eq!(targets.resolve("part_of"), "PartOf");
    }
}
