//! Prefix to category lookup with learning of unseen prefixes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use mcpscout_config::FormatConfig;
use mcpscout_utils::types::{CategoryHint, CategoryInfo};

/// Derive the category prefix of an item key.
///
/// The prefix is the part before `delimiter`; without the delimiter it is the
/// part before the first `separator`; without either it is the whole key.
/// An empty result falls back to the whole key.
#[must_use]
pub fn derive_prefix(key: &str, delimiter: &str, separator: &str) -> String {
    let cut = |token: &str| {
        if token.is_empty() {
            None
        } else {
            key.find(token).map(|idx| &key[..idx])
        }
    };

    let prefix = cut(delimiter).or_else(|| cut(separator)).unwrap_or(key);
    if prefix.is_empty() { key } else { prefix }.to_string()
}

/// Persisted `prefix -> {category, description}` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryTable {
    entries: BTreeMap<String, CategoryInfo>,
}

impl CategoryTable {
    /// Parse the JSON table; blank content is an empty table
    ///
    /// # Errors
    ///
    /// Returns the JSON error for content that is not a table.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content)
    }

    /// Pretty JSON with a trailing newline
    ///
    /// # Errors
    ///
    /// Propagates serialization errors.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    #[must_use]
    pub fn lookup(&self, prefix: &str) -> Option<&CategoryInfo> {
        self.entries.get(prefix)
    }

    /// Add `prefix` unless it is already mapped; returns whether it was added
    pub fn insert(&mut self, prefix: &str, info: CategoryInfo) -> bool {
        if self.entries.contains_key(prefix) {
            return false;
        }
        self.entries.insert(prefix.to_string(), info);
        true
    }

    /// Distinct category keys in use
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|info| info.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Description of `category`, taken from the first prefix mapped to it
    #[must_use]
    pub fn description_of(&self, category: &str) -> Option<&str> {
        self.entries
            .values()
            .find(|info| info.category == category)
            .map(|info| info.description.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves item keys to category hints against an in-memory table.
///
/// Learned prefixes are inserted with [`CategoryResolver::learn`] so that
/// later items in the same run see them; persisting the table is the
/// publisher's job.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    table: CategoryTable,
    delimiter: String,
    separator: String,
}

impl CategoryResolver {
    #[must_use]
    pub fn new(table: CategoryTable, format: &FormatConfig) -> Self {
        Self {
            table,
            delimiter: format.prefix_delimiter.clone(),
            separator: format.prefix_separator.clone(),
        }
    }

    #[must_use]
    pub fn prefix_of(&self, key: &str) -> String {
        derive_prefix(key, &self.delimiter, &self.separator)
    }

    /// A known category, or a request to propose one for a new prefix
    #[must_use]
    pub fn resolve(&self, key: &str) -> CategoryHint {
        let prefix = self.prefix_of(key);
        match self.table.lookup(&prefix) {
            Some(info) => CategoryHint::Known(info.clone()),
            None => CategoryHint::NewPrefix { prefix },
        }
    }

    pub fn learn(&mut self, prefix: &str, info: CategoryInfo) -> bool {
        self.table.insert(prefix, info)
    }

    /// Replace the table with a freshly published copy
    pub fn replace_table(&mut self, table: CategoryTable) {
        self.table = table;
    }

    #[must_use]
    pub fn table(&self) -> &CategoryTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(category: &str) -> CategoryInfo {
        CategoryInfo {
            category: category.into(),
            description: format!("{category} servers"),
        }
    }

    #[test]
    fn test_prefix_rules() {
        assert_eq!(derive_prefix("brave-search-mcp-server", "-mcp", "-"), "brave-search");
        assert_eq!(derive_prefix("github-tools", "-mcp", "-"), "github");
        assert_eq!(derive_prefix("filesystem", "-mcp", "-"), "filesystem");
        assert_eq!(derive_prefix("-mcp-leading", "-mcp", "-"), "-mcp-leading");
        assert_eq!(derive_prefix("a_b", "", ""), "a_b");
    }

    #[test]
    fn test_table_roundtrip_and_blank() {
        assert!(CategoryTable::parse("  \n").unwrap().is_empty());

        let mut table = CategoryTable::default();
        assert!(table.insert("brave", info("search")));
        assert!(!table.insert("brave", info("other")));
        table.insert("tavily", info("search"));
        table.insert("notion", info("productivity"));

        let parsed = CategoryTable::parse(&table.to_json().unwrap()).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(parsed.categories(), ["productivity", "search"]);
        assert_eq!(parsed.description_of("search"), Some("search servers"));
        assert!(CategoryTable::parse("[1]").is_err());
    }

    #[test]
    fn test_resolver_hit_miss_and_learning() {
        let mut table = CategoryTable::default();
        table.insert("brave", info("search"));
        let mut resolver = CategoryResolver::new(table, &FormatConfig::default());

        assert!(matches!(
            resolver.resolve("brave-mcp"),
            CategoryHint::Known(i) if i.category == "search"
        ));

        let hint = resolver.resolve("notion-mcp");
        assert_eq!(
            hint,
            CategoryHint::NewPrefix {
                prefix: "notion".into()
            }
        );

        resolver.learn("notion", info("productivity"));
        assert!(!resolver.resolve("notion-mcp-v2").is_new_prefix());
    }
}
