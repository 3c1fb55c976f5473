//! Shared domain types passed between mcpscout crates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString, IntoStaticStr};

/// Transport assumed when a server entry does not name one
pub const DEFAULT_TRANSPORT: &str = "sse";

/// Stable identifier of one discovered item (the server id in its config file)
pub type ItemKey = String;

/// Descriptor of one remote tool server, as found in a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub url: String,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

fn default_transport() -> String {
    DEFAULT_TRANSPORT.to_string()
}

impl ItemDescriptor {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: default_transport(),
            headers: None,
        }
    }
}

/// Category assigned to a prefix in the category table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub category: String,
    pub description: String,
}

/// What the research collaborator is told about an item's category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryHint {
    /// The prefix is already mapped; category inference is skipped
    Known(CategoryInfo),
    /// The prefix is unseen; the collaborator must propose a category and description
    NewPrefix { prefix: String },
}

impl CategoryHint {
    #[must_use]
    pub const fn is_new_prefix(&self) -> bool {
        matches!(self, Self::NewPrefix { .. })
    }
}

/// Structured result returned by the research collaborator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResearchResult {
    pub is_found: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_description: Option<String>,
    #[serde(default)]
    pub formatted_entry: String,
    #[serde(default)]
    pub unresolved_report: String,
}

/// Phase of the orchestrator, as reconstructed from checkpoint markers
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PhaseKind {
    Idle,
    Scanning,
    Researching,
    Committing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_descriptor_defaults_transport() {
        let descriptor: ItemDescriptor =
            serde_json::from_str(r#"{"url": "https://example.com/sse"}"#).unwrap();

        assert_eq!(descriptor.transport, "sse");
        assert!(descriptor.headers.is_none());
    }

    #[test]
    fn test_research_result_tolerates_missing_optional_fields() {
        let result: ResearchResult =
            serde_json::from_str(r#"{"is_found": false, "unresolved_report": "no docs"}"#)
                .unwrap();

        assert!(!result.is_found);
        assert!(result.category.is_empty());
        assert_eq!(result.unresolved_report, "no docs");
    }

    #[test]
    fn test_phase_kind_round_trips_through_strings() {
        assert_eq!(PhaseKind::Researching.to_string(), "researching");
        assert_eq!(PhaseKind::from_str("committing").unwrap(), PhaseKind::Committing);
    }
}
