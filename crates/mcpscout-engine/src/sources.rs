//! Primary sources fetched by handle before the recursive scan

use std::collections::BTreeMap;
use tracing::{debug, warn};

use mcpscout_config::PrimarySource;
use mcpscout_store::ObjectStore;
use mcpscout_utils::types::{ItemDescriptor, ItemKey};

use crate::scan::{extract_items, merge_items};

/// Fetch every primary source in order and merge their items; later sources win.
///
/// Unreadable sources and documents without the shape key contribute nothing.
pub async fn load_primary_sources(
    store: &dyn ObjectStore,
    sources: &[PrimarySource],
    shape_key: &str,
) -> BTreeMap<ItemKey, ItemDescriptor> {
    let mut found = BTreeMap::new();

    for source in sources {
        let object = match store.get_object(&source.location).await {
            Ok(object) => object,
            Err(e) => {
                warn!(
                    source = %source.name,
                    location = %source.location,
                    error = %e,
                    "Skipping unreadable primary source"
                );
                continue;
            }
        };

        match extract_items(&object.bytes, shape_key) {
            Some(items) => {
                debug!(source = %source.name, items = items.len(), "Loaded primary source");
                merge_items(&mut found, items);
            }
            None => {
                warn!(source = %source.name, shape_key, "Primary source has no server map");
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mcpscout_store::MemoryObjectStore;
    use mcpscout_utils::test_support::mcp_config_json;

    fn source(name: &str, location: &str) -> PrimarySource {
        PrimarySource {
            name: name.into(),
            location: location.into(),
        }
    }

    #[tokio::test]
    async fn test_later_source_wins() {
        let store = MemoryObjectStore::new();
        let s1 = store.add_leaf(
            "",
            "s1.json",
            mcp_config_json(&[("k", "https://s1.example")]),
            Utc::now(),
        );
        let s2 = store.add_leaf(
            "",
            "s2.json",
            mcp_config_json(&[("k", "https://s2.example")]),
            Utc::now(),
        );

        let found = load_primary_sources(
            &store,
            &[source("S1", &s1), source("S2", &s2)],
            "mcpServers",
        )
        .await;

        assert_eq!(found["k"].url, "https://s2.example");
    }

    #[tokio::test]
    async fn test_missing_and_shapeless_sources_are_skipped() {
        let store = MemoryObjectStore::new();
        let good = store.add_leaf(
            "",
            "good.json",
            mcp_config_json(&[("a", "https://a.example")]),
            Utc::now(),
        );
        let shapeless = store.add_leaf("", "other.json", r#"{"servers": {}}"#, Utc::now());

        let found = load_primary_sources(
            &store,
            &[
                source("Missing", "nowhere.json"),
                source("Shapeless", &shapeless),
                source("Good", &good),
            ],
            "mcpServers",
        )
        .await;

        assert_eq!(found.keys().collect::<Vec<_>>(), ["a"]);
    }

    #[tokio::test]
    async fn test_merging_same_source_twice_is_idempotent() {
        let store = MemoryObjectStore::new();
        let s = store.add_leaf(
            "",
            "s.json",
            mcp_config_json(&[("a", "https://a.example"), ("b", "https://b.example")]),
            Utc::now(),
        );

        let once = load_primary_sources(&store, &[source("S", &s)], "mcpServers").await;
        let twice =
            load_primary_sources(&store, &[source("S", &s), source("S", &s)], "mcpServers").await;

        assert_eq!(once, twice);
    }
}
