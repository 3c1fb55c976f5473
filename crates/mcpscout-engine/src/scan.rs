//! Resumable breadth-first scan of a container store
//!
//! The traversal is a FIFO of container handles rather than recursion, so
//! that an interrupted scan is plain data ([`ScanState`]) and can be
//! checkpointed between any two leaves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, warn};

use mcpscout_store::{LeafEntry, ObjectStore};
use mcpscout_utils::types::{ItemDescriptor, ItemKey};

use crate::budget::BudgetGuard;

/// Progress of a scan, persisted while the scan is suspended
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanState {
    /// Containers awaiting a visit
    pub queue: VecDeque<String>,
    /// Items found so far; later discoveries replace earlier ones
    pub found_items: BTreeMap<ItemKey, ItemDescriptor>,
    /// Leaves already handled, only for the container that was interrupted
    pub per_container_visited: BTreeMap<String, BTreeSet<String>>,
}

impl ScanState {
    /// A fresh scan over `roots`, seeded with items from primary sources
    #[must_use]
    pub fn start(roots: &[String], seed: BTreeMap<ItemKey, ItemDescriptor>) -> Self {
        Self {
            queue: roots.iter().cloned().collect(),
            found_items: seed,
            per_container_visited: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Which leaves are candidate item sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Leaves modified before this instant are ignored
    pub cutoff: Option<DateTime<Utc>>,
    /// Required name suffix, e.g. `.json`
    pub extension: String,
    /// Top-level key a document must carry
    pub shape_key: String,
}

impl ScanFilter {
    fn admits(&self, leaf: &LeafEntry) -> bool {
        let extension_ok = leaf
            .name
            .to_ascii_lowercase()
            .ends_with(&self.extension.to_ascii_lowercase());
        let recent_enough = self.cutoff.is_none_or(|cutoff| leaf.modified >= cutoff);
        extension_ok && recent_enough
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Suspended,
}

/// Parse a document and return the items under `shape_key`.
///
/// Returns `None` when the document is not a JSON object carrying an object
/// under `shape_key`. Entries without a non-empty `url` are dropped.
#[must_use]
pub fn extract_items(bytes: &[u8], shape_key: &str) -> Option<BTreeMap<ItemKey, ItemDescriptor>> {
    let document: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    let servers = document.as_object()?.get(shape_key)?.as_object()?;

    let items = servers
        .iter()
        .filter_map(|(key, value)| {
            let descriptor: ItemDescriptor = serde_json::from_value(value.clone()).ok()?;
            (!descriptor.url.trim().is_empty()).then(|| (key.clone(), descriptor))
        })
        .collect();
    Some(items)
}

/// Merge `items` into `found`; entries in `items` win
pub fn merge_items(
    found: &mut BTreeMap<ItemKey, ItemDescriptor>,
    items: BTreeMap<ItemKey, ItemDescriptor>,
) {
    found.extend(items);
}

pub struct TreeScanner<'a> {
    store: &'a dyn ObjectStore,
    filter: &'a ScanFilter,
}

impl<'a> TreeScanner<'a> {
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore, filter: &'a ScanFilter) -> Self {
        Self { store, filter }
    }

    /// Advance `state` until the queue is drained or `guard` says stop.
    ///
    /// The guard is consulted before each container and before each leaf.
    /// On stop, an interrupted container goes back to the front of the queue
    /// together with the names of the leaves it already handled.
    pub async fn run(&self, state: &mut ScanState, guard: &dyn BudgetGuard) -> ScanOutcome {
        while !state.queue.is_empty() {
            if guard.should_stop() {
                debug!(pending = state.queue.len(), "Scan suspended between containers");
                return ScanOutcome::Suspended;
            }
            let Some(container) = state.queue.pop_front() else {
                break;
            };

            let leaves = match self.store.list_leaves(&container).await {
                Ok(leaves) => leaves,
                Err(e) => {
                    warn!(container = %container, error = %e, "Skipping unreadable container");
                    state.per_container_visited.remove(&container);
                    continue;
                }
            };

            let mut visited = state
                .per_container_visited
                .remove(&container)
                .unwrap_or_default();

            for leaf in &leaves {
                if visited.contains(&leaf.name) {
                    continue;
                }
                if guard.should_stop() {
                    debug!(
                        container = %container,
                        visited = visited.len(),
                        "Scan suspended inside container"
                    );
                    state.per_container_visited.insert(container.clone(), visited);
                    state.queue.push_front(container);
                    return ScanOutcome::Suspended;
                }

                self.visit_leaf(&container, leaf, &mut state.found_items).await;
                visited.insert(leaf.name.clone());
            }

            match self.store.list_children(&container).await {
                Ok(children) => state.queue.extend(children),
                Err(e) => {
                    warn!(container = %container, error = %e, "Cannot list child containers");
                }
            }
        }

        info!(items = state.found_items.len(), "Scan completed");
        ScanOutcome::Completed
    }

    async fn visit_leaf(
        &self,
        container: &str,
        leaf: &LeafEntry,
        found: &mut BTreeMap<ItemKey, ItemDescriptor>,
    ) {
        if !self.filter.admits(leaf) {
            return;
        }

        let bytes = match self.store.read_leaf(leaf).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    container = %container,
                    leaf = %leaf.name,
                    error = %e,
                    "Skipping unreadable leaf"
                );
                return;
            }
        };

        if let Some(items) = extract_items(&bytes, &self.filter.shape_key) {
            debug!(container = %container, leaf = %leaf.name, items = items.len(), "Merged leaf");
            merge_items(found, items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{StopAfter, Unlimited};
    use chrono::TimeZone;
    use mcpscout_store::MemoryObjectStore;
    use mcpscout_utils::test_support::mcp_config_json;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap()
    }

    fn filter(cutoff: Option<DateTime<Utc>>) -> ScanFilter {
        ScanFilter {
            cutoff,
            extension: ".json".into(),
            shape_key: "mcpServers".into(),
        }
    }

    #[test]
    fn test_extract_items_requires_shape_and_url() {
        let json = r#"{"mcpServers": {
            "a": {"url": "https://a.example"},
            "b": {"url": ""},
            "c": {"transport": "sse"},
            "d": "not an object"
        }}"#;
        let items = extract_items(json.as_bytes(), "mcpServers").unwrap();
        assert_eq!(items.keys().collect::<Vec<_>>(), ["a"]);
        assert_eq!(items["a"].transport, "sse");

        assert!(extract_items(br#"{"servers": {}}"#, "mcpServers").is_none());
        assert!(extract_items(b"[1, 2]", "mcpServers").is_none());
        assert!(extract_items(b"{oops", "mcpServers").is_none());
    }

    #[tokio::test]
    async fn test_cutoff_excludes_old_leaves() {
        let store = MemoryObjectStore::new();
        store.add_leaf("A", "x.json", mcp_config_json(&[("old", "https://old.example")]), at(1));
        store.add_leaf("B", "y.json", mcp_config_json(&[("new", "https://new.example")]), at(20));

        let mut state = ScanState::start(&["A".into(), "B".into()], BTreeMap::new());
        let filter = filter(Some(at(10)));
        let outcome = TreeScanner::new(&store, &filter).run(&mut state, &Unlimited).await;

        assert_eq!(outcome, ScanOutcome::Completed);
        assert_eq!(state.found_items.keys().collect::<Vec<_>>(), ["new"]);
    }

    #[tokio::test]
    async fn test_extension_filter_and_children() {
        let store = MemoryObjectStore::new();
        store.add_container("root", "root/nested");
        store.add_leaf(
            "root",
            "notes.txt",
            mcp_config_json(&[("txt", "https://t.example")]),
            at(5),
        );
        store.add_leaf(
            "root/nested",
            "deep.JSON",
            mcp_config_json(&[("deep", "https://d.example")]),
            at(5),
        );

        let mut state = ScanState::start(&["root".into()], BTreeMap::new());
        let filter = filter(None);
        TreeScanner::new(&store, &filter).run(&mut state, &Unlimited).await;

        assert_eq!(state.found_items.keys().collect::<Vec<_>>(), ["deep"]);
        assert!(state.per_container_visited.is_empty());
    }

    #[tokio::test]
    async fn test_later_discovery_wins() {
        let store = MemoryObjectStore::new();
        store.add_leaf("A", "1.json", mcp_config_json(&[("dup", "https://first.example")]), at(5));
        store.add_leaf("B", "2.json", mcp_config_json(&[("dup", "https://second.example")]), at(5));

        let mut state = ScanState::start(&["A".into(), "B".into()], BTreeMap::new());
        let filter = filter(None);
        TreeScanner::new(&store, &filter).run(&mut state, &Unlimited).await;

        assert_eq!(state.found_items["dup"].url, "https://second.example");
    }

    #[tokio::test]
    async fn test_suspend_inside_container_resumes_at_next_leaf() {
        let store = MemoryObjectStore::new();
        for (name, key) in [("a.json", "a"), ("b.json", "b"), ("c.json", "c")] {
            store.add_leaf("box", name, mcp_config_json(&[(key, "https://x.example")]), at(5));
        }
        let filter = filter(None);
        let scanner = TreeScanner::new(&store, &filter);
        let mut state = ScanState::start(&["box".into()], BTreeMap::new());

        // container check + two leaf checks pass, third leaf check stops
        let outcome = scanner.run(&mut state, &StopAfter::new(3)).await;
        assert_eq!(outcome, ScanOutcome::Suspended);
        assert_eq!(state.queue.front().map(String::as_str), Some("box"));
        assert_eq!(state.per_container_visited["box"].len(), 2);
        assert_eq!(store.leaf_reads(), 2);

        let outcome = scanner.run(&mut state, &Unlimited).await;
        assert_eq!(outcome, ScanOutcome::Completed);
        assert_eq!(store.leaf_reads(), 3);
        assert_eq!(state.found_items.len(), 3);
        assert!(state.per_container_visited.is_empty());
    }

    #[tokio::test]
    async fn test_stop_before_container_leaves_queue_untouched() {
        let store = MemoryObjectStore::new();
        let mut state = ScanState::start(&["one".into(), "two".into()], BTreeMap::new());
        let filter = filter(None);

        let outcome = TreeScanner::new(&store, &filter)
            .run(&mut state, &StopAfter::new(0))
            .await;

        assert_eq!(outcome, ScanOutcome::Suspended);
        assert_eq!(state.queue, ["one", "two"]);
    }

    #[tokio::test]
    async fn test_unreadable_container_is_skipped_with_its_partial_state() {
        let store = MemoryObjectStore::new();
        store.add_leaf("bad", "a.json", mcp_config_json(&[("a", "https://a.example")]), at(5));
        store.add_leaf("good", "b.json", mcp_config_json(&[("b", "https://b.example")]), at(5));
        store.fail_container("bad");

        let mut state = ScanState::start(&["bad".into(), "good".into()], BTreeMap::new());
        state
            .per_container_visited
            .insert("bad".into(), BTreeSet::from(["z.json".to_string()]));
        let filter = filter(None);
        let outcome = TreeScanner::new(&store, &filter).run(&mut state, &Unlimited).await;

        assert_eq!(outcome, ScanOutcome::Completed);
        assert_eq!(state.found_items.keys().collect::<Vec<_>>(), ["b"]);
        assert!(state.per_container_visited.is_empty());
    }
}
