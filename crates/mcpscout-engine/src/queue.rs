//! Work queue, result accumulator and retry-eligible list

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use mcpscout_utils::types::{ItemDescriptor, ItemKey};

/// Snapshot of every discovered item, frozen when the scan completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub items: BTreeMap<ItemKey, ItemDescriptor>,
}

/// An accepted entry waiting to be committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub category: String,
    pub formatted_entry: String,
}

/// Results accumulated during research and consumed by the publisher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultAccumulator {
    pub resolved: Vec<ResolvedEntry>,
    pub unresolved: Vec<String>,
    /// Failed commit attempts of the resolved bucket
    #[serde(default)]
    pub entry_commit_failures: u32,
    /// Failed commit attempts of the unresolved bucket
    #[serde(default)]
    pub report_commit_failures: u32,
}

impl ResultAccumulator {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.unresolved.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len() + self.unresolved.len()
    }
}

/// An item whose research call failed outright
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryEntry {
    pub descriptor: ItemDescriptor,
    pub attempts: u32,
    pub last_error: String,
}

/// Items to offer again in the next session.
///
/// Survives the end-of-session marker clearing so that an outage never
/// silently drops an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryList {
    pub entries: BTreeMap<ItemKey, RetryEntry>,
}

impl RetryList {
    /// Record a failed attempt; returns the attempt count so far
    pub fn record_failure(&mut self, key: &str, descriptor: &ItemDescriptor, error: &str) -> u32 {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| RetryEntry {
                descriptor: descriptor.clone(),
                attempts: 0,
                last_error: String::new(),
            });
        entry.attempts += 1;
        entry.descriptor = descriptor.clone();
        entry.last_error = error.to_string();
        entry.attempts
    }

    /// Forget `key` once it has an outcome
    pub fn clear(&mut self, key: &str) -> Option<RetryEntry> {
        self.entries.remove(key)
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

/// Build the queue and session for a new session.
///
/// The queue is every discovered key not yet published, in key order,
/// followed by retry-eligible keys that are neither published nor already
/// queued. Retry items the scan no longer finds keep their stored descriptor.
#[must_use]
pub fn build_session(
    discovered: BTreeMap<ItemKey, ItemDescriptor>,
    published: &BTreeSet<ItemKey>,
    retry: &RetryList,
) -> (SessionData, VecDeque<ItemKey>) {
    let mut queue: VecDeque<ItemKey> = discovered
        .keys()
        .filter(|key| !published.contains(*key))
        .cloned()
        .collect();

    let mut items = discovered;
    for (key, entry) in &retry.entries {
        if published.contains(key) || queue.contains(key) {
            continue;
        }
        items
            .entry(key.clone())
            .or_insert_with(|| entry.descriptor.clone());
        queue.push_back(key.clone());
    }

    (SessionData { items }, queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str) -> ItemDescriptor {
        ItemDescriptor::new(url)
    }

    fn discovered(keys: &[&str]) -> BTreeMap<ItemKey, ItemDescriptor> {
        keys.iter()
            .map(|k| ((*k).to_string(), descriptor(&format!("https://{k}.example"))))
            .collect()
    }

    #[test]
    fn test_queue_is_discovered_minus_published() {
        let published = BTreeSet::from(["b".to_string()]);
        let (session, queue) = build_session(
            discovered(&["c", "a", "b"]),
            &published,
            &RetryList::default(),
        );

        assert_eq!(queue, ["a", "c"]);
        assert_eq!(session.items.len(), 3);
    }

    #[test]
    fn test_retry_items_follow_and_keep_descriptor() {
        let mut retry = RetryList::default();
        retry.record_failure("gone", &descriptor("https://gone.example"), "timeout");
        retry.record_failure("a", &descriptor("https://a.example"), "timeout");
        retry.record_failure("pub", &descriptor("https://pub.example"), "timeout");
        let published = BTreeSet::from(["pub".to_string()]);

        let (session, queue) = build_session(discovered(&["a", "b"]), &published, &retry);

        assert_eq!(queue, ["a", "b", "gone"]);
        assert_eq!(session.items["gone"].url, "https://gone.example");
        assert!(!session.items.contains_key("pub"));
    }

    #[test]
    fn test_retry_attempts_accumulate_and_clear() {
        let mut retry = RetryList::default();
        let d = descriptor("https://x.example");
        assert_eq!(retry.record_failure("x", &d, "e1"), 1);
        assert_eq!(retry.record_failure("x", &d, "e2"), 2);
        assert_eq!(retry.entries["x"].last_error, "e2");

        assert!(retry.clear("x").is_some());
        assert!(retry.is_empty());
    }

    #[test]
    fn test_accumulator_counts() {
        let mut acc = ResultAccumulator::default();
        assert!(acc.is_empty());
        acc.unresolved.push("### x".into());
        acc.resolved.push(ResolvedEntry {
            category: "search".into(),
            formatted_entry: "- id: y".into(),
        });
        assert_eq!(acc.len(), 2);
    }
}
