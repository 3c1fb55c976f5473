//! Property tests for resumption invariants
//!
//! Case counts follow `PROPTEST_CASES` (default 64).
//!
//! ```bash
//! PROPTEST_CASES=256 cargo test -p mcpscout-engine --test property_tests
//! ```

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8Path;
use mcpscout_config::Config;
use mcpscout_engine::envelope::{decode, encode};
use mcpscout_engine::scan::{ScanFilter, ScanOutcome, ScanState, TreeScanner, merge_items};
use mcpscout_engine::{Collaborators, Orchestrator, Phase, RunOutcome, StopAfter, Unlimited};
use mcpscout_research::ScriptedBackend;
use mcpscout_store::{
    MemoryCheckpointStore, MemoryObjectStore, MemoryScheduler, MemoryVersionedStore,
};
use mcpscout_utils::test_support::{mcp_config_json, proptest_cases};
use mcpscout_utils::types::{ItemDescriptor, ResearchResult};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn filter() -> ScanFilter {
    ScanFilter {
        cutoff: None,
        extension: ".json".into(),
        shape_key: "mcpServers".into(),
    }
}

/// Leaves are lists of (key index, url index); small ranges force duplicate keys
fn tree_strategy() -> impl Strategy<Value = Vec<Vec<Vec<(u8, u8)>>>> {
    prop::collection::vec(
        prop::collection::vec(prop::collection::vec((0u8..6, 0u8..4), 0..4), 0..4),
        1..4,
    )
}

fn build_store(tree: &[Vec<Vec<(u8, u8)>>]) -> MemoryObjectStore {
    let store = MemoryObjectStore::new();
    let stamp = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    for (c, leaves) in tree.iter().enumerate() {
        let container = format!("root/c{c}");
        store.add_container("root", &container);
        for (l, servers) in leaves.iter().enumerate() {
            let pairs: Vec<(String, String)> = servers
                .iter()
                .map(|(k, u)| (format!("k{k}"), format!("https://{u}.c{c}.l{l}.example")))
                .collect();
            let refs: Vec<(&str, &str)> =
                pairs.iter().map(|(k, u)| (k.as_str(), u.as_str())).collect();
            store.add_leaf(&container, &format!("leaf{l}.json"), mcp_config_json(&refs), stamp);
        }
    }
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(proptest_cases(None)))]

    #[test]
    fn prop_interrupted_scan_matches_uninterrupted(tree in tree_strategy(), stop_after in 2u32..6) {
        let rt = runtime();
        let store = build_store(&tree);
        let filter = filter();
        let scanner = TreeScanner::new(&store, &filter);

        let mut straight = ScanState::start(&["root".into()], BTreeMap::new());
        rt.block_on(scanner.run(&mut straight, &Unlimited));

        let mut resumed = ScanState::start(&["root".into()], BTreeMap::new());
        let mut rounds = 0;
        loop {
            rounds += 1;
            prop_assert!(rounds < 1000, "scan made no progress");
            let outcome = rt.block_on(scanner.run(&mut resumed, &StopAfter::new(stop_after)));
            // persisted and reloaded between invocations
            let raw = encode("scan_state", &resumed).unwrap();
            resumed = decode("scan_state", raw.as_bytes()).unwrap();
            if outcome == ScanOutcome::Completed {
                break;
            }
        }

        prop_assert_eq!(resumed.found_items, straight.found_items);
        prop_assert!(resumed.per_container_visited.is_empty());
    }

    #[test]
    fn prop_merge_is_idempotent(
        base in prop::collection::btree_map("[a-c]{1,2}", "[a-z]{1,5}", 0..6),
        source in prop::collection::btree_map("[a-c]{1,2}", "[a-z]{1,5}", 0..6),
    ) {
        let to_items = |m: &BTreeMap<String, String>| -> BTreeMap<String, ItemDescriptor> {
            m.iter()
                .map(|(k, u)| (k.clone(), ItemDescriptor::new(format!("https://{u}.example"))))
                .collect()
        };

        let mut once = to_items(&base);
        merge_items(&mut once, to_items(&source));
        let mut twice = once.clone();
        merge_items(&mut twice, to_items(&source));

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_queue_drain_is_lossless(
        unresolved in prop::collection::vec(any::<bool>(), 1..7),
        stop_at in 0u32..8,
    ) {
        let rt = runtime();
        let objects = Arc::new(MemoryObjectStore::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let files = Arc::new(MemoryVersionedStore::new());
        let research = Arc::new(ScriptedBackend::new());

        let keys: Vec<String> = (0..unresolved.len()).map(|i| format!("item{i}-mcp")).collect();
        let pairs: Vec<(&str, &str)> =
            keys.iter().map(|k| (k.as_str(), "https://x.example")).collect();
        objects.add_leaf("sources", "all.json", mcp_config_json(&pairs), Utc::now());
        for (key, flag) in keys.iter().zip(&unresolved) {
            if *flag {
                research.respond(key, ResearchResult {
                    is_found: false,
                    unresolved_report: format!("nothing on {key}"),
                    ..ResearchResult::default()
                });
            }
        }

        let orchestrator = Orchestrator::new(
            Config::minimal_for_testing(Utf8Path::new("/work")),
            Collaborators {
                objects,
                files: files.clone(),
                checkpoints: checkpoints.clone(),
                scheduler: Arc::new(MemoryScheduler::new()),
                research,
            },
        );

        // one container check and one leaf check precede the research loop
        let report = rt.block_on(orchestrator.run(&StopAfter::new(2 + stop_at))).unwrap();
        match Phase::load(checkpoints.as_ref()).unwrap() {
            Phase::Researching { queue, results, .. } => {
                prop_assert!(report.is_suspended());
                prop_assert_eq!(queue.len() + results.len(), keys.len());
                prop_assert_eq!(results.len(), stop_at as usize);
            }
            Phase::Idle => prop_assert_eq!(report.outcome, RunOutcome::Completed),
            other => prop_assert!(false, "unexpected phase {:?}", other.kind()),
        }

        while rt.block_on(orchestrator.run(&Unlimited)).unwrap().is_suspended() {}

        let entries = files.content("data/servers.yaml").unwrap_or_default();
        let reports = files.content("data/unresolved.md").unwrap_or_default();
        for (key, flag) in keys.iter().zip(&unresolved) {
            let id_line = format!("- id: {key}\n");
            let heading = format!("### {key}\n");
            let published = entries.matches(&id_line).count();
            let reported = reports.matches(&heading).count();
            prop_assert_eq!((published, reported), if *flag { (0, 1) } else { (1, 0) });
        }
    }
}
