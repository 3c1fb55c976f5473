//! Deterministic in-process backend for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mcpscout_utils::error::ResearchError;
use mcpscout_utils::types::{CategoryHint, ResearchResult};

use crate::types::{ResearchBackend, ResearchRequest};

#[derive(Debug, Clone)]
enum Reply {
    Result(ResearchResult),
    Fail(String),
}

#[derive(Debug, Default)]
struct Script {
    per_item: HashMap<String, Reply>,
    fail_next: u32,
    latency: Duration,
    calls: Vec<String>,
}

/// Backend answering from a script instead of a provider.
///
/// Items without a scripted reply get the default: a well-formed found
/// entry in the hinted category, or the configured unresolved report.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
    unresolved_default: Option<String>,
}

impl ScriptedBackend {
    /// Resolves every unscripted item
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports every unscripted item as unresolved with `report`
    #[must_use]
    pub fn unresolved(report: impl Into<String>) -> Self {
        Self {
            unresolved_default: Some(report.into()),
            ..Self::default()
        }
    }

    /// Answer `item_key` with `result`
    pub fn respond(&self, item_key: &str, result: ResearchResult) {
        self.lock()
            .per_item
            .insert(item_key.to_string(), Reply::Result(result));
    }

    /// Fail every call for `item_key` with a transport error
    pub fn fail_item(&self, item_key: &str) {
        self.lock().per_item.insert(
            item_key.to_string(),
            Reply::Fail(format!("scripted outage for {item_key}")),
        );
    }

    /// Fail the next `count` calls regardless of item
    pub fn fail_next(&self, count: u32) {
        self.lock().fail_next = count;
    }

    /// Delay every reply by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Item keys in call order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// A found result that passes validation for `item_key` in `category`
    #[must_use]
    pub fn found_entry(item_key: &str, category: &str) -> ResearchResult {
        ResearchResult {
            is_found: true,
            category: category.to_string(),
            category_description: None,
            formatted_entry: format!(
                "- id: {item_key}\n  name: {item_key}\n  provider: Example\n  description: Researched {item_key}\n"
            ),
            unresolved_report: String::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn default_reply(&self, request: &ResearchRequest) -> ResearchResult {
        if let Some(report) = &self.unresolved_default {
            return ResearchResult {
                is_found: false,
                unresolved_report: report.clone(),
                ..ResearchResult::default()
            };
        }

        match &request.category_hint {
            CategoryHint::Known(info) => Self::found_entry(&request.item_key, &info.category),
            CategoryHint::NewPrefix { prefix } => {
                let category: String = prefix
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
                    .collect();
                ResearchResult {
                    category_description: Some(format!("Servers from {prefix}")),
                    ..Self::found_entry(&request.item_key, &category)
                }
            }
        }
    }
}

#[async_trait]
impl ResearchBackend for ScriptedBackend {
    async fn research(&self, request: &ResearchRequest) -> Result<ResearchResult, ResearchError> {
        let (reply, latency) = {
            let mut script = self.lock();
            script.calls.push(request.item_key.clone());
            let reply = if script.fail_next > 0 {
                script.fail_next -= 1;
                Some(Reply::Fail("scripted outage".to_string()))
            } else {
                script.per_item.get(&request.item_key).cloned()
            };
            (reply, script.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match reply {
            Some(Reply::Result(result)) => Ok(result),
            Some(Reply::Fail(reason)) => Err(ResearchError::Transport(reason)),
            None => Ok(self.default_reply(request)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
