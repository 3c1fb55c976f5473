//! Per-item research call with validation of the returned result

use std::time::Duration;
use tracing::{debug, warn};

use mcpscout_research::{ResearchBackend, ResearchRequest};
use mcpscout_utils::error::ResearchError;
use mcpscout_utils::redaction::redact_secrets;
use mcpscout_utils::types::{CategoryHint, CategoryInfo, ItemDescriptor, ResearchResult};
use mcpscout_validation::{ResultValidator, describe_failures};

use crate::queue::ResolvedEntry;

/// What one research attempt produced for an item
#[derive(Debug)]
pub enum ItemOutcome {
    /// Accepted entry; `learned` is set when the item introduced a new prefix
    Resolved {
        entry: ResolvedEntry,
        learned: Option<CategoryInfo>,
    },
    /// Free-text report for the unresolved file
    Unresolved(String),
    /// The call itself failed; no outcome this run
    Failed(ResearchError),
    /// The call was cut off by the invocation's time budget, not its own timeout
    OutOfTime,
}

pub struct ResearchInvoker<'a> {
    backend: &'a dyn ResearchBackend,
    rules_text: &'a str,
    timeout: Duration,
}

impl<'a> ResearchInvoker<'a> {
    #[must_use]
    pub fn new(backend: &'a dyn ResearchBackend, rules_text: &'a str, timeout: Duration) -> Self {
        Self {
            backend,
            rules_text,
            timeout,
        }
    }

    /// Research `key` and turn the answer into an [`ItemOutcome`].
    ///
    /// The call timeout is cut down to `time_left` when that is shorter; a
    /// call stopped by that cut is [`ItemOutcome::OutOfTime`]. A known
    /// category hint overrides whatever category the collaborator returned.
    /// Results that fail validation become unresolved reports.
    pub async fn research(
        &self,
        key: &str,
        descriptor: &ItemDescriptor,
        hint: CategoryHint,
        known_categories: Vec<String>,
        time_left: Option<Duration>,
    ) -> ItemOutcome {
        let (timeout, cut) = match time_left {
            Some(left) if left < self.timeout => (left, true),
            _ => (self.timeout, false),
        };
        let request = ResearchRequest::new(key, descriptor.clone(), self.rules_text, hint)
            .with_known_categories(known_categories)
            .with_timeout(timeout);

        let call = tokio::time::timeout(timeout, self.backend.research(&request)).await;
        let mut result = match call {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return ItemOutcome::Failed(e),
            Err(_) if cut => {
                debug!(
                    item = %key,
                    timeout_ms = timeout.as_millis(),
                    "Research call hit the time budget"
                );
                return ItemOutcome::OutOfTime;
            }
            Err(_) => {
                return ItemOutcome::Failed(ResearchError::Timeout { duration: timeout });
            }
        };

        if result.is_found
            && let CategoryHint::Known(info) = &request.category_hint
        {
            result.category.clone_from(&info.category);
        }

        if let Err(errors) = ResultValidator::validate(&result, key) {
            warn!(
                item = %key,
                failures = errors.len(),
                backend = self.backend.name(),
                "Research result rejected"
            );
            return ItemOutcome::Unresolved(redact_secrets(&describe_failures(key, &errors)));
        }

        if !result.is_found {
            debug!(item = %key, "Item unresolved");
            return ItemOutcome::Unresolved(unresolved_report(key, &result.unresolved_report));
        }

        let learned = match &request.category_hint {
            CategoryHint::NewPrefix { .. } => Some(learned_category(&result)),
            CategoryHint::Known(_) => None,
        };

        ItemOutcome::Resolved {
            entry: ResolvedEntry {
                category: result.category,
                formatted_entry: result.formatted_entry.trim_end().to_string(),
            },
            learned,
        }
    }
}

/// Normalize a free-text report into a section headed by the item key
fn unresolved_report(key: &str, report: &str) -> String {
    let report = redact_secrets(report.trim());
    let mut out = if report.is_empty() {
        format!("### {key}\n\nNo public information found.")
    } else if report.starts_with('#') {
        report
    } else {
        format!("### {key}\n\n{report}")
    };
    out.push('\n');
    out
}

fn learned_category(result: &ResearchResult) -> CategoryInfo {
    let description = result
        .category_description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map_or_else(|| result.category.replace('_', " "), str::to_string);
    CategoryInfo {
        category: result.category.clone(),
        description,
    }
}
