//! Core types for the research collaborator abstraction

use async_trait::async_trait;
use std::time::Duration;

use mcpscout_utils::error::ResearchError;
use mcpscout_utils::types::{CategoryHint, ItemDescriptor, ResearchResult};

/// Input to one research call
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    /// Item key the entry `id` must echo
    pub item_key: String,
    pub descriptor: ItemDescriptor,
    /// Formatting and research rules handed to the provider verbatim
    pub rules_text: String,
    pub category_hint: CategoryHint,
    /// Category keys already in use, offered when a new prefix needs a category
    pub known_categories: Vec<String>,
    pub timeout: Duration,
}

impl ResearchRequest {
    #[must_use]
    pub fn new(
        item_key: impl Into<String>,
        descriptor: ItemDescriptor,
        rules_text: impl Into<String>,
        category_hint: CategoryHint,
    ) -> Self {
        Self {
            item_key: item_key.into(),
            descriptor,
            rules_text: rules_text.into(),
            category_hint,
            known_categories: Vec::new(),
            timeout: Duration::from_secs(120),
        }
    }

    #[must_use]
    pub fn with_known_categories(mut self, categories: Vec<String>) -> Self {
        self.known_categories = categories;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A research collaborator: item descriptor and rules in, structured result out
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Research one item. Errors mean the call itself failed; a result
    /// returned here still has to pass validation.
    async fn research(&self, request: &ResearchRequest) -> Result<ResearchResult, ResearchError>;

    /// Provider name used in logs
    fn name(&self) -> &str;
}
