//! Per-invocation call budget for research backends

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use mcpscout_utils::error::ResearchError;
use mcpscout_utils::types::ResearchResult;

use crate::types::{ResearchBackend, ResearchRequest};

/// Wraps a backend and refuses calls beyond `limit`.
///
/// Attempts are counted, not successes: a failed call still uses its slot.
pub struct BudgetedBackend {
    inner: Box<dyn ResearchBackend>,
    calls: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    #[must_use]
    pub fn new(inner: Box<dyn ResearchBackend>, limit: u32) -> Self {
        debug!(limit, "Creating BudgetedBackend");
        Self {
            inner,
            calls: AtomicU32::new(0),
            limit,
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl ResearchBackend for BudgetedBackend {
    async fn research(&self, request: &ResearchRequest) -> Result<ResearchResult, ResearchError> {
        let current = self.calls.fetch_add(1, Ordering::SeqCst);

        if current >= self.limit {
            let attempted = current + 1;
            warn!(limit = self.limit, attempted, "Research call budget exhausted");
            return Err(ResearchError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        debug!(call_count = current + 1, limit = self.limit, "Budget check passed");
        self.inner.research(request).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
