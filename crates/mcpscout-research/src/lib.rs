//! Research collaborator backends
//!
//! [`ResearchBackend`] is the seam between the orchestrator and the external
//! knowledge API. [`AnthropicResearchBackend`] talks to the Anthropic Messages
//! API, [`BudgetedBackend`] caps calls per invocation and [`ScriptedBackend`]
//! answers from an in-process script.

mod anthropic_backend;
mod budgeted_backend;
mod http_client;
pub mod prompt;
mod scripted;
mod types;

pub use anthropic_backend::{AnthropicParams, AnthropicResearchBackend};
pub use budgeted_backend::BudgetedBackend;
pub use scripted::ScriptedBackend;
pub use types::{ResearchBackend, ResearchRequest};

pub use mcpscout_utils::error::ResearchError;

use mcpscout_config::Config;

/// Build the configured backend, wrapped in a call budget when one is set
///
/// # Errors
///
/// Returns `ResearchError::Misconfiguration` for an unknown provider or a
/// missing API key.
pub fn backend_from_config(config: &Config) -> Result<Box<dyn ResearchBackend>, ResearchError> {
    let backend: Box<dyn ResearchBackend> = match config.research.provider.as_str() {
        "anthropic" => Box::new(AnthropicResearchBackend::from_config(config)?),
        other => {
            return Err(ResearchError::Misconfiguration(format!(
                "unknown research provider '{other}'"
            )));
        }
    };

    Ok(match config.research.max_calls_per_run {
        Some(limit) => Box::new(BudgetedBackend::new(backend, limit)),
        None => backend,
    })
}
