//! Checkpointed scan, research and publish orchestration
//!
//! Leaves first: [`budget`] decides when to stop, [`scan`] and [`sources`]
//! discover items, [`queue`] holds the per-session work, [`category`] and
//! [`invoker`] research one item, [`publisher`] commits results and
//! [`controller`] drives the phases across invocations.

// Re-export shared crates so callers need only depend on the engine.
pub use mcpscout_config as config;
pub use mcpscout_research as research;
pub use mcpscout_store as store;

pub use mcpscout_utils::error;
pub use mcpscout_utils::types;

pub mod budget;
pub mod category;
pub mod controller;
pub mod envelope;
pub mod invoker;
pub mod publisher;
pub mod queue;
pub mod scan;
pub mod sources;

pub use budget::{BudgetGuard, StopAfter, TimeBudget, Unlimited};
pub use controller::{
    CheckpointState, Collaborators, MAX_COMMIT_ATTEMPTS, Orchestrator, Phase, RunOutcome,
    RunReport, StatusReport, markers,
};
