//! mcpscout - checkpointed discovery, research and publication of MCP server catalogs
//!
//! mcpscout walks a tree of JSON configuration files for remote tool-server
//! descriptors, researches every server it has not published yet and commits
//! the results to a catalog in a versioned file store. Work is split across
//! short invocations: each one advances as far as its time budget allows,
//! persists its progress and schedules a continuation.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Show the effective configuration and where each value came from
//! mcpscout config show
//!
//! # One invocation; cron or a systemd timer repeats it
//! mcpscout run --if-due
//!
//! # Where the current session stands
//! mcpscout status --json
//! ```
//!
//! # Library use
//!
//! [`Orchestrator`] drives one invocation over a set of [`Collaborators`];
//! memory implementations of every collaborator live in
//! [`store`](mcpscout_store) and [`research`](mcpscout_research).

// ============================================================================
// Stable public API
// ============================================================================

/// Configuration with discovery and precedence: CLI > environment > file > defaults.
pub use mcpscout_config::{CliArgs, Config, ConfigBuilder};

/// The phase controller and its per-invocation summary.
pub use mcpscout_engine::{
    CheckpointState, Collaborators, Orchestrator, RunOutcome, RunReport, StatusReport,
};

/// Library-level error type with user-facing rendering and exit code mapping.
pub use mcpscout_utils::error::{ErrorCategory, ScoutError, UserFriendlyError};

/// Process exit codes. The numeric values are part of the public API.
pub use mcpscout_utils::exit_codes::ExitCode;

// ============================================================================
// Internal modules - accessible but not stable
// ============================================================================

#[doc(hidden)]
pub use mcpscout_config as config;
#[doc(hidden)]
pub use mcpscout_engine as engine;
#[doc(hidden)]
pub use mcpscout_research as research;
#[doc(hidden)]
pub use mcpscout_store as store;
#[doc(hidden)]
pub use mcpscout_utils::{error, exit_codes, logging, types};

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub use mcpscout_utils::test_support;

// CLI module, exported for white-box tests of flag parsing
#[doc(hidden)]
pub mod cli;
