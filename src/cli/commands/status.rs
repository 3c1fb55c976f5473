//! Status command implementation
//!
//! Handles `mcpscout status` and `mcpscout status --json`.

use anyhow::{Context, Result};

use mcpscout_config::Config;
use mcpscout_lock::InvocationLock;

use super::common;

/// Execute the status command. Reads state only; no lock is taken.
pub fn execute_status_command(config: &Config, json: bool) -> Result<()> {
    let status = common::checkpoint_state(config).inspect()?;

    if json {
        let out = serde_json::to_string_pretty(&status).context("Failed to emit status JSON")?;
        println!("{out}");
        return Ok(());
    }

    println!("State directory: {}", config.state_dir());
    println!("{status}");
    match InvocationLock::inspect(&config.state_dir()) {
        Ok(Some(lock)) => println!("  Lock: held by PID {}", lock.pid),
        Ok(None) => {}
        Err(e) => println!("  Lock: unreadable ({e})"),
    }
    Ok(())
}
