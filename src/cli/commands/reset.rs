//! Reset command implementation
//!
//! Handles `mcpscout reset`, the manual recovery from a stuck session.

use anyhow::Result;
use std::io::Write;

use mcpscout_config::Config;
use mcpscout_lock::InvocationLock;
use mcpscout_utils::error::ScoutError;

use super::common;

/// Execute the reset command
pub fn execute_reset_command(config: &Config, yes: bool) -> Result<()> {
    let state_dir = config.state_dir();
    let lock = InvocationLock::acquire(&state_dir, false, Some(config.budget.lock_ttl_secs))
        .map_err(ScoutError::from)?;
    let state = common::checkpoint_state(config);

    println!("Reset checkpoint state in {state_dir}");
    println!("{}", state.inspect()?);

    if !yes {
        println!("\nThis discards the current session and the retry-eligible list.");
        print!("Are you sure? (y/N): ");
        if let Err(e) = std::io::stdout().flush() {
            tracing::warn!("Failed to flush stdout: {}", e);
        }

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input != "y" && input != "yes" {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    state.reset()?;
    if let Err(e) = lock.release() {
        tracing::warn!(error = %e, "Failed to release invocation lock");
    }
    println!("✓ Checkpoint state cleared");
    Ok(())
}
