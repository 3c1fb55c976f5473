//! CLI argument definitions

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// mcpscout - discover, research and publish MCP servers in resumable steps
#[derive(Debug, Parser)]
#[command(name = "mcpscout")]
#[command(about = "Discover, research and publish MCP server descriptors in resumable steps")]
#[command(long_about = r#"
mcpscout scans a tree of JSON configuration files for MCP server descriptors,
researches every server that is not yet in the catalog and commits the results.
Each invocation works until its time budget runs out, persists its progress and
schedules a continuation.

EXAMPLES:
  # One invocation, only if a continuation is due (for cron or systemd timers)
  mcpscout run --if-due

  # Inspect the current session
  mcpscout status
  mcpscout status --json

  # Discard all saved progress
  mcpscout reset --yes

  # Show the effective configuration
  mcpscout config show

CONFIGURATION:
  Precedence: CLI flags > MCPSCOUT_* environment > config file > defaults
  The config file is found by searching upward from CWD for .mcpscout/config.toml
  Use --config to name an explicit file
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding checkpoints, continuations and the lock
    #[arg(long, global = true)]
    pub state_dir: Option<String>,

    /// Wall-clock ceiling of one invocation in seconds
    #[arg(long, global = true)]
    pub max_runtime_secs: Option<u64>,

    /// Container to scan recursively (repeatable; replaces configured roots)
    #[arg(long = "scan-root", global = true)]
    pub scan_roots: Vec<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit log events as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one invocation of the scan, research and commit cycle
    ///
    /// EXAMPLES:
    ///   mcpscout run
    ///   mcpscout run --if-due --max-runtime-secs 300
    Run {
        /// Only run when a scheduled continuation is due or no session is in progress
        #[arg(long)]
        if_due: bool,

        /// Take over a lock held longer than the stale threshold
        #[arg(long)]
        force_unlock: bool,
    },

    /// Show the current phase, queue and pending continuations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear every checkpoint marker and cancel pending continuations
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration with the source of each value
    Show,
}

/// Build the clap command tree (used by completions and tests)
#[must_use]
pub fn build_cli() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mcpscout",
            "run",
            "--if-due",
            "--verbose",
            "--scan-root",
            "drive/a",
            "--scan-root",
            "drive/b",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.scan_roots, ["drive/a", "drive/b"]);
        assert!(matches!(
            cli.command,
            Commands::Run {
                if_due: true,
                force_unlock: false
            }
        ));
    }

    #[test]
    fn test_config_show_parses() {
        let cli = Cli::try_parse_from(["mcpscout", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Show)));
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["mcpscout", "publish"]).is_err());
    }
}
