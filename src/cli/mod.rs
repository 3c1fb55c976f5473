//! Command-line interface for mcpscout
//!
//! - `args`: clap definitions
//! - `run`: entry point, logging setup and dispatch
//! - `commands`: one module per subcommand

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands, ConfigCommands, build_cli};
pub use run::run;
