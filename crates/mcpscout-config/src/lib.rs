//! Configuration management for mcpscout
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > environment > file > defaults. The file is TOML, found by walking
//! upward from the working directory to `.mcpscout/config.toml`.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use model::*;
pub use sources::parse_primary_sources;
