//! CLI command implementations

mod common;
mod config;
mod reset;
mod run_cmd;
mod status;

pub use config::execute_config_show_command;
pub use reset::execute_reset_command;
pub use run_cmd::execute_run_command;
pub use status::execute_status_command;
