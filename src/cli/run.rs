//! CLI entry point and dispatch
//!
//! `run()` parses arguments, installs logging, discovers configuration,
//! dispatches to a command and renders every error itself.

use clap::Parser;

use mcpscout_config::{CliArgs, Config};
use mcpscout_utils::error::ScoutError;
use mcpscout_utils::exit_codes::ExitCode;
use mcpscout_utils::logging::{LogFormat, init_tracing};
use mcpscout_utils::redaction::redact_secrets;

use super::args::{Cli, Commands, ConfigCommands};
use super::commands;

/// Main CLI execution function.
///
/// Prints all output including errors and returns the exit code to use
/// on failure. main.rs only calls `std::process::exit`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(e) = init_tracing(cli.verbose, format) {
        eprintln!("✗ Failed to initialise logging: {e}");
        return Err(ExitCode::INTERNAL);
    }

    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        state_dir: cli.state_dir.clone(),
        max_runtime_secs: cli.max_runtime_secs,
        scan_roots: cli.scan_roots.clone(),
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => return Err(report(&ScoutError::from(err))),
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                if_due,
                force_unlock,
            } => commands::execute_run_command(&config, if_due, force_unlock).await,
            Commands::Status { json } => commands::execute_status_command(&config, json),
            Commands::Reset { yes } => commands::execute_reset_command(&config, yes),
            Commands::Config(ConfigCommands::Show) => {
                commands::execute_config_show_command(&config);
                Ok(())
            }
        }
    });

    match result {
        Ok(()) => Ok(()),
        Err(error) => match error.downcast_ref::<ScoutError>() {
            Some(scout_error) => Err(report(scout_error)),
            None => {
                eprintln!("✗ Unexpected error: {}", redact_secrets(&format!("{error:#}")));
                eprintln!("\n  Run with --verbose for more detailed output");
                Err(ExitCode::INTERNAL)
            }
        },
    }
}

fn report(error: &ScoutError) -> ExitCode {
    eprintln!("{}", error.display_for_user());
    error.to_exit_code()
}
