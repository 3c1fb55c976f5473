//! Config command implementation
//!
//! Handles `mcpscout config show`.

use mcpscout_config::Config;

/// Print every effective value with the source it came from
pub fn execute_config_show_command(config: &Config) {
    println!("Effective configuration (project root: {})", config.base_dir);

    let rows = config.describe();
    let width = rows.iter().map(|(key, _, _)| key.len()).max().unwrap_or(0);
    for (key, value, source) in rows {
        println!("  {key:<width$} = {value}  [{source}]");
    }
}
