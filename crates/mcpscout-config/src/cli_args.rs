use std::path::PathBuf;

/// Values supplied on the command line, applied over every other source
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit configuration file, bypassing discovery
    pub config_path: Option<PathBuf>,
    pub state_dir: Option<String>,
    pub max_runtime_secs: Option<u64>,
    pub scan_roots: Vec<String>,
}
