use camino::Utf8PathBuf;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mcpscout_utils::error::ConfigError;

use super::{
    BudgetConfig, CliArgs, Config, ConfigSource, FilesConfig, FormatConfig, ObjectsConfig,
    RepositoryConfig, ResearchConfig, SourcesConfig, StateConfig, parse_primary_sources,
};

const CONFIG_DIR: &str = ".mcpscout";
const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TomlConfig {
    budget: BudgetConfig,
    sources: SourcesConfig,
    objects: ObjectsConfig,
    repository: RepositoryConfig,
    files: FilesConfig,
    format: FormatConfig,
    research: ResearchConfig,
    state: StateConfig,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > env > file > defaults
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be parsed or a value is invalid.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot read current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover configuration starting from `start_dir`, reading the process environment
    ///
    /// # Errors
    ///
    /// Same as [`Config::discover`].
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        Self::discover_with_env(start_dir, cli_args, |key| std::env::var(key).ok())
    }

    /// Discover configuration with an explicit environment lookup.
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    ///
    /// # Errors
    ///
    /// Same as [`Config::discover`].
    pub fn discover_with_env<F>(
        start_dir: &Path,
        cli_args: &CliArgs,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut source_attribution = HashMap::new();

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir),
        };

        let file_config = match &config_path {
            Some(path) => Self::load_config_file(path, &mut source_attribution)?,
            None => TomlConfig::default(),
        };

        let base_dir = match &config_path {
            Some(path) => project_root_for(path),
            None => start_dir.to_path_buf(),
        };
        let base_dir =
            Utf8PathBuf::from_path_buf(base_dir).map_err(|p| ConfigError::DiscoveryFailed {
                reason: format!("project directory is not valid UTF-8: {}", p.display()),
            })?;

        let mut config = Config {
            budget: file_config.budget,
            sources: file_config.sources,
            objects: file_config.objects,
            repository: file_config.repository,
            files: file_config.files,
            format: file_config.format,
            research: file_config.research,
            state: file_config.state,
            base_dir,
            source_attribution,
        };

        config.apply_env(&env)?;
        config.apply_cli(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Search upward from `start_dir` for `.mcpscout/config.toml`.
    ///
    /// The search stops at the first directory that looks like a repository root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() {
                break;
            }
            current = dir.parent();
        }

        None
    }

    fn load_config_file(
        path: &Path,
        attribution: &mut HashMap<String, ConfigSource>,
    ) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidFile(format!("cannot read {}: {e}", path.display()))
        })?;
        let table: toml::Table = toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))?;

        let source = ConfigSource::ConfigFile(path.display().to_string());
        for (section, value) in &table {
            if let Some(fields) = value.as_table() {
                for key in fields.keys() {
                    attribution.insert(format!("{section}.{key}"), source.clone());
                }
            }
        }

        table
            .try_into::<TomlConfig>()
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }

    fn apply_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        const SCAN_ROOTS: &str = "MCPSCOUT_SCAN_ROOTS";
        const PRIMARY: &str = "MCPSCOUT_PRIMARY_SOURCES";
        const CUTOFF: &str = "MCPSCOUT_CUTOFF";
        const MAX_RUNTIME: &str = "MCPSCOUT_MAX_RUNTIME_SECS";
        const STATE_DIR: &str = "MCPSCOUT_STATE_DIR";

        if let Some(raw) = env(SCAN_ROOTS) {
            self.sources.scan_roots = split_list(&raw);
            self.attribute("sources.scan_roots", ConfigSource::Env(SCAN_ROOTS.to_string()));
        }
        if let Some(raw) = env(PRIMARY) {
            self.sources.primary = parse_primary_sources(&raw)?;
            self.attribute("sources.primary", ConfigSource::Env(PRIMARY.to_string()));
        }
        if let Some(raw) = env(CUTOFF) {
            self.sources.cutoff = Some(raw.trim().to_string()).filter(|c| !c.is_empty());
            self.attribute("sources.cutoff", ConfigSource::Env(CUTOFF.to_string()));
        }
        if let Some(raw) = env(MAX_RUNTIME) {
            self.budget.max_runtime_secs =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: MAX_RUNTIME.to_string(),
                        value: raw.clone(),
                    })?;
            self.attribute("budget.max_runtime_secs", ConfigSource::Env(MAX_RUNTIME.to_string()));
        }
        if let Some(raw) = env(STATE_DIR) {
            self.state.dir = raw;
            self.attribute("state.dir", ConfigSource::Env(STATE_DIR.to_string()));
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli_args: &CliArgs) {
        if let Some(dir) = &cli_args.state_dir {
            self.state.dir.clone_from(dir);
            self.attribute("state.dir", ConfigSource::Cli);
        }
        if let Some(secs) = cli_args.max_runtime_secs {
            self.budget.max_runtime_secs = secs;
            self.attribute("budget.max_runtime_secs", ConfigSource::Cli);
        }
        if !cli_args.scan_roots.is_empty() {
            self.sources.scan_roots.clone_from(&cli_args.scan_roots);
            self.attribute("sources.scan_roots", ConfigSource::Cli);
        }
    }

    fn attribute(&mut self, key: &str, source: ConfigSource) {
        self.source_attribution.insert(key.to_string(), source);
    }
}

/// `<root>/.mcpscout/config.toml` resolves relative paths against `<root>`;
/// any other explicit file resolves them against its own directory.
fn project_root_for(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
    let root = if parent.file_name().is_some_and(|name| name == CONFIG_DIR) {
        parent.parent().unwrap_or(parent)
    } else {
        parent
    };
    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root.to_path_buf()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(root: &Path, body: &str) -> PathBuf {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_discovery_walks_upward_and_stops_at_git() {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let nested = repo.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert!(Config::discover_config_file_from(&nested).is_none());

        let path = write_config(&repo, "[sources]\nscan_roots = [\"drive\"]\n");
        assert_eq!(Config::discover_config_file_from(&nested), Some(path));
    }

    #[test]
    fn test_file_values_override_defaults_with_attribution() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            "[budget]\nmax_runtime_secs = 240\n\n[format]\nindent_width = 4\n",
        );

        let config =
            Config::discover_with_env(temp.path(), &CliArgs::default(), no_env).unwrap();

        assert_eq!(config.budget.max_runtime_secs, 240);
        assert_eq!(config.budget.safety_margin_secs, 30);
        assert_eq!(config.format.indent_width, 4);
        assert!(matches!(
            config.source_of("budget.max_runtime_secs"),
            ConfigSource::ConfigFile(_)
        ));
        assert_eq!(config.source_of("budget.safety_margin_secs"), ConfigSource::Defaults);
        assert_eq!(config.base_dir.as_std_path(), temp.path());
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[budget]\nmax_runtime_secs = 240\n");

        let env = |key: &str| match key {
            "MCPSCOUT_MAX_RUNTIME_SECS" => Some("200".to_string()),
            "MCPSCOUT_SCAN_ROOTS" => Some("drive/a, drive/b".to_string()),
            _ => None,
        };
        let from_env = Config::discover_with_env(temp.path(), &CliArgs::default(), env).unwrap();
        assert_eq!(from_env.budget.max_runtime_secs, 200);
        assert_eq!(from_env.sources.scan_roots, ["drive/a", "drive/b"]);

        let cli = CliArgs {
            max_runtime_secs: Some(120),
            ..CliArgs::default()
        };
        let from_cli = Config::discover_with_env(temp.path(), &cli, env).unwrap();
        assert_eq!(from_cli.budget.max_runtime_secs, 120);
        assert_eq!(from_cli.source_of("budget.max_runtime_secs"), ConfigSource::Cli);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "[budget]\nmax_runtime = 240\n");

        let err = Config::discover_with_env(temp.path(), &CliArgs::default(), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile(_)));
    }

    #[test]
    fn test_explicit_path_outside_project_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ci.toml");
        fs::write(&path, "[state]\ndir = \"ci-state\"\n").unwrap();

        let cli = CliArgs {
            config_path: Some(path),
            ..CliArgs::default()
        };
        let config = Config::discover_with_env(Path::new("/"), &cli, no_env).unwrap();

        assert_eq!(config.state_dir().as_std_path(), temp.path().join("ci-state"));
    }
}
