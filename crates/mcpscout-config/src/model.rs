use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use strum::{Display, EnumString};

use mcpscout_utils::error::ConfigError;

/// Where an effective configuration value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ConfigSource {
    Defaults,
    ConfigFile(String),
    Env(String),
    Cli,
    Programmatic,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => write!(f, "default"),
            Self::ConfigFile(path) => write!(f, "file {path}"),
            Self::Env(var) => write!(f, "env {var}"),
            Self::Cli => write!(f, "cli"),
            Self::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Execution-time ceiling and pacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    /// Wall-clock ceiling for one invocation
    pub max_runtime_secs: u64,
    /// Time kept in reserve for persisting state after a stop decision
    pub safety_margin_secs: u64,
    /// Fixed pause between research calls
    pub item_delay_ms: u64,
    /// Delay before a scheduled continuation becomes due
    pub continuation_delay_secs: u64,
    /// Age after which a live invocation lock counts as stale
    pub lock_ttl_secs: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_runtime_secs: 330,
            safety_margin_secs: 30,
            item_delay_ms: 1000,
            continuation_delay_secs: 60,
            lock_ttl_secs: 3600,
        }
    }
}

/// One explicitly configured source file, fetched by handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimarySource {
    pub name: String,
    pub location: String,
}

/// Where items are discovered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// Files merged first, in order
    pub primary: Vec<PrimarySource>,
    /// Containers scanned recursively after the primary files
    pub scan_roots: Vec<String>,
    /// Leaves modified before this instant are ignored (RFC 3339 or YYYY-MM-DD)
    pub cutoff: Option<String>,
    pub extension: String,
    /// Top-level key a leaf must carry to count as a source
    pub shape_key: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            primary: Vec::new(),
            scan_roots: Vec::new(),
            cutoff: None,
            extension: ".json".to_string(),
            shape_key: "mcpServers".to_string(),
        }
    }
}

impl SourcesConfig {
    /// Parsed cutoff instant, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the value is neither RFC 3339
    /// nor a plain `YYYY-MM-DD` date.
    pub fn cutoff_instant(&self) -> Result<Option<DateTime<Utc>>, ConfigError> {
        self.cutoff.as_deref().map(parse_cutoff).transpose()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.scan_roots.is_empty()
    }
}

pub(crate) fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "sources.cutoff".to_string(),
            value: format!("'{raw}' is not an RFC 3339 timestamp or YYYY-MM-DD date"),
        })
}

/// Local directory backing the object store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectsConfig {
    pub root: String,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
        }
    }
}

/// Which versioned file store receives published files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RepositoryBackend {
    /// Files inside a local directory, versioned by content hash
    #[default]
    Local,
    /// Files in a GitHub repository, versioned by blob sha
    Github,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    pub backend: RepositoryBackend,
    pub owner: Option<String>,
    pub name: Option<String>,
    pub branch: String,
    pub api_base: String,
    /// Environment variable holding the repository token
    pub token_env: String,
    pub local_root: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: RepositoryBackend::Local,
            owner: None,
            name: None,
            branch: "main".to_string(),
            api_base: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            local_root: ".".to_string(),
        }
    }
}

/// Paths of the published files inside the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    pub entries: String,
    pub reports: String,
    pub categories: String,
    /// Local path of the research rules text
    pub rules: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            entries: "data/servers.yaml".to_string(),
            reports: "data/unresolved.md".to_string(),
            categories: "data/categories.json".to_string(),
            rules: ".mcpscout/rules.md".to_string(),
        }
    }
}

/// Layout of the entries file and prefix parsing rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatConfig {
    pub indent_width: usize,
    /// Token that ends the prefix of an item key
    pub prefix_delimiter: String,
    /// Fallback separator when the delimiter is absent
    pub prefix_separator: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            indent_width: 2,
            prefix_delimiter: "-mcp".to_string(),
            prefix_separator: "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResearchConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Maximum research calls per invocation; unlimited when unset
    pub max_calls_per_run: Option<u32>,
    /// Failed calls tolerated per item before it is reported unresolved
    pub max_retry_attempts: u32,
    /// Let the provider use its web search tool
    pub web_search: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            max_tokens: 2048,
            timeout_secs: 120,
            max_calls_per_run: None,
            max_retry_attempts: 3,
            web_search: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Directory holding checkpoint blobs, flags, continuations and the lock
    pub dir: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: ".mcpscout/state".to_string(),
        }
    }
}

/// Effective configuration for one invocation.
///
/// Constructed once at startup through [`Config::discover`] (or the builder)
/// and passed by reference to every component.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub budget: BudgetConfig,
    pub sources: SourcesConfig,
    pub objects: ObjectsConfig,
    pub repository: RepositoryConfig,
    pub files: FilesConfig,
    pub format: FormatConfig,
    pub research: ResearchConfig,
    pub state: StateConfig,
    /// Directory relative paths are resolved against
    pub base_dir: Utf8PathBuf,
    /// Origin of each effective value, keyed by `section.field`
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// Resolve a configured path against [`Config::base_dir`]
    #[must_use]
    pub fn resolve_path(&self, raw: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(raw);
        if path.is_absolute() || self.base_dir.as_str().is_empty() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> Utf8PathBuf {
        self.resolve_path(&self.state.dir)
    }

    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Defaults)
    }

    /// Read the secret held in environment variable `var`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] when the variable is unset or empty.
    pub fn secret_from_env(var: &str) -> Result<String, ConfigError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingRequired(format!(
                "environment variable {var} is not set"
            ))),
        }
    }

    /// Flattened `(key, value, source)` rows for `mcpscout config show`
    #[must_use]
    pub fn describe(&self) -> Vec<(String, String, ConfigSource)> {
        let primary = self
            .sources
            .primary
            .iter()
            .map(|s| format!("{}={}", s.name, s.location))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = [
            ("budget.max_runtime_secs", self.budget.max_runtime_secs.to_string()),
            ("budget.safety_margin_secs", self.budget.safety_margin_secs.to_string()),
            ("budget.item_delay_ms", self.budget.item_delay_ms.to_string()),
            ("budget.continuation_delay_secs", self.budget.continuation_delay_secs.to_string()),
            ("budget.lock_ttl_secs", self.budget.lock_ttl_secs.to_string()),
            ("sources.primary", primary),
            ("sources.scan_roots", self.sources.scan_roots.join(", ")),
            ("sources.cutoff", self.sources.cutoff.clone().unwrap_or_default()),
            ("sources.extension", self.sources.extension.clone()),
            ("sources.shape_key", self.sources.shape_key.clone()),
            ("objects.root", self.objects.root.clone()),
            ("repository.backend", self.repository.backend.to_string()),
            ("repository.owner", self.repository.owner.clone().unwrap_or_default()),
            ("repository.name", self.repository.name.clone().unwrap_or_default()),
            ("repository.branch", self.repository.branch.clone()),
            ("repository.token_env", self.repository.token_env.clone()),
            ("repository.local_root", self.repository.local_root.clone()),
            ("files.entries", self.files.entries.clone()),
            ("files.reports", self.files.reports.clone()),
            ("files.categories", self.files.categories.clone()),
            ("files.rules", self.files.rules.clone()),
            ("format.indent_width", self.format.indent_width.to_string()),
            ("format.prefix_delimiter", self.format.prefix_delimiter.clone()),
            ("format.prefix_separator", self.format.prefix_separator.clone()),
            ("research.provider", self.research.provider.clone()),
            ("research.model", self.research.model.clone()),
            ("research.api_key_env", self.research.api_key_env.clone()),
            (
                "research.max_calls_per_run",
                self.research
                    .max_calls_per_run
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "unlimited".to_string()),
            ),
            ("research.max_retry_attempts", self.research.max_retry_attempts.to_string()),
            ("state.dir", self.state.dir.clone()),
        ];

        rows.into_iter()
            .map(|(key, value)| (key.to_string(), value, self.source_of(key)))
            .collect()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Config {
    /// A valid configuration rooted at `base_dir` with one scan root
    pub fn minimal_for_testing(base_dir: &Utf8Path) -> Self {
        Config {
            sources: SourcesConfig {
                scan_roots: vec!["sources".to_string()],
                ..SourcesConfig::default()
            },
            budget: BudgetConfig {
                item_delay_ms: 0,
                ..BudgetConfig::default()
            },
            base_dir: base_dir.to_path_buf(),
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_accepts_date_and_timestamp() {
        let date = parse_cutoff("2025-03-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2025-03-01T00:00:00+00:00");

        let stamp = parse_cutoff("2025-03-01T12:30:00+02:00").unwrap();
        assert_eq!(stamp.to_rfc3339(), "2025-03-01T10:30:00+00:00");

        assert!(parse_cutoff("last tuesday").is_err());
    }

    #[test]
    fn test_resolve_path_keeps_absolute_paths() {
        let config = Config {
            base_dir: Utf8PathBuf::from("/srv/catalog"),
            ..Config::default()
        };

        assert_eq!(config.state_dir(), Utf8PathBuf::from("/srv/catalog/.mcpscout/state"));
        assert_eq!(config.resolve_path("/tmp/x"), Utf8PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_describe_reports_defaults() {
        let config = Config::default();
        let rows = config.describe();

        let indent = rows
            .iter()
            .find(|(key, _, _)| key == "format.indent_width")
            .unwrap();
        assert_eq!(indent.1, "2");
        assert_eq!(indent.2, ConfigSource::Defaults);
    }
}
