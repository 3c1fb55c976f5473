use camino::Utf8PathBuf;
use std::time::Duration;

use mcpscout_utils::error::ConfigError;

use super::{Config, ConfigSource, PrimarySource, RepositoryBackend};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use mcpscout_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .base_dir("/srv/catalog")
    ///     .scan_root("drive/shared")
    ///     .max_runtime(Duration::from_secs(300))
    ///     .build()
    ///     .expect("valid config");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder for [`Config`].
///
/// Every value set here is attributed to [`ConfigSource::Programmatic`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
    touched: Vec<&'static str>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn base_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.config.base_dir = dir.into();
        self
    }

    #[must_use]
    pub fn state_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.state.dir = dir.into();
        self.touched.push("state.dir");
        self
    }

    #[must_use]
    pub fn max_runtime(mut self, ceiling: Duration) -> Self {
        self.config.budget.max_runtime_secs = ceiling.as_secs();
        self.touched.push("budget.max_runtime_secs");
        self
    }

    #[must_use]
    pub fn safety_margin(mut self, margin: Duration) -> Self {
        self.config.budget.safety_margin_secs = margin.as_secs();
        self.touched.push("budget.safety_margin_secs");
        self
    }

    #[must_use]
    pub fn item_delay(mut self, delay: Duration) -> Self {
        self.config.budget.item_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.touched.push("budget.item_delay_ms");
        self
    }

    #[must_use]
    pub fn primary_source(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        self.config.sources.primary.push(PrimarySource {
            name: name.into(),
            location: location.into(),
        });
        self.touched.push("sources.primary");
        self
    }

    #[must_use]
    pub fn scan_root(mut self, root: impl Into<String>) -> Self {
        self.config.sources.scan_roots.push(root.into());
        self.touched.push("sources.scan_roots");
        self
    }

    #[must_use]
    pub fn cutoff(mut self, cutoff: impl Into<String>) -> Self {
        self.config.sources.cutoff = Some(cutoff.into());
        self.touched.push("sources.cutoff");
        self
    }

    #[must_use]
    pub fn objects_root(mut self, root: impl Into<String>) -> Self {
        self.config.objects.root = root.into();
        self.touched.push("objects.root");
        self
    }

    #[must_use]
    pub fn local_repository(mut self, root: impl Into<String>) -> Self {
        self.config.repository.backend = RepositoryBackend::Local;
        self.config.repository.local_root = root.into();
        self.touched.push("repository.local_root");
        self
    }

    #[must_use]
    pub fn indent_width(mut self, width: usize) -> Self {
        self.config.format.indent_width = width;
        self.touched.push("format.indent_width");
        self
    }

    #[must_use]
    pub fn max_calls_per_run(mut self, limit: u32) -> Self {
        self.config.research.max_calls_per_run = Some(limit);
        self.touched.push("research.max_calls_per_run");
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found by [`Config::validate`].
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = self.config;
        for key in self.touched {
            config
                .source_attribution
                .insert(key.to_string(), ConfigSource::Programmatic);
        }
        config.validate()?;
        Ok(config)
    }
}
