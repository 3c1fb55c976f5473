use mcpscout_utils::error::ConfigError;

use super::{Config, RepositoryBackend};

fn invalid(key: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.max_runtime_secs == 0 {
            return Err(invalid("budget.max_runtime_secs", "must be greater than 0"));
        }
        if self.budget.safety_margin_secs >= self.budget.max_runtime_secs {
            return Err(invalid(
                "budget.safety_margin_secs",
                format!(
                    "{} must be smaller than budget.max_runtime_secs ({})",
                    self.budget.safety_margin_secs, self.budget.max_runtime_secs
                ),
            ));
        }

        if self.format.indent_width == 0 || self.format.indent_width > 8 {
            return Err(invalid("format.indent_width", "must be between 1 and 8"));
        }
        if self.format.prefix_separator.is_empty() {
            return Err(invalid("format.prefix_separator", "must not be empty"));
        }

        if !self.sources.extension.starts_with('.') {
            return Err(invalid(
                "sources.extension",
                format!("'{}' must start with '.'", self.sources.extension),
            ));
        }
        if self.sources.shape_key.trim().is_empty() {
            return Err(invalid("sources.shape_key", "must not be empty"));
        }
        self.sources.cutoff_instant()?;

        if let Some(source) = self
            .sources
            .primary
            .iter()
            .find(|s| s.location.trim().is_empty())
        {
            return Err(invalid(
                "sources.primary",
                format!("source '{}' has an empty location", source.name),
            ));
        }

        if self.research.provider != "anthropic" {
            return Err(invalid(
                "research.provider",
                format!("unsupported provider '{}'", self.research.provider),
            ));
        }
        if self.research.max_tokens == 0 {
            return Err(invalid("research.max_tokens", "must be greater than 0"));
        }
        if self.research.max_calls_per_run == Some(0) {
            return Err(invalid("research.max_calls_per_run", "must be greater than 0"));
        }

        if self.repository.backend == RepositoryBackend::Github {
            for (key, value) in [
                ("repository.owner", &self.repository.owner),
                ("repository.name", &self.repository.name),
            ] {
                if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                    return Err(invalid(key, "required for the github backend"));
                }
            }
        }

        Ok(())
    }

    /// Check the settings a `run` cannot start without.
    ///
    /// Called before any checkpoint state is read or written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] when no source is configured or
    /// a credential variable is unset.
    pub fn require_runnable(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::MissingRequired(
                "no primary source or scan root configured".to_string(),
            ));
        }
        Self::secret_from_env(&self.research.api_key_env)?;
        if self.repository.backend == RepositoryBackend::Github {
            Self::secret_from_env(&self.repository.token_env)?;
        }
        Ok(())
    }
}
