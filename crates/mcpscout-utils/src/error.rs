use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use mcpscout_lock::LockError;

/// Top-level error type for mcpscout invocations
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Research backend error: {0}")]
    Research(#[from] ResearchError),

    #[error("Checkpoint state error: {0}")]
    State(#[from] StateError),

    #[error("Invocation lock error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Publishing {file} failed: {reason}")]
    PublishFailed { file: String, reason: String },
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for grouping in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Research,
    Publishing,
    State,
    Concurrency,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Storage => write!(f, "Storage"),
            Self::Research => write!(f, "Research"),
            Self::Publishing => write!(f, "Publishing"),
            Self::State => write!(f, "Checkpoint State"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(msg) => format!("The configuration file could not be loaded: {msg}"),
            Self::MissingRequired(what) => format!("Required setting is missing: {what}"),
            Self::InvalidValue { key, value } => {
                format!("Setting '{key}' has an invalid value: {value}")
            }
            Self::DiscoveryFailed { reason } => {
                format!("Could not locate configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::MissingRequired(_) => Some(
                "mcpscout refuses to start without sources and credentials so that no checkpoint state is touched"
                    .to_string(),
            ),
            Self::InvalidFile(_) => {
                Some("Configuration is read from .mcpscout/config.toml".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::MissingRequired(_) => vec![
                "Add [sources] primary or scan_roots to .mcpscout/config.toml".to_string(),
                "Export the API key and token variables named in [research] and [repository]"
                    .to_string(),
            ],
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of the configuration file".to_string(),
                "Run 'mcpscout config show' to see the effective configuration".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![format!("Correct the value of '{key}'")],
            Self::DiscoveryFailed { .. } => vec![
                "Pass --config <path> to point at a configuration file explicitly".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors raised by storage collaborators (object store, versioned files, checkpoints, scheduler)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict writing {path}: the file changed since it was read")]
    Conflict { path: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("IO error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// Stored data exists but cannot be parsed
    #[error("Corrupt data in {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl StoreError {
    /// Build an [`StoreError::Io`] for `path`
    pub fn io(path: impl fmt::Display, err: impl fmt::Display) -> Self {
        Self::Io {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }

    /// Whether a later invocation may succeed without intervention
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Conflict { .. })
    }
}

/// Errors that can occur while calling the research collaborator
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Transport-level failure (HTTP connectivity)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota or rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Per-invocation call budget exhausted
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// The provider answered but the envelope did not carry a parsable result
    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),
}

impl UserFriendlyError for ResearchError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Research call could not reach the provider: {msg}"),
            Self::ProviderAuth(msg) => format!("Research provider rejected the credentials: {msg}"),
            Self::ProviderQuota(msg) => format!("Research provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Research provider is unavailable: {msg}"),
            Self::Timeout { duration } => {
                format!("Research call timed out after {}s", duration.as_secs())
            }
            Self::BudgetExceeded { limit, .. } => {
                format!("Research call budget of {limit} calls per run is used up")
            }
            Self::Misconfiguration(msg) => format!("Research backend is misconfigured: {msg}"),
            Self::MalformedEnvelope(msg) => {
                format!("Research provider returned an unusable response: {msg}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) | Self::Timeout { .. } => Some(
                "The item is recorded as retry-eligible and attempted again next session"
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => vec![
                "Check the variable named by [research] api_key_env".to_string(),
            ],
            Self::ProviderQuota(_) => {
                vec!["Increase [budget] item_delay_ms to slow down research calls".to_string()]
            }
            Self::BudgetExceeded { .. } => {
                vec!["Raise [research] max_calls_per_run or wait for the next run".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Research
    }
}

/// Errors raised when persisted checkpoint state cannot be trusted
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Checkpoint '{marker}' is corrupt: {reason}")]
    CorruptCheckpoint { marker: String, reason: String },

    #[error("Checkpoint '{marker}' has schema '{found}', expected '{expected}'")]
    SchemaMismatch {
        marker: String,
        expected: String,
        found: String,
    },
}

/// Reasons a research result is rejected before it can be committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Category name is not lowercase snake case
    InvalidCategory { category: String },
    /// A found result carries no entry text
    MissingEntry,
    /// Entry text does not begin with `- id:`
    EntryPrefix { found: String },
    /// Entry text is not parseable YAML
    MalformedEntry { reason: String },
    /// Entry parses but has the wrong structure
    EntryShape { reason: String },
    /// Entry `id` differs from the item key it was researched for
    IdMismatch { expected: String, found: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCategory { category } => {
                write!(f, "category '{category}' must match ^[a-z0-9_]+$")
            }
            Self::MissingEntry => write!(f, "found result has no formatted entry"),
            Self::EntryPrefix { found } => {
                write!(f, "entry must start with '- id:', found '{found}'")
            }
            Self::MalformedEntry { reason } => write!(f, "entry is not valid YAML: {reason}"),
            Self::EntryShape { reason } => write!(f, "entry has the wrong shape: {reason}"),
            Self::IdMismatch { expected, found } => {
                write!(f, "entry id '{found}' does not match item key '{expected}'")
            }
        }
    }
}

impl UserFriendlyError for ScoutError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.user_message(),
            Self::Research(err) => err.user_message(),
            Self::Store(StoreError::Conflict { path }) => {
                format!("{path} was modified by someone else while mcpscout was writing it")
            }
            Self::Store(err) => format!("Storage operation failed: {err}"),
            Self::State(err) => format!("Saved progress could not be loaded: {err}"),
            Self::Lock(err) => format!("Could not take the invocation lock: {err}"),
            Self::Io(err) => format!("File system operation failed: {err}"),
            Self::PublishFailed { file, reason } => format!("Could not publish {file}: {reason}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(err) => err.context(),
            Self::Research(err) => err.context(),
            Self::Lock(_) => {
                Some("Only one mcpscout run may work on a state directory".to_string())
            }
            Self::State(_) => Some(
                "Corrupt checkpoints are discarded and a fresh scan begins on the next run"
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(err) => err.suggestions(),
            Self::Research(err) => err.suggestions(),
            Self::Lock(LockError::StaleLock { .. }) => {
                vec!["Re-run with --force-unlock if the holder is hung".to_string()]
            }
            Self::Lock(_) => vec!["Wait for the running invocation to finish".to_string()],
            Self::State(_) => vec!["Run 'mcpscout reset' to discard saved progress".to_string()],
            Self::Store(StoreError::Conflict { .. }) | Self::PublishFailed { .. } => vec![
                "The next run re-reads the file and retries the commit".to_string(),
            ],
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Store(_) => ErrorCategory::Storage,
            Self::Research(_) => ErrorCategory::Research,
            Self::State(_) => ErrorCategory::State,
            Self::Lock(_) => ErrorCategory::Concurrency,
            Self::Io(_) => ErrorCategory::FileSystem,
            Self::PublishFailed { .. } => ErrorCategory::Publishing,
        }
    }
}

impl ScoutError {
    /// Render the error with context and suggestions for terminal output
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("error [{}]: {}", self.category(), self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n  context: {context}"));
        }
        for suggestion in self.suggestions() {
            out.push_str(&format!("\n  hint: {suggestion}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_transient() {
        let err = StoreError::Conflict {
            path: "data/servers.yaml".to_string(),
        };
        assert!(err.is_transient());
        assert!(!StoreError::NotFound("x".to_string()).is_transient());
    }

    #[test]
    fn test_missing_config_has_suggestions() {
        let err = ScoutError::from(ConfigError::MissingRequired(
            "no primary source or scan root configured".to_string(),
        ));

        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.suggestions().is_empty());
        assert!(err.display_for_user().contains("hint:"));
    }

    #[test]
    fn test_conflict_message_names_the_file() {
        let err = ScoutError::from(StoreError::Conflict {
            path: "data/unresolved.md".to_string(),
        });

        assert!(err.user_message().contains("data/unresolved.md"));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }
}
