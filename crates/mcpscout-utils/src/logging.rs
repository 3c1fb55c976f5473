//! Tracing setup for the mcpscout binary
//!
//! Library crates only emit `tracing` events with structured fields
//! (`item`, `container`, `phase`, `file`). The binary installs one subscriber
//! at startup through [`init_tracing`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line events
    #[default]
    Compact,
    /// One JSON object per event, for log shippers
    Json,
}

/// Build the filter used when `RUST_LOG` is not set
#[must_use]
pub fn default_filter(verbose: bool) -> EnvFilter {
    let directives = if verbose {
        "mcpscout=debug,info"
    } else {
        "mcpscout=info,warn"
    };
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `verbose`. Events go to stderr so that stdout stays
/// reserved for command output such as `status --json`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(
    verbose: bool,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbose)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(false),
            )
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(true).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(default_filter(false).max_level_hint(), Some(LevelFilter::INFO));
    }
}
