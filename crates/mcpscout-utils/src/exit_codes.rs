//! Exit code constants and error mapping for mcpscout.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Invocation completed or suspended cleanly |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration values |
//! | 3 | `CONFIG_MISSING` | Sources or credentials are not configured |
//! | 4 | `STATE_CORRUPT` | Checkpoint state could not be loaded |
//! | 5 | `PUBLISH_CONFLICT` | A published file changed underneath a write |
//! | 6 | `RESEARCH_FAILURE` | Research backend failed in a way that stops the run |
//! | 9 | `LOCK_HELD` | Another invocation holds the lock |

use crate::error::{ConfigError, ScoutError, StoreError};

/// Process exit code for an mcpscout invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const INTERNAL: ExitCode = ExitCode(1);
    pub const CLI_ARGS: ExitCode = ExitCode(2);
    pub const CONFIG_MISSING: ExitCode = ExitCode(3);
    pub const STATE_CORRUPT: ExitCode = ExitCode(4);
    pub const PUBLISH_CONFLICT: ExitCode = ExitCode(5);
    pub const RESEARCH_FAILURE: ExitCode = ExitCode(6);
    pub const LOCK_HELD: ExitCode = ExitCode(9);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&ScoutError> for ExitCode {
    fn from(err: &ScoutError) -> Self {
        match err {
            ScoutError::Config(ConfigError::MissingRequired(_)) => ExitCode::CONFIG_MISSING,
            ScoutError::Config(_) => ExitCode::CLI_ARGS,
            ScoutError::State(_) => ExitCode::STATE_CORRUPT,
            ScoutError::Store(StoreError::Conflict { .. }) => ExitCode::PUBLISH_CONFLICT,
            ScoutError::PublishFailed { .. } => ExitCode::PUBLISH_CONFLICT,
            ScoutError::Research(_) => ExitCode::RESEARCH_FAILURE,
            ScoutError::Lock(_) => ExitCode::LOCK_HELD,
            ScoutError::Store(_) | ScoutError::Io(_) => ExitCode::INTERNAL,
        }
    }
}

impl ScoutError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LockError, ResearchError, StateError};

    #[test]
    fn test_exit_code_mapping() {
        let cases = [
            (
                ScoutError::from(ConfigError::MissingRequired("sources".to_string())),
                ExitCode::CONFIG_MISSING,
            ),
            (
                ScoutError::from(ConfigError::InvalidValue {
                    key: "format.indent_width".to_string(),
                    value: "0".to_string(),
                }),
                ExitCode::CLI_ARGS,
            ),
            (
                ScoutError::from(StoreError::Conflict {
                    path: "data/servers.yaml".to_string(),
                }),
                ExitCode::PUBLISH_CONFLICT,
            ),
            (
                ScoutError::from(StateError::CorruptCheckpoint {
                    marker: "queue".to_string(),
                    reason: "EOF".to_string(),
                }),
                ExitCode::STATE_CORRUPT,
            ),
            (
                ScoutError::from(ResearchError::ProviderAuth("401".to_string())),
                ExitCode::RESEARCH_FAILURE,
            ),
            (
                ScoutError::from(LockError::InvocationRunning { pid: 7, age_secs: 3 }),
                ExitCode::LOCK_HELD,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.to_exit_code(), expected, "{err}");
        }
    }

    #[test]
    fn test_round_trip_i32() {
        assert_eq!(ExitCode::from_i32(9), ExitCode::LOCK_HELD);
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
    }
}
