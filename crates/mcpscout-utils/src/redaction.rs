//! Secret redaction for messages that reach logs or published reports
//!
//! HTTP errors from the research provider and the repository API may echo
//! request URLs or headers. Item descriptors may carry auth headers. Anything
//! derived from those passes through [`redact_secrets`] before it is logged or
//! written into the unresolved-report file.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s/]+:[^@\s/]+@").expect("static regex"));

static BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(bearer|token)\s+[A-Za-z0-9._~+/=-]{8,}").expect("static regex"));

static QUERY_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([?&](?:api[_-]?key|key|token|access_token|secret)=)[^&\s]+")
        .expect("static regex")
});

static KNOWN_PREFIXES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:ghp_|gho_|ghs_|github_pat_|sk-ant-|sk-)[A-Za-z0-9_-]{16,}")
        .expect("static regex")
});

static POTENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^A-Za-z0-9_-])[A-Za-z0-9_-]{32,}($|[^A-Za-z0-9_-])").expect("static regex")
});

/// Replace credentials and key-like tokens in `message` with placeholders
#[must_use]
pub fn redact_secrets(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    let redacted = BEARER.replace_all(&redacted, "$1 [REDACTED]");
    let redacted = QUERY_SECRET.replace_all(&redacted, "$1[REDACTED]");
    let redacted = KNOWN_PREFIXES.replace_all(&redacted, "[REDACTED_KEY]");
    let redacted = POTENTIAL_KEY.replace_all(&redacted, "$1[REDACTED_KEY]$2");
    redacted.into_owned()
}
