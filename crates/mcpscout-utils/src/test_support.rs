//! Fixtures shared by tests across the workspace

use std::env;

const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Default number of proptest cases when `PROPTEST_CASES` is unset
pub const DEFAULT_PROPTEST_CASES: u32 = 64;

fn make_from(alphabet: &[u8], len: usize, seed: usize) -> String {
    let mut output = String::with_capacity(len);
    let mut idx = seed % alphabet.len();

    for _ in 0..len {
        output.push(alphabet[idx] as char);
        idx = (idx + 7) % alphabet.len();
    }

    output
}

/// Number of proptest cases, from `PROPTEST_CASES`, optionally capped
#[must_use]
pub fn proptest_cases(max_cases: Option<u32>) -> u32 {
    let cases = env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES);
    match max_cases {
        Some(max) => cases.min(max),
        None => cases,
    }
}

/// A syntactically plausible GitHub token that is not a real credential
#[must_use]
pub fn fake_github_token() -> String {
    format!("ghp_{}", make_from(ALNUM, 36, 1))
}

/// A syntactically plausible Anthropic key that is not a real credential
#[must_use]
pub fn fake_anthropic_key() -> String {
    format!("sk-ant-api03-{}", make_from(ALNUM, 40, 2))
}

/// Render an `mcpServers` configuration document from `(id, url)` pairs
#[must_use]
pub fn mcp_config_json(servers: &[(&str, &str)]) -> String {
    let entries: serde_json::Map<String, serde_json::Value> = servers
        .iter()
        .map(|(id, url)| ((*id).to_string(), serde_json::json!({ "url": url })))
        .collect();
    serde_json::json!({ "mcpServers": entries }).to_string()
}
