//! Shared HTTP client for research providers
//!
//! One `reqwest::Client` per backend with a connect timeout, a per-request
//! ceiling and a small retry policy for 5xx and network failures.

use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use mcpscout_utils::error::ResearchError;
use mcpscout_utils::redaction::redact_secrets;

const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries after the first attempt for 5xx and network failures
const MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
    backoff: Duration,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `ResearchError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, ResearchError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns `ResearchError::Misconfiguration` if the client cannot be constructed
    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, ResearchError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| {
                ResearchError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
            backoff: INITIAL_BACKOFF,
        })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Execute a request with timeout and retry policy
    ///
    /// - Per-request timeout: `min(request_timeout, max_timeout)`
    /// - Up to 2 retries for 5xx and network failures, backing off 1s then 2s
    /// - No retries for 4xx
    ///
    /// # Errors
    ///
    /// - `ProviderAuth` for 401/403
    /// - `ProviderQuota` for 429
    /// - `ProviderOutage` for 5xx after retries
    /// - `Timeout` when the request times out
    /// - `Transport` for network errors after retries and other 4xx
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, ResearchError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| {
                    ResearchError::Transport("Failed to clone request for retry".to_string())
                })?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| ResearchError::Transport(format!("Failed to build request: {e}")))?;

            debug!(
                provider = provider_name,
                attempt,
                timeout_secs = effective_timeout.as_secs(),
                "Executing HTTP request"
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(map_client_error(status, provider_name));
                    }

                    if status.is_server_error() {
                        if attempt <= MAX_RETRIES {
                            warn!(
                                provider = provider_name,
                                attempt,
                                status = status.as_u16(),
                                "Server error, will retry"
                            );
                            tokio::time::sleep(self.backoff * attempt).await;
                            continue;
                        }
                        return Err(ResearchError::ProviderOutage(format!(
                            "{provider_name} returned server error: {status}"
                        )));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(ResearchError::Timeout {
                            duration: effective_timeout,
                        });
                    }

                    let message = redact_secrets(&e.to_string());
                    if attempt <= MAX_RETRIES {
                        warn!(
                            provider = provider_name,
                            attempt,
                            error = %message,
                            "Network error, will retry"
                        );
                        tokio::time::sleep(self.backoff * attempt).await;
                        continue;
                    }

                    return Err(ResearchError::Transport(format!(
                        "{provider_name} request failed: {message}"
                    )));
                }
            }
        }
    }
}

/// 401/403 → `ProviderAuth`, 429 → `ProviderQuota`, other 4xx → `Transport`
fn map_client_error(status: StatusCode, provider_name: &str) -> ResearchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ResearchError::ProviderAuth(format!(
            "{provider_name} authentication failed: {status}"
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            ResearchError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        _ => ResearchError::Transport(format!("{provider_name} returned client error: {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_with_custom_timeout() {
        let client = HttpClient::with_max_timeout(Duration::from_secs(60)).unwrap();
        assert_eq!(client.max_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_map_auth_errors() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            match map_client_error(status, "anthropic") {
                ResearchError::ProviderAuth(msg) => {
                    assert!(msg.contains("anthropic"));
                    assert!(msg.contains(status.as_str()));
                }
                other => panic!("expected ProviderAuth for {status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_map_429_to_quota() {
        assert!(matches!(
            map_client_error(StatusCode::TOO_MANY_REQUESTS, "anthropic"),
            ResearchError::ProviderQuota(_)
        ));
    }

    #[test]
    fn test_map_other_4xx_to_transport() {
        assert!(matches!(
            map_client_error(StatusCode::BAD_REQUEST, "anthropic"),
            ResearchError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_after_retries() {
        let mut client = HttpClient::new().unwrap();
        client.backoff = Duration::from_millis(1);

        // Port 9 (discard) on loopback is closed in test environments.
        let request = client.inner().get("http://127.0.0.1:9/v1/messages");
        let err = client
            .execute_with_retry(request, Duration::from_secs(5), "anthropic")
            .await
            .unwrap_err();

        assert!(
            matches!(err, ResearchError::Transport(_) | ResearchError::Timeout { .. }),
            "unexpected error: {err:?}"
        );
    }
}
