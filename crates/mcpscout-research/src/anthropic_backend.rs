//! Anthropic Messages API research backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use mcpscout_config::Config;
use mcpscout_utils::error::ResearchError;
use mcpscout_utils::types::ResearchResult;

use crate::http_client::HttpClient;
use crate::prompt::{parse_envelope, system_prompt, user_prompt};
use crate::types::{ResearchBackend, ResearchRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

const ANTHROPIC_VERSION: &str = "2023-06-01";

const WEB_SEARCH_TOOL: &str = "web_search_20250305";

const WEB_SEARCH_MAX_USES: u32 = 5;

#[derive(Debug, Clone)]
pub struct AnthropicParams {
    pub model: String,
    pub max_tokens: u32,
    pub web_search: bool,
}

#[derive(Clone)]
pub struct AnthropicResearchBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    params: AnthropicParams,
}

impl AnthropicResearchBackend {
    /// # Errors
    ///
    /// Returns `ResearchError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        params: AnthropicParams,
    ) -> Result<Self, ResearchError> {
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            params,
        })
    }

    /// Build from `[research]`, reading the key from the configured variable
    ///
    /// # Errors
    ///
    /// Returns `ResearchError::Misconfiguration` if the key variable is unset
    /// or the HTTP client cannot be constructed
    pub fn from_config(config: &Config) -> Result<Self, ResearchError> {
        let research = &config.research;
        let api_key = Config::secret_from_env(&research.api_key_env)
            .map_err(|e| ResearchError::Misconfiguration(e.to_string()))?;

        Self::new(
            api_key,
            research.base_url.clone(),
            AnthropicParams {
                model: research.model.clone(),
                max_tokens: research.max_tokens,
                web_search: research.web_search,
            },
        )
    }

    fn build_request(&self, request: &ResearchRequest) -> AnthropicRequest {
        let tools = if self.params.web_search {
            vec![AnthropicTool {
                tool_type: WEB_SEARCH_TOOL.to_string(),
                name: "web_search".to_string(),
                max_uses: WEB_SEARCH_MAX_USES,
            }]
        } else {
            Vec::new()
        };

        AnthropicRequest {
            model: self.params.model.clone(),
            max_tokens: self.params.max_tokens,
            system: system_prompt(&request.rules_text),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: user_prompt(request),
            }],
            tools,
        }
    }
}

#[async_trait]
impl ResearchBackend for AnthropicResearchBackend {
    async fn research(&self, request: &ResearchRequest) -> Result<ResearchResult, ResearchError> {
        debug!(
            provider = "anthropic",
            model = %self.params.model,
            item = %request.item_key,
            web_search = self.params.web_search,
            "Invoking research backend"
        );

        let body = self.build_request(request);
        let http = self
            .client
            .inner()
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .client
            .execute_with_retry(http, request.timeout, "anthropic")
            .await?;

        let response_body: AnthropicResponse = response.json().await.map_err(|e| {
            ResearchError::MalformedEnvelope(format!("Failed to parse Anthropic response: {e}"))
        })?;

        if let Some(usage) = &response_body.usage {
            debug!(
                provider = "anthropic",
                item = %request.item_key,
                tokens_input = usage.input_tokens,
                tokens_output = usage.output_tokens,
                "Research invocation completed"
            );
        }

        extract_result(&response_body.content)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Parse the envelope from the text blocks of a response.
///
/// With web search enabled the answer is interleaved with tool blocks and
/// narration; the last text block carrying an object wins.
fn extract_result(blocks: &[ContentBlock]) -> Result<ResearchResult, ResearchError> {
    let texts: Vec<&str> = blocks
        .iter()
        .filter(|b| b.content_type == "text")
        .filter_map(|b| b.text.as_deref())
        .collect();

    if texts.is_empty() {
        return Err(ResearchError::MalformedEnvelope(
            "Anthropic response missing text content".to_string(),
        ));
    }

    texts
        .iter()
        .rev()
        .find_map(|text| parse_envelope(text).ok())
        .map_or_else(|| parse_envelope(&texts.concat()), Ok)
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicTool {
    #[serde(rename = "type")]
    tool_type: String,
    name: String,
    max_uses: u32,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
