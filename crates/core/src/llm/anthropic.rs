use crate::config::{env_u64, Settings};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{CompletionRequest, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 2048,
            temperature: None,
            // Analysis answers are long; feeds run on a much shorter timeout.
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mut cfg = Self::new(settings.require_anthropic_api_key()?);
        if let Ok(url) = std::env::var("ANTHROPIC_BASE_URL") {
            cfg.base_url = url;
        }
        if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
            cfg.model = model;
        }
        cfg.max_tokens = u32::try_from(env_u64("ANTHROPIC_MAX_TOKENS", cfg.max_tokens.into())?)
            .context("ANTHROPIC_MAX_TOKENS is too large")?;
        cfg.timeout = Duration::from_secs(env_u64(
            "ANTHROPIC_TIMEOUT_SECS",
            cfg.timeout.as_secs(),
        )?);
        let temperature = std::env::var("ANTHROPIC_TEMPERATURE").ok();
        if let Some(raw) = temperature.filter(|s| !s.trim().is_empty()) {
            let t: f32 = raw
                .trim()
                .parse()
                .with_context(|| format!("ANTHROPIC_TEMPERATURE must be a number (got {raw:?})"))?;
            cfg.temperature = Some(t.clamp(0.0, 1.0));
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AnthropicClient {
    pub fn new(cfg: AnthropicConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(&cfg.api_key)
            .context("ANTHROPIC_API_KEY is not a valid header value")?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(cfg.timeout)
            .build()
            .context("failed to build inference http client")?;

        Ok(Self {
            http,
            endpoint: format!("{}/v1/messages", cfg.base_url.trim_end_matches('/')),
            model: cfg.model,
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(AnthropicConfig::from_settings(settings)?)
    }

    fn diagnostics(
        stage: &'static str,
        status: Option<u16>,
        detail: String,
        raw: Option<String>,
    ) -> anyhow::Error {
        LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage,
            status,
            detail,
            raw_output: raw,
        }
        .into()
    }

    async fn send(&self, body: &MessagesBody<'_>) -> anyhow::Result<MessagesReply> {
        let res = self
            .http
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .context("inference request failed")?;

        let status = res.status();
        let raw = res.text().await.context("failed to read inference response body")?;
        if !status.is_success() {
            return Err(Self::diagnostics(
                "http",
                Some(status.as_u16()),
                format!("status={status}"),
                Some(raw),
            ));
        }

        serde_json::from_str(&raw).map_err(|err| {
            let detail = format!("unexpected response shape: {err}");
            Self::diagnostics("decode", None, detail, Some(raw))
        })
    }
}

impl MessagesReply {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(text.as_str()),
                Block::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<String> {
        let t0 = Instant::now();
        let reply = self
            .send(&MessagesBody {
                model: &self.model,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                system: &req.system,
                messages: [Turn {
                    role: "user",
                    content: &req.prompt,
                }],
            })
            .await?;

        tracing::debug!(
            model = %self.model,
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "inference call finished"
        );
        if reply.stop_reason.as_deref() == Some("max_tokens") {
            tracing::warn!(
                max_tokens = self.max_tokens,
                "inference output hit max_tokens; answer may be cut off"
            );
        }

        let text = reply.text();
        if text.trim().is_empty() {
            return Err(Self::diagnostics(
                "empty_output",
                None,
                "response carried no text".to_string(),
                None,
            ));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    system: &'a str,
    messages: [Turn<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::error::is_auth_failure;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> AnthropicClient {
        let mut cfg = AnthropicConfig::new("test-key");
        cfg.base_url = base_url;
        cfg.max_tokens = 512;
        cfg.timeout = Duration::from_secs(5);
        AnthropicClient::new(cfg).unwrap()
    }

    fn req() -> CompletionRequest {
        CompletionRequest {
            system: "system".to_string(),
            prompt: "prompt".to_string(),
        }
    }

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let reply: MessagesReply = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "part one"},
                {"type": "text", "text": "{\"a\":1}"}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(reply.text(), "part one\n{\"a\":1}");
        assert_eq!(reply.usage.output_tokens, 0);
    }

    #[tokio::test]
    async fn returns_text_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({
                "max_tokens": 512,
                "system": "system",
                "messages": [{"role": "user", "content": "prompt"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "{\"confidence\": 50}"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })))
            .mount(&server)
            .await;

        let out = client(server.uri()).complete(req()).await.unwrap();
        assert_eq!(out, "{\"confidence\": 50}");
    }

    #[tokio::test]
    async fn unauthorized_is_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let err = client(server.uri()).complete(req()).await.unwrap_err();
        assert!(is_auth_failure(&err));
    }

    #[tokio::test]
    async fn overloaded_is_not_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529))
            .mount(&server)
            .await;

        let err = client(server.uri()).complete(req()).await.unwrap_err();
        assert!(!is_auth_failure(&err));
    }

    #[tokio::test]
    async fn reply_without_text_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "tool_use", "id": "t1", "name": "x", "input": {}}]
            })))
            .mount(&server)
            .await;

        let err = client(server.uri()).complete(req()).await.unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "empty_output");
    }
}
