pub mod anthropic;
pub mod error;
pub mod json;

use crate::config::Settings;
use error::{LlmDiagnosticsError, STAGE_MISSING_CREDENTIALS};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<String>;
}

pub fn client_from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn LlmClient>> {
    if settings.anthropic_api_key.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY missing; analysis will report an auth failure");
        return Ok(Arc::new(UnconfiguredLlm));
    }
    Ok(Arc::new(anthropic::AnthropicClient::from_settings(settings)?))
}

/// Stand-in when no API key is configured. Every call is a credential failure, so analysis
/// cycles abort on their first instrument and the auth state tells clients why.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredLlm;

#[async_trait::async_trait]
impl LlmClient for UnconfiguredLlm {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, _req: CompletionRequest) -> anyhow::Result<String> {
        Err(LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage: STAGE_MISSING_CREDENTIALS,
            status: None,
            detail: "ANTHROPIC_API_KEY is not set".to_string(),
            raw_output: None,
        }
        .into())
    }
}
