use crate::llm::Provider;
use std::fmt;

pub const STAGE_MISSING_CREDENTIALS: &str = "missing_credentials";

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub status: Option<u16>,
    pub detail: String,
    pub raw_output: Option<String>,
}

impl LlmDiagnosticsError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, Some(401) | Some(403)) || self.stage == STAGE_MISSING_CREDENTIALS
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

/// True when anywhere in the chain the endpoint answered 401/403.
pub fn is_auth_failure(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<LlmDiagnosticsError>())
        .any(LlmDiagnosticsError::is_auth_failure)
}
