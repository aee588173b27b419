//! LLM client module
//!
//! The model-completion collaborator: a provider-agnostic trait plus an
//! OpenAI-compatible gateway implementation.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod gateway;
pub mod sse;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use gateway::GatewayClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, StreamChunk, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Any provider exposing the chat-completions protocol works through the
/// gateway client; the name only selects it.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" | "gateway" | "openrouter" => Ok(Arc::new(GatewayClient::from_config(config)?)),
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: openai, gateway, openrouter",
                other
            )))
        }
    }
}
