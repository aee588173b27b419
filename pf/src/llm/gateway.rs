//! OpenAI-compatible chat-completions client
//!
//! Talks to any gateway that speaks `/v1/chat/completions`, in blocking or
//! streaming mode. Failures are returned as-is; there is no retry loop.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::sse::{EventDecoder, SseEvent};
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, StreamChunk, TokenUsage};
use crate::config::LlmConfig;

/// Chat-completions gateway client
pub struct GatewayClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl GatewayClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, "GatewayClient::from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(%self.model, %request.max_tokens, message_count = request.messages.len(), "build_request_body: called");

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(request.messages.iter().map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content,
            })
        }));

        let max_tokens = request.max_tokens.min(self.max_tokens);

        // Reasoning model families only accept max_completion_tokens
        let uses_completion_tokens =
            self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(LlmError::Network)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status, "post: provider returned an error");
            return Err(LlmError::from_status(status, text));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for GatewayClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, "complete: called");
        let body = self.build_request_body(&request);
        let response = self.post(&body).await?;

        let api_response: ChatResponse = response.json().await?;
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("Response contained no choices".to_string()))?;

        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        debug!("complete: success");
        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            stop_reason: StopReason::from_finish_reason(choice.finish_reason.as_deref()),
            usage,
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(%self.model, "stream: called");
        let mut body = self.build_request_body(&request);
        body["stream"] = serde_json::json!(true);

        let response = self.post(&body).await?;

        let mut stream = response.bytes_stream();
        let mut decoder = EventDecoder::new();
        let mut full_content = String::new();
        let mut stop_reason = StopReason::EndTurn;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(LlmError::Network)?;
            for event in decoder.feed(&chunk) {
                match event {
                    SseEvent::Delta(text) => {
                        full_content.push_str(&text);
                        let _ = chunk_tx.send(StreamChunk::TextDelta(text)).await;
                    }
                    SseEvent::Finish(reason) => stop_reason = StopReason::from_finish_reason(Some(&reason)),
                    SseEvent::Done => {}
                }
            }
            if decoder.is_done() {
                debug!("stream: done sentinel received");
                break;
            }
        }

        for event in decoder.finish() {
            if let SseEvent::Delta(text) = event {
                full_content.push_str(&text);
                let _ = chunk_tx.send(StreamChunk::TextDelta(text)).await;
            }
        }

        let usage = TokenUsage::default();
        let _ = chunk_tx.send(StreamChunk::MessageDone { stop_reason, usage }).await;

        debug!(len = full_content.len(), "stream: finished");
        Ok(CompletionResponse {
            content: full_content,
            stop_reason,
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
