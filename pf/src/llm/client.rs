//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Stateless model client - each call carries its full context
///
/// Conversation state lives in the transcript store; every request rebuilds
/// the prior turns for one agent from it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the whole reply
    ///
    /// Used for forced document synthesis.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion for live chat
    ///
    /// Sends text deltas to the channel as they arrive and returns the final
    /// complete response. An error mid-stream discards what was sent so far.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::llm::{StopReason, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing::debug;

    /// One scripted reply
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Stream these chunks in order, then finish
        Chunks(Vec<String>),
        /// Stream these chunks, then drop the connection
        Interrupted(Vec<String>),
        /// Fail before any output with an authentication error
        Unauthorized,
        /// Fail before any output with a quota error
        RateLimited,
    }

    impl MockReply {
        /// Split text into small chunks so callers see several deltas
        pub fn text(text: &str) -> Self {
            let chars: Vec<char> = text.chars().collect();
            let chunks = chars.chunks(7).map(|c| c.iter().collect()).collect();
            MockReply::Chunks(chunks)
        }
    }

    /// Mock LLM client for unit tests
    pub struct MockLlmClient {
        replies: Mutex<VecDeque<MockReply>>,
        requests: Mutex<Vec<CompletionRequest>>,
        call_count: AtomicUsize,
        chunk_delay: Option<Duration>,
    }

    impl MockLlmClient {
        pub fn new(replies: Vec<MockReply>) -> Self {
            debug!(reply_count = %replies.len(), "MockLlmClient::new: called");
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
                chunk_delay: None,
            }
        }

        pub fn with_texts(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| MockReply::text(t)).collect())
        }

        /// Sleep between chunks so concurrent callers can observe the stream
        pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
            self.chunk_delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Every request received so far, in order
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }

        fn next_reply(&self, request: CompletionRequest) -> Result<MockReply, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            let reply = self.replies.lock().ok().and_then(|mut r| r.pop_front());
            reply.ok_or_else(|| {
                debug!("MockLlmClient::next_reply: no more mock replies");
                LlmError::InvalidResponse("No more mock responses".to_string())
            })
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::complete: called");
            match self.next_reply(request)? {
                MockReply::Chunks(chunks) => Ok(CompletionResponse::text(chunks.concat())),
                MockReply::Interrupted(_) => Err(LlmError::Stream("connection reset".to_string())),
                MockReply::Unauthorized => Err(LlmError::from_status(401, "token expired".to_string())),
                MockReply::RateLimited => Err(LlmError::from_status(429, "too many requests".to_string())),
            }
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::stream: called");
            let (chunks, interrupted) = match self.next_reply(request)? {
                MockReply::Chunks(chunks) => (chunks, false),
                MockReply::Interrupted(chunks) => (chunks, true),
                MockReply::Unauthorized => return Err(LlmError::from_status(401, "token expired".to_string())),
                MockReply::RateLimited => return Err(LlmError::from_status(429, "too many requests".to_string())),
            };

            let mut full = String::new();
            for chunk in chunks {
                if let Some(delay) = self.chunk_delay {
                    tokio::time::sleep(delay).await;
                }
                full.push_str(&chunk);
                let _ = chunk_tx.send(StreamChunk::TextDelta(chunk)).await;
            }

            if interrupted {
                return Err(LlmError::Stream("connection reset".to_string()));
            }

            let _ = chunk_tx
                .send(StreamChunk::MessageDone {
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                })
                .await;
            Ok(CompletionResponse::text(full))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn request() -> CompletionRequest {
            CompletionRequest {
                system_prompt: "Test".to_string(),
                messages: vec![],
                max_tokens: 1000,
            }
        }

        #[tokio::test]
        async fn test_mock_client_streams_chunks() {
            let client = MockLlmClient::with_texts(&["Hello there, how can I help?"]);
            let (tx, mut rx) = mpsc::channel(64);

            let resp = client.stream(request(), tx).await.unwrap();
            assert_eq!(resp.content, "Hello there, how can I help?");

            let mut streamed = String::new();
            let mut deltas = 0;
            while let Some(chunk) = rx.recv().await {
                if let StreamChunk::TextDelta(t) = chunk {
                    streamed.push_str(&t);
                    deltas += 1;
                }
            }
            assert_eq!(streamed, resp.content);
            assert!(deltas > 1);
            assert_eq!(client.call_count(), 1);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.complete(request()).await.is_err());
        }

        #[tokio::test]
        async fn test_mock_client_scripted_failures() {
            let client = MockLlmClient::new(vec![MockReply::Unauthorized, MockReply::RateLimited]);
            let (tx, _rx) = mpsc::channel(8);
            assert!(client.stream(request(), tx.clone()).await.unwrap_err().is_authentication());
            assert!(client.stream(request(), tx).await.unwrap_err().is_quota());
        }
    }
}
