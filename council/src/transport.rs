//! Model transport: how judge prompts reach an LLM provider.
//!
//! [`OpenRouterTransport`] speaks a chat-completions API with bearer
//! auth, temperature 0, and capped tokens. Streaming responses are
//! parsed off the SSE wire on a spawned task that feeds an mpsc-backed
//! [`TokenStream`]; an idle timeout aborts streams that stop making
//! progress. [`ScriptedTransport`] serves canned responses for tests
//! and offline runs.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Event;
use eventsource_stream::EventStreamError;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::warn;

use gauntlet_config::LlmConfig;
use gauntlet_store::Retryable;

use crate::limiter::RateLimiter;
use crate::limiter::provider_of;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Provider rejected the request; retrying will not help.
    #[error("model call rejected: {0}")]
    Rejected(String),

    /// Provider overloaded or unreachable; safe to retry.
    #[error("model endpoint unavailable: {0}")]
    Unavailable(String),

    /// Connect or read deadline exceeded.
    #[error("model call timed out: {0}")]
    Timeout(String),

    /// Response arrived but could not be decoded.
    #[error("malformed model response: {0}")]
    Malformed(String),

    /// Mid-stream failure reported by the provider.
    #[error("model stream error: {0}")]
    Stream(String),

    /// No API key configured; callers skip council rules instead of
    /// failing them.
    #[error("model transport not configured")]
    NotConfigured,
}

impl Retryable for TransportError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Unavailable(_) | TransportError::Timeout(_)
        )
    }
}

/// Stream of response text chunks from one model call.
pub struct TokenStream {
    rx: mpsc::Receiver<Result<String, TransportError>>,
}

impl TokenStream {
    pub fn new(rx: mpsc::Receiver<Result<String, TransportError>>) -> Self {
        Self { rx }
    }
}

impl Stream for TokenStream {
    type Item = Result<String, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Seam between the council and an LLM provider.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Unary call; returns the full response text.
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, TransportError>;

    /// Streaming call; chunks arrive as the model produces them.
    async fn stream(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<TokenStream, TransportError>;

    /// False when calls can only fail (e.g. missing credentials).
    fn is_configured(&self) -> bool {
        true
    }
}

/// Chat-completions transport with per-provider concurrency limits.
pub struct OpenRouterTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    read_timeout: Duration,
    limiter: Arc<RateLimiter>,
}

impl OpenRouterTransport {
    pub fn new(
        llm: &LlmConfig,
        api_key: String,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(llm.connect_timeout())
            .build()
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        Ok(Self {
            client,
            base_url: llm.base_url.clone(),
            api_key,
            read_timeout: llm.read_timeout(),
            limiter,
        })
    }

    fn payload(prompt: &str, model: &str, max_tokens: u32, stream: bool) -> Value {
        json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": 0,
            "stream": stream,
        })
    }

    async fn send(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
        stream: bool,
    ) -> Result<reqwest::Response, TransportError> {
        if self.api_key.is_empty() {
            return Err(TransportError::NotConfigured);
        }
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .timeout(self.read_timeout)
            .json(&Self::payload(prompt, model, max_tokens, stream))
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(TransportError::Unavailable(format!("{status}: {body}")))
        } else {
            Err(TransportError::Rejected(format!("{status}: {body}")))
        }
    }
}

fn classify_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Unavailable(err.to_string())
    } else {
        TransportError::Rejected(err.to_string())
    }
}

#[async_trait]
impl ModelTransport for OpenRouterTransport {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<String, TransportError> {
        let _permit = self.limiter.acquire(provider_of(model)).await;
        let response = self.send(prompt, model, max_tokens, false).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        let content = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(content)
    }

    async fn stream(
        &self,
        prompt: &str,
        model: &str,
        max_tokens: u32,
    ) -> Result<TokenStream, TransportError> {
        let permit = self.limiter.acquire(provider_of(model)).await;
        let response = self.send(prompt, model, max_tokens, true).await?;
        let (tx, rx) = mpsc::channel(256);
        let events = response.bytes_stream().eventsource();
        let idle_timeout = self.read_timeout;
        tokio::spawn(async move {
            process_sse(events, tx, idle_timeout, permit).await;
        });
        Ok(TokenStream::new(rx))
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Drain a chat-completions SSE stream into text chunks. The permit is
/// held until the stream finishes so the provider's concurrency cap
/// covers in-flight streams.
async fn process_sse<S>(
    mut events: S,
    tx: mpsc::Sender<Result<String, TransportError>>,
    idle_timeout: Duration,
    _permit: OwnedSemaphorePermit,
) where
    S: Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Unpin + Send,
{
    loop {
        let event = match timeout(idle_timeout, events.next()).await {
            Ok(Some(Ok(event))) => event,
            Ok(Some(Err(e))) => {
                let _ = tx.send(Err(TransportError::Stream(e.to_string()))).await;
                return;
            }
            Ok(None) => return,
            Err(_) => {
                let _ = tx
                    .send(Err(TransportError::Timeout(
                        "idle timeout waiting for stream".to_string(),
                    )))
                    .await;
                return;
            }
        };

        let data = event.data.trim();
        if data.is_empty() {
            continue;
        }
        if data == "[DONE]" {
            return;
        }
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => {
                warn!("skipping unparseable stream frame: {err}");
                continue;
            }
        };
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("provider error");
            let _ = tx.send(Err(TransportError::Stream(message.to_string()))).await;
            return;
        }
        if let Some(content) = value
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            && !content.is_empty()
            && tx.send(Ok(content.to_string())).await.is_err()
        {
            // Receiver dropped; stop reading.
            return;
        }
    }
}

/// Canned transport: maps model ids to fixed responses. Used by tests
/// and offline dry runs.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: HashMap<String, String>,
    failing: HashMap<String, String>,
    fallback: Option<String>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, model: &str, text: &str) -> Self {
        self.responses.insert(model.to_string(), text.to_string());
        self
    }

    /// Make a model fail with an unavailable error.
    pub fn with_failure(mut self, model: &str, message: &str) -> Self {
        self.failing.insert(model.to_string(), message.to_string());
        self
    }

    /// Response for any model without an explicit entry.
    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    fn lookup(&self, model: &str) -> Result<String, TransportError> {
        if let Some(message) = self.failing.get(model) {
            return Err(TransportError::Unavailable(message.clone()));
        }
        self.responses
            .get(model)
            .cloned()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| TransportError::Rejected(format!("no scripted response for `{model}`")))
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn complete(
        &self,
        _prompt: &str,
        model: &str,
        _max_tokens: u32,
    ) -> Result<String, TransportError> {
        self.lookup(model)
    }

    async fn stream(
        &self,
        _prompt: &str,
        model: &str,
        _max_tokens: u32,
    ) -> Result<TokenStream, TransportError> {
        let text = self.lookup(model);
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            match text {
                Ok(text) => {
                    let mut first = true;
                    for line in text.split('\n') {
                        let chunk = if first {
                            line.to_string()
                        } else {
                            format!("\n{line}")
                        };
                        first = false;
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        Ok(TokenStream::new(rx))
    }
}
