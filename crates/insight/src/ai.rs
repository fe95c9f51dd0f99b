//! Client for the OpenAI-compatible chat completions API (Scaleway
//! Generative APIs in production).
//!
//! Two generation modes, exposed as two narrow traits so handlers and
//! tests can depend on exactly what they use:
//! - [`StreamingCompletion`]: SSE token stream for the analysis endpoint
//! - [`StructuredCompletion`]: single JSON-mode response for the persona

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;

use common::config::Ai as AiConfig;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("model service returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model response contained no content")]
    Empty,
    #[error("model stream produced no chunk within {0:?}")]
    Stalled(Duration),
}

/// One generation request: a system prompt and a user prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, AiError>> + Send>>;

#[async_trait]
pub trait StreamingCompletion: Send + Sync {
    /// Start a streamed completion. The returned stream yields text
    /// deltas in generation order; an `Err` item terminates the stream.
    async fn stream_completion(&self, request: &CompletionRequest)
        -> Result<CompletionStream, AiError>;
}

#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    /// Run a JSON-mode completion and return the parsed object.
    async fn complete_json(&self, request: &CompletionRequest)
        -> Result<serde_json::Value, AiError>;
}

/// Bound for state that needs both generation modes.
pub trait InsightModel: StreamingCompletion + StructuredCompletion {}

impl<T: StreamingCompletion + StructuredCompletion> InsightModel for T {}

pub struct ScalewayClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    http: reqwest::Client,
}

impl ScalewayClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        // The builder timeout caps the whole request, streamed body
        // included; per-chunk liveness is enforced by the session.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            http,
        })
    }

    fn request_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": stream,
        });
        if !stream {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    async fn post_completion(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request, stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            metrics::counter!("insight_ai_request_errors_total").increment(1);
            return Err(AiError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        metrics::counter!(
            "insight_ai_requests_total",
            "mode" => if stream { "stream" } else { "json" }
        )
        .increment(1);
        Ok(response)
    }
}

#[async_trait]
impl StreamingCompletion for ScalewayClient {
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, AiError> {
        let response = self.post_completion(request, true).await?;
        Ok(sse_text_stream(response.bytes_stream().boxed()))
    }
}

#[async_trait]
impl StructuredCompletion for ScalewayClient {
    async fn complete_json(
        &self,
        request: &CompletionRequest,
    ) -> Result<serde_json::Value, AiError> {
        let response = self.post_completion(request, false).await?;
        let completion: Completion = response
            .json()
            .await
            .map_err(|e| AiError::Decode(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(AiError::Empty)?;
        serde_json::from_str(&content)
            .map_err(|e| AiError::Decode(format!("completion is not valid JSON: {e}")))
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the text delta from one SSE `data:` payload. Role-only and
/// empty-choices chunks yield `None`.
fn delta_content(payload: &str) -> Result<Option<String>, AiError> {
    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| AiError::Decode(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content))
}

struct SseState<B> {
    upstream: BoxStream<'static, reqwest::Result<B>>,
    line_buf: String,
    pending: VecDeque<String>,
    done: bool,
}

/// Adapt a raw SSE byte stream into a stream of text deltas.
///
/// Lines may be split across network chunks, so bytes accumulate in a
/// line buffer and only complete lines are parsed. `data: [DONE]`
/// terminates the stream; non-`data:` lines are ignored per the SSE
/// framing rules.
fn sse_text_stream<B>(upstream: BoxStream<'static, reqwest::Result<B>>) -> CompletionStream
where
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        upstream,
        line_buf: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.done {
                return None;
            }
            match state.upstream.next().await {
                None => state.done = true,
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(AiError::Transport(e)), state));
                }
                Some(Ok(bytes)) => {
                    state
                        .line_buf
                        .push_str(&String::from_utf8_lossy(bytes.as_ref()));
                    while let Some(pos) = state.line_buf.find('\n') {
                        let line: String = state.line_buf.drain(..=pos).collect();
                        let Some(payload) = line.trim_end().strip_prefix("data:") else {
                            continue;
                        };
                        let payload = payload.trim_start();
                        if payload == "[DONE]" {
                            state.done = true;
                            break;
                        }
                        match delta_content(payload) {
                            Ok(Some(text)) if !text.is_empty() => state.pending.push_back(text),
                            Ok(_) => {}
                            Err(e) => {
                                state.done = true;
                                return Some((Err(e), state));
                            }
                        }
                    }
                }
            }
        }
    }))
}
