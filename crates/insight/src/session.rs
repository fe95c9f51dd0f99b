//! Lifecycle of one streamed analysis.
//!
//! A session moves Idle -> Requested -> Streaming and ends in exactly
//! one of Completed, Failed or Cancelled. The accumulated text survives
//! the session whatever the outcome, so a failure mid-stream still
//! leaves the partial analysis readable.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::ai::{AiError, CompletionRequest, CompletionStream, StreamingCompletion};

pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requested,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

pub struct InsightSession {
    state: SessionState,
    buffer: String,
    chunk_timeout: Duration,
}

impl InsightSession {
    pub fn new() -> Self {
        Self::with_chunk_timeout(DEFAULT_CHUNK_TIMEOUT)
    }

    pub fn with_chunk_timeout(chunk_timeout: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            buffer: String::new(),
            chunk_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Everything received so far, in arrival order.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Issue the upstream request without consuming anything yet.
    ///
    /// Splitting this from [`Self::consume`] lets callers learn about a
    /// pre-stream refusal (rate limit, bad credentials) while they can
    /// still report it, before any output has been committed.
    pub async fn open(
        &mut self,
        model: &dyn StreamingCompletion,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, AiError> {
        self.state = SessionState::Requested;
        match model.stream_completion(request).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Drive one generation to a terminal state.
    ///
    /// `publish` is called once per chunk with the new delta and the
    /// full buffer, strictly after the delta was appended and before
    /// the next chunk is awaited. Returning `false` cancels the session
    /// (the usual reason is a disconnected consumer).
    ///
    /// A stall longer than the chunk timeout fails the session; the
    /// partial buffer is kept in both the failure and cancel cases.
    pub async fn run<F>(
        &mut self,
        model: &dyn StreamingCompletion,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        publish: F,
    ) -> Result<(), AiError>
    where
        F: FnMut(&str, &str) -> bool,
    {
        if cancel.is_cancelled() {
            self.state = SessionState::Cancelled;
            return Ok(());
        }
        let stream = self.open(model, request).await?;
        self.consume(stream, cancel, publish).await
    }

    /// Consume an already-opened stream (see [`Self::open`]) to a
    /// terminal state. Publication semantics as in [`Self::run`].
    pub async fn consume<F>(
        &mut self,
        mut stream: CompletionStream,
        cancel: &CancellationToken,
        mut publish: F,
    ) -> Result<(), AiError>
    where
        F: FnMut(&str, &str) -> bool,
    {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => {
                    self.state = SessionState::Cancelled;
                    return Ok(());
                }
                next = tokio::time::timeout(self.chunk_timeout, stream.next()) => next,
            };
            let next = match next {
                Ok(next) => next,
                Err(_elapsed) => {
                    self.state = SessionState::Failed;
                    return Err(AiError::Stalled(self.chunk_timeout));
                }
            };
            match next {
                None => {
                    self.state = SessionState::Completed;
                    tracing::debug!(len = self.buffer.len(), "analysis stream completed");
                    return Ok(());
                }
                Some(Err(e)) => {
                    self.state = SessionState::Failed;
                    return Err(e);
                }
                Some(Ok(chunk)) => {
                    self.state = SessionState::Streaming;
                    self.buffer.push_str(&chunk);
                    if !publish(&chunk, &self.buffer) {
                        self.state = SessionState::Cancelled;
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl Default for InsightSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed script of chunks; `Err(())` becomes a decode error.
    struct ScriptedModel {
        script: Vec<Result<&'static str, ()>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(script: Vec<Result<&'static str, ()>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StreamingCompletion for ScriptedModel {
        async fn stream_completion(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionStream, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<String, AiError>> = self
                .script
                .iter()
                .map(|r| match r {
                    Ok(text) => Ok((*text).to_string()),
                    Err(()) => Err(AiError::Decode("scripted failure".to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    struct RefusingModel;

    #[async_trait]
    impl StreamingCompletion for RefusingModel {
        async fn stream_completion(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionStream, AiError> {
            Err(AiError::Upstream {
                status: 429,
                message: "rate limited".to_string(),
            })
        }
    }

    struct SilentModel;

    #[async_trait]
    impl StreamingCompletion for SilentModel {
        async fn stream_completion(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionStream, AiError> {
            Ok(Box::pin(stream::pending()))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".to_string(),
            prompt: "prompt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_buffer_grows_monotonically_to_completion() {
        let model = ScriptedModel::new(vec![Ok("Bonjour"), Ok(" Marie"), Ok("!")]);
        let mut session = InsightSession::new();
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        session
            .run(&model, &request(), &cancel, |chunk, buffer| {
                seen.push((chunk.to_string(), buffer.to_string()));
                true
            })
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.text(), "Bonjour Marie!");
        // Each publication shows the buffer including its own chunk.
        assert_eq!(
            seen,
            vec![
                ("Bonjour".to_string(), "Bonjour".to_string()),
                (" Marie".to_string(), "Bonjour Marie".to_string()),
                ("!".to_string(), "Bonjour Marie!".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_preserves_partial_buffer() {
        let model = ScriptedModel::new(vec![Ok("Bonjour"), Err(())]);
        let mut session = InsightSession::new();
        let cancel = CancellationToken::new();

        let err = session
            .run(&model, &request(), &cancel, |_, _| true)
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Decode(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.text(), "Bonjour");
    }

    #[tokio::test]
    async fn test_refused_request_fails_before_streaming() {
        let mut session = InsightSession::new();
        let cancel = CancellationToken::new();

        let err = session
            .run(&RefusingModel, &request(), &cancel, |_, _| true)
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Upstream { status: 429, .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.text().is_empty());
    }

    #[tokio::test]
    async fn test_open_surfaces_refusal_without_output() {
        let mut session = InsightSession::new();
        let err = session.open(&RefusingModel, &request()).await.err().unwrap();
        assert!(matches!(err, AiError::Upstream { status: 429, .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.text().is_empty());
    }

    #[tokio::test]
    async fn test_open_then_consume_completes() {
        let model = ScriptedModel::new(vec![Ok("Bonjour")]);
        let mut session = InsightSession::new();
        let stream = session.open(&model, &request()).await.unwrap();
        assert_eq!(session.state(), SessionState::Requested);
        let cancel = CancellationToken::new();
        session
            .consume(stream, &cancel, |_, _| true)
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.text(), "Bonjour");
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_model_call() {
        let model = ScriptedModel::new(vec![Ok("never")]);
        let mut session = InsightSession::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        session
            .run(&model, &request(), &cancel, |_, _| true)
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_false_cancels_and_keeps_partial() {
        let model = ScriptedModel::new(vec![Ok("Bonjour"), Ok(" Marie"), Ok("!")]);
        let mut session = InsightSession::new();
        let cancel = CancellationToken::new();

        let mut published = 0;
        session
            .run(&model, &request(), &cancel, |_, _| {
                published += 1;
                published < 2
            })
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(session.text(), "Bonjour Marie");
        assert_eq!(published, 2);
    }

    #[tokio::test]
    async fn test_stalled_stream_fails_after_chunk_timeout() {
        let mut session = InsightSession::with_chunk_timeout(Duration::from_millis(50));
        let cancel = CancellationToken::new();

        let err = session
            .run(&SilentModel, &request(), &cancel, |_, _| true)
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Stalled(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Requested.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
    }
}
