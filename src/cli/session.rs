//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which keeps the local conversation for one
//! chat and streams completions into a [`Renderer`].

use std::time::Duration;

use futures::StreamExt;

use crate::accumulating_stream::{AccumulatingStream, Completion};
use crate::cli::render::Renderer;
use crate::error::{Error, Result};
use crate::types::{ChatHistory, CompletionChunk, Message, Usage};
use crate::utils::ids::new_session_id;
use crate::Inception;

/// How often a stalled stream checks for an interrupt.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// A chat session that manages conversation state and streaming.
///
/// History is recorded only for turns that produced a response; a failed turn leaves the
/// conversation as it was.
pub struct ChatSession {
    client: Inception,
    chat_id: String,
    session_id: String,
    model: String,
    history: Option<ChatHistory>,
    usage_totals: Usage,
    request_count: u64,
    chunk_count: u64,
    interrupted_count: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: String,
    /// The chat the session talks to.
    pub chat_id: String,
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Total number of completion requests made.
    pub total_requests: u64,
    /// Total number of chunks received.
    pub total_chunks: u64,
    /// Requests the user interrupted.
    pub interrupted_requests: u64,
    /// Token usage reported by the service.
    pub usage: Usage,
}

enum Step {
    Next(Option<Result<CompletionChunk>>),
    Interrupted,
}

impl ChatSession {
    /// Creates a new chat session against the chat `chat_id`.
    pub fn new(client: Inception, chat_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
            session_id: new_session_id(),
            model: model.into(),
            history: None,
            usage_totals: Usage::default(),
            request_count: 0,
            chunk_count: 0,
            interrupted_count: 0,
        }
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Sends the conversation so far plus `user_input` as a streaming request
    /// 2. Renders content deltas as they arrive
    /// 3. Records the user message and the response in the history
    ///
    /// If the renderer reports an interrupt, the stream is dropped (closing its connection)
    /// and whatever text arrived is kept as the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the stream yields an error.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<Completion> {
        let user = Message::user(user_input).with_models(vec![self.model.clone()]);
        let mut messages: Vec<Message> = self
            .history
            .as_ref()
            .map(|h| h.thread().into_iter().cloned().collect())
            .unwrap_or_default();
        messages.push(user.clone());

        self.request_count += 1;
        let stream = self
            .client
            .chat_completion(
                messages,
                &self.model,
                Some(self.session_id.clone()),
                Some(self.chat_id.clone()),
            )
            .await?;
        let (mut stream, rx) = AccumulatingStream::new(stream);

        loop {
            match Self::next_step(&mut stream, renderer).await {
                Step::Next(Some(Ok(chunk))) => {
                    self.chunk_count += 1;
                    if let Some(text) = chunk.content() {
                        renderer.print_text(text);
                    }
                }
                Step::Next(Some(Err(err))) => {
                    renderer.finish_response();
                    return Err(err);
                }
                Step::Next(None) => break,
                Step::Interrupted => {
                    let partial = stream.finalize_partial();
                    drop(stream);
                    self.interrupted_count += 1;
                    renderer.print_interrupted();
                    if !partial.content.is_empty() {
                        self.record(user, &partial)?;
                    }
                    return Ok(partial);
                }
            }
        }
        renderer.finish_response();

        let completion = rx.await.map_err(|_| {
            Error::protocol("the completion stream ended without a result", None, None)
        })??;
        self.record(user, &completion)?;
        Ok(completion)
    }

    async fn next_step(stream: &mut AccumulatingStream, renderer: &mut dyn Renderer) -> Step {
        loop {
            if renderer.should_interrupt() {
                return Step::Interrupted;
            }
            tokio::select! {
                next = stream.next() => return Step::Next(next),
                _ = tokio::time::sleep(INTERRUPT_POLL) => {}
            }
        }
    }

    fn record(&mut self, user: Message, completion: &Completion) -> Result<()> {
        if let Some(usage) = completion.usage {
            self.usage_totals += usage;
        }
        let mut reply = completion.clone().into_message();
        if reply.models.is_empty() {
            reply.models = vec![self.model.clone()];
        }
        match &mut self.history {
            Some(history) => {
                history.push(user)?;
            }
            None => self.history = Some(ChatHistory::new(user)),
        }
        if let Some(history) = &mut self.history {
            history.push(reply)?;
        }
        Ok(())
    }

    /// Clears the conversation history.
    pub fn clear(&mut self) {
        self.history = None;
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.history.as_ref().map_or(0, ChatHistory::len)
    }

    /// The conversation, oldest first.
    pub fn thread(&self) -> Vec<&Message> {
        self.history.as_ref().map(ChatHistory::thread).unwrap_or_default()
    }

    /// Changes the model used for responses.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Returns the current model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The chat the session talks to.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Returns statistics for the session.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.model.clone(),
            chat_id: self.chat_id.clone(),
            message_count: self.message_count(),
            total_requests: self.request_count,
            total_chunks: self.chunk_count,
            interrupted_requests: self.interrupted_count,
            usage: self.usage_totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticHeaders;

    fn session() -> ChatSession {
        let headers = StaticHeaders::bearer("k").unwrap();
        let client = Inception::with_headers(headers.header_map().clone()).unwrap();
        ChatSession::new(client, "chat-1", "lambda.mercury-coder-small")
    }

    #[test]
    fn new_session_is_empty() {
        let session = session();
        assert_eq!(session.message_count(), 0);
        assert!(session.thread().is_empty());
        let stats = session.stats();
        assert_eq!(stats.chat_id, "chat-1");
        assert_eq!(stats.model, "lambda.mercury-coder-small");
        assert_eq!(stats.total_requests, 0);
    }

    #[test]
    fn record_builds_a_thread() {
        let mut session = session();
        let first = Completion {
            content: "hello".to_string(),
            usage: Some(Usage::new(3, 2)),
            ..Default::default()
        };
        session.record(Message::user("hi"), &first).unwrap();
        let second = Completion {
            content: "fine".to_string(),
            model: "other-model".to_string(),
            role: Some("assistant".to_string()),
            usage: Some(Usage::new(10, 1)),
            ..Default::default()
        };
        session
            .record(Message::user("how are you"), &second)
            .unwrap();

        let thread: Vec<(&str, &str)> = session
            .thread()
            .into_iter()
            .map(|m| (m.role.as_str(), m.content.as_str()))
            .collect();
        assert_eq!(
            thread,
            vec![
                ("user", "hi"),
                ("assistant", "hello"),
                ("user", "how are you"),
                ("assistant", "fine"),
            ]
        );
        assert_eq!(session.thread()[1].models, vec!["lambda.mercury-coder-small"]);
        assert_eq!(session.thread()[3].models, vec!["other-model"]);
        assert_eq!(session.stats().usage, Usage::new(13, 3));

        session.clear();
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn model_can_change() {
        let mut session = session();
        session.set_model("lambda.mercury-coder-mini");
        assert_eq!(session.model(), "lambda.mercury-coder-mini");
    }
}
