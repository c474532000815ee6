//! Accumulates streamed chunks into a complete response while passing chunks through.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

use crate::{CompletionChunk, Error, FinishReason, Message, ROLE_ASSISTANT, Usage};

/// A finished (or abandoned) completion, assembled from its chunks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Id shared by the chunks.
    pub id: String,
    /// Model that produced the chunks.
    pub model: String,
    /// Role announced by the first delta that carried one.
    pub role: Option<String>,
    /// Concatenated content deltas.
    pub content: String,
    /// Last finish reason seen.
    pub finish_reason: Option<FinishReason>,
    /// Usage, when the service reported it.
    pub usage: Option<Usage>,
    /// Number of chunks consumed.
    pub chunks: usize,
}

impl Completion {
    fn absorb(&mut self, chunk: &CompletionChunk) {
        if self.chunks == 0 {
            self.id = chunk.id.clone();
            self.model = chunk.model.clone();
        }
        self.chunks += 1;
        if self.role.is_none()
            && let Some(role) = chunk.role()
        {
            self.role = Some(role.to_string());
        }
        if let Some(content) = chunk.content() {
            self.content.push_str(content);
        }
        if let Some(reason) = chunk.finish_reason() {
            self.finish_reason = Some(reason.clone());
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
    }

    /// The completion as a message, tagged with its model, ready to extend a history.
    pub fn into_message(self) -> Message {
        let role = self.role.unwrap_or_else(|| ROLE_ASSISTANT.to_string());
        let models = if self.model.is_empty() {
            vec![]
        } else {
            vec![self.model]
        };
        Message::new(role, self.content).with_models(models)
    }
}

/// A stream wrapper that accumulates `CompletionChunk`s into a [`Completion`].
///
/// This allows printing content to the user while simultaneously building the final
/// response without buffering.  When the stream is fully drained, the accumulated
/// completion is sent via the oneshot channel returned by `new()`; if the stream yields an
/// error, the error is sent instead.
pub struct AccumulatingStream {
    inner: Pin<Box<dyn Stream<Item = Result<CompletionChunk, Error>> + Send>>,
    completion_tx: Option<tokio::sync::oneshot::Sender<Result<Completion, Error>>>,
    completion: Completion,
}

impl AccumulatingStream {
    /// Wraps a chunk stream to accumulate chunks into a `Completion`.
    ///
    /// Returns the stream and a receiver that will contain the accumulated `Completion` once
    /// the stream is fully drained.
    pub fn new<S>(stream: S) -> (Self, tokio::sync::oneshot::Receiver<Result<Completion, Error>>)
    where
        S: Stream<Item = Result<CompletionChunk, Error>> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let this = Self {
            inner: Box::pin(stream),
            completion_tx: Some(tx),
            completion: Completion::default(),
        };
        (this, rx)
    }

    /// The completion as accumulated so far, without draining the stream.
    ///
    /// Used when the consumer abandons the stream early.  The receiver is closed.
    pub fn finalize_partial(&mut self) -> Completion {
        self.completion_tx.take();
        std::mem::take(&mut self.completion)
    }
}

impl Stream for AccumulatingStream {
    type Item = Result<CompletionChunk, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.completion.absorb(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let Some(tx) = self.completion_tx.take() {
                    let _ = tx.send(Err(e.clone()));
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(tx) = self.completion_tx.take() {
                    let completion = std::mem::take(&mut self.completion);
                    let _ = tx.send(Ok(completion));
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Drain a chunk stream, concatenating its content deltas.
///
/// Stops at the first error.
///
/// ```
/// use futures::stream;
/// use inception::{collect_text, decode_chunk};
///
/// # tokio_test::block_on(async {
/// let chunk = |text: &str| {
///     decode_chunk(&format!(
///         r#"{{"id":"c","object":"chat.completion.chunk","created":0,"model":"m",
///             "choices":[{{"index":0,"delta":{{"content":"{text}"}}}}]}}"#
///     ))
/// };
/// let stream = stream::iter([chunk("Hello"), chunk(", world")]);
/// assert_eq!(collect_text(stream).await.unwrap(), "Hello, world");
/// # });
/// ```
pub async fn collect_text<S>(stream: S) -> Result<String, Error>
where
    S: Stream<Item = Result<CompletionChunk, Error>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        if let Some(content) = chunk?.content() {
            text.push_str(content);
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunk(json: &str) -> Result<CompletionChunk, Error> {
        Ok(serde_json::from_str(json).unwrap())
    }

    fn delta(delta: &str, finish: &str) -> Result<CompletionChunk, Error> {
        chunk(&format!(
            r#"{{"id":"c1","object":"chat.completion.chunk","created":1,"model":"m1",
                "choices":[{{"index":0,"delta":{delta},"finish_reason":{finish}}}]}}"#
        ))
    }

    #[tokio::test]
    async fn accumulates_while_passing_through() {
        let chunks = vec![
            delta(r#"{"role":"assistant"}"#, "null"),
            delta(r#"{"content":"Hel"}"#, "null"),
            delta(r#"{"content":"lo"}"#, r#""stop""#),
        ];
        let (mut wrapped, rx) = AccumulatingStream::new(stream::iter(chunks));
        let mut seen = 0;
        while let Some(chunk) = wrapped.next().await {
            chunk.unwrap();
            seen += 1;
        }
        assert_eq!(seen, 3);
        let completion = rx.await.unwrap().unwrap();
        assert_eq!(completion.id, "c1");
        assert_eq!(completion.model, "m1");
        assert_eq!(completion.role.as_deref(), Some("assistant"));
        assert_eq!(completion.content, "Hello");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.chunks, 3);

        let message = completion.into_message();
        assert_eq!(message.role, "assistant");
        assert_eq!(message.content, "Hello");
        assert_eq!(message.models, vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn errors_are_forwarded_to_the_receiver() {
        let chunks = vec![
            delta(r#"{"content":"partial"}"#, "null"),
            Err(Error::protocol("bad", Some("{x".to_string()), None)),
        ];
        let (wrapped, rx) = AccumulatingStream::new(stream::iter(chunks));
        let items: Vec<_> = wrapped.collect().await;
        assert_eq!(items.len(), 2);
        assert!(rx.await.unwrap().unwrap_err().is_protocol());
    }

    #[tokio::test]
    async fn partial_completion_on_abandon() {
        let chunks = vec![
            delta(r#"{"content":"a"}"#, "null"),
            delta(r#"{"content":"b"}"#, "null"),
        ];
        let (mut wrapped, rx) = AccumulatingStream::new(stream::iter(chunks));
        wrapped.next().await.unwrap().unwrap();
        let partial = wrapped.finalize_partial();
        assert_eq!(partial.content, "a");
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn collect_text_concatenates_content() {
        let chunks = vec![
            delta(r#"{"role":"assistant"}"#, "null"),
            delta(r#"{"content":"sup"}"#, "null"),
            delta(r#"{"content":"?"}"#, r#""stop""#),
        ];
        assert_eq!(collect_text(stream::iter(chunks)).await.unwrap(), "sup?");
    }

    #[tokio::test]
    async fn collect_text_stops_at_errors() {
        let chunks = vec![
            delta(r#"{"content":"x"}"#, "null"),
            Err(Error::timeout("slow", Some(1.0))),
        ];
        assert!(collect_text(stream::iter(chunks)).await.unwrap_err().is_timeout());
    }
}
