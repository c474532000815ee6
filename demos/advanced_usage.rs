//! A multi-turn conversation with a logger attached and a bound on each streamed chunk.
//!
//! # Usage
//!
//! ```bash
//! INCEPTION_API_KEY=... cargo run --example advanced_usage
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use inception::{
    AccumulatingStream, Chat, ClientLogger, CompletionChunk, DEFAULT_MODEL, Inception, Message,
    Result, chat_summaries,
};
use serde_json::Value;

/// Counts what passes through the client.
#[derive(Default)]
struct CountingLogger {
    chunks: AtomicUsize,
}

impl ClientLogger for CountingLogger {
    fn log_chat(&self, chat: &Chat) {
        eprintln!("[created {} with {} message(s)]", chat.id, chat.messages.len());
    }

    fn log_listing(&self, listing: &Value) {
        eprintln!("[listed {} chat(s)]", chat_summaries(listing).len());
    }

    fn log_chunk(&self, _: &CompletionChunk) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let logger = Arc::new(CountingLogger::default());
    let client = Inception::new(None)?
        .with_chunk_timeout(Some(Duration::from_secs(30)))
        .with_logger(logger.clone());

    let questions = [
        "Name a sorting algorithm that is stable.",
        "What is its worst-case running time?",
    ];
    let chat = client.create_chat(questions[0], DEFAULT_MODEL).await?;
    let session_id = inception::utils::ids::new_session_id();

    let mut thread: Vec<Message> = Vec::new();
    for question in questions {
        println!("You: {question}");
        thread.push(Message::user(question));
        let stream = client
            .chat_completion(
                thread.clone(),
                DEFAULT_MODEL,
                Some(session_id.clone()),
                Some(chat.id.clone()),
            )
            .await?;

        // The accumulated completion arrives on `rx` once the stream is drained
        let (mut stream, rx) = AccumulatingStream::new(stream);
        print!("Mercury: ");
        while let Some(chunk) = stream.next().await {
            if let Some(text) = chunk?.content() {
                print!("{text}");
            }
        }
        println!();

        let completion = rx.await.map_err(|_| {
            inception::Error::protocol("stream ended without a completion", None, None)
        })??;
        if let Some(usage) = completion.usage {
            println!(
                "  ({} prompt / {} completion tokens)",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        thread.push(completion.into_message());
    }

    let listing = client.list_chats(1).await?;
    for summary in chat_summaries(&listing) {
        println!("{}  {}", summary.id, summary.title);
    }
    println!("{} chunks streamed", logger.chunks.load(Ordering::Relaxed));

    client.delete_chat(&chat.id).await?;
    Ok(())
}
