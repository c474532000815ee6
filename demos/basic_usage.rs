use futures::StreamExt;
use inception::{DEFAULT_MODEL, Inception, Message, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Create a client using the API key from the environment variable INCEPTION_API_KEY
    let client = Inception::new(None)?;

    // A chat must exist before completions can be attached to it
    let prompt = "Write a haiku about the borrow checker.";
    let chat = client.create_chat(prompt, DEFAULT_MODEL).await?;
    println!("Created chat {} ({})", chat.id, chat.title);

    let mut stream = client
        .chat_completion(
            vec![Message::user(prompt)],
            DEFAULT_MODEL,
            None,
            Some(chat.id.clone()),
        )
        .await?;

    println!("Streaming response:");
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                if let Some(text) = chunk.content() {
                    print!("{text}");
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }
    println!();

    client.delete_chat(&chat.id).await?;
    Ok(())
}
