//! Log in through a local Chrome/Chromium window and use the captured session.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example browser_login
//! INCEPTION_CHROME=/path/to/chromium cargo run --example browser_login
//! ```

use std::time::Duration;

use inception::{
    ChromeDriver, DEFAULT_BASE_URL, Inception, LoginOptions, Result, browser_login,
    chat_summaries,
};

#[tokio::main]
async fn main() -> Result<()> {
    let options = LoginOptions::new(DEFAULT_BASE_URL).with_timeout(Duration::from_secs(120));
    println!("Log in within {} seconds...", options.timeout.as_secs());

    let login = browser_login(ChromeDriver::new(None), options);
    let client = Inception::from_provider(&login, None).await?;

    let listing = client.list_chats(1).await?;
    let chats = chat_summaries(&listing);
    println!("Logged in; {} chat(s) on the first page", chats.len());
    for chat in chats {
        println!("  {}  {}", chat.id, chat.title);
    }
    Ok(())
}
