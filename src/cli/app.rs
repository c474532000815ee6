//! The commands of the tool, as operations over a [`ConfigStore`] and an [`Inception`]
//! client.  The binary parses arguments and owns the terminal; everything else lives here.

use crate::auth::{BrowserDriver, LoginOptions, browser_login};
use crate::cli::commands::DEFAULT_GREETING;
use crate::cli::config::{CliArgs, CliConfig, ConfigStore, StoredConfig};
use crate::cli::render::{Renderer, chat_table};
use crate::cli::session::ChatSession;
use crate::client::DEFAULT_BASE_URL;
use crate::error::{Error, Result};
use crate::types::{Chat, chat_summaries, listing_contains};
use crate::Inception;

/// Pages searched when checking that a chat exists.
const MAX_PAGES: u32 = 100;

/// State shared by every command of one run.
#[derive(Debug)]
pub struct App {
    store: ConfigStore,
    stored: StoredConfig,
    config: CliConfig,
}

impl App {
    /// Load the stored config and combine it with `args`.
    pub fn new(store: ConfigStore, args: CliArgs) -> Result<Self> {
        let stored = store.load()?;
        let config = CliConfig::resolve(args, &stored);
        Ok(Self {
            store,
            stored,
            config,
        })
    }

    /// Settings in effect.
    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    /// The config store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// A client for the stored credentials.
    pub fn client(&self) -> Result<Inception> {
        self.config.client(&self.stored)
    }

    fn remember_base_url(&mut self) {
        if self.config.base_url != DEFAULT_BASE_URL {
            self.stored.base_url = Some(self.config.base_url.clone());
        }
    }

    /// Verify an API key against the service and save it.
    pub async fn login_with_key(&mut self, key: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let candidate = StoredConfig {
            api_key: Some(key.trim().to_string()),
            headers: None,
            ..self.stored.clone()
        };
        self.config.client(&candidate)?.list_chats(1).await?;
        self.stored = candidate;
        self.remember_base_url();
        self.store.save(&self.stored)?;
        renderer.print_info(&format!(
            "Logged in; credentials saved to {}",
            self.store.dir().display()
        ));
        Ok(())
    }

    /// Log in through `driver`, verify the captured headers, and save them.
    pub async fn login_with_browser<D: BrowserDriver>(
        &mut self,
        driver: D,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        let options =
            LoginOptions::new(self.config.base_url.clone()).with_timeout(self.config.login_timeout);
        renderer.print_info(&format!(
            "Complete the login in the browser window (waiting up to {} seconds)...",
            options.timeout.as_secs()
        ));
        let headers = browser_login(driver, options).login().await?;
        let candidate = StoredConfig {
            api_key: None,
            headers: Some(headers.to_pairs()),
            ..self.stored.clone()
        };
        self.config.client(&candidate)?.list_chats(1).await?;
        self.stored = candidate;
        self.remember_base_url();
        self.store.save(&self.stored)?;
        renderer.print_info(&format!(
            "Logged in; session saved to {}",
            self.store.dir().display()
        ));
        Ok(())
    }

    /// Remove saved credentials.
    pub fn logout(&mut self, renderer: &mut dyn Renderer) -> Result<()> {
        if self.stored.clear_credentials() {
            self.store.save(&self.stored)?;
            renderer.print_info("Logged out.");
        } else {
            renderer.print_info("Not logged in.");
        }
        Ok(())
    }

    /// Report whether saved credentials exist and whether the service accepts them.
    pub async fn status(&self, renderer: &mut dyn Renderer) -> Result<()> {
        let kind = if self.stored.headers.is_some() {
            "browser session"
        } else if self.stored.api_key.is_some() {
            "API key"
        } else if std::env::var(crate::client::API_KEY_ENV).is_ok() {
            "API key from the environment"
        } else {
            renderer.print_info("Not logged in.");
            return Ok(());
        };
        match self.client()?.list_chats(1).await {
            Ok(_) => renderer.print_info(&format!(
                "Logged in to {} ({kind}).",
                self.config.base_url
            )),
            Err(err) if err.is_authentication() => renderer.print_info(&format!(
                "Saved {kind} was rejected by {}; run `auth login` again.",
                self.config.base_url
            )),
            Err(err) => return Err(err),
        }
        if let Some(id) = self.store.default_chat()? {
            renderer.print_info(&format!("Default chat: {id}"));
        }
        Ok(())
    }

    /// Print one page of chats.
    pub async fn list_chats(&self, page: u32, renderer: &mut dyn Renderer) -> Result<()> {
        let listing = self.client()?.list_chats(page).await?;
        let chats = chat_summaries(&listing);
        if chats.is_empty() {
            renderer.print_info(&format!("No chats on page {page}."));
            return Ok(());
        }
        let default = self.store.default_chat()?;
        let table = chat_table(&chats, default.as_deref(), renderer.use_color());
        renderer.print_text(&table);
        Ok(())
    }

    /// Create a chat whose first message is `text`.
    pub async fn new_chat(&self, text: &str, renderer: &mut dyn Renderer) -> Result<Chat> {
        let chat = self
            .client()?
            .create_chat(text, &self.config.model)
            .await?;
        renderer.print_info(&format!("Created chat {} ({})", chat.id, chat.title));
        Ok(chat)
    }

    /// Delete a chat, forgetting it as the default if it was.
    pub async fn delete_chat(&self, id: &str, renderer: &mut dyn Renderer) -> Result<()> {
        self.client()?.delete_chat(id).await?;
        renderer.print_info(&format!("Deleted chat {id}"));
        if self.store.default_chat()?.as_deref() == Some(id) {
            self.store.clear_default_chat()?;
            renderer.print_info("It was the default chat; no default is set now.");
        }
        Ok(())
    }

    /// Make `id` the default chat, after checking the service lists it.
    pub async fn set_default(&self, id: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let client = self.client()?;
        let mut found = false;
        for page in 1..=MAX_PAGES {
            let listing = client.list_chats(page).await?;
            if listing_contains(&listing, id) {
                found = true;
                break;
            }
            if chat_summaries(&listing).is_empty() {
                break;
            }
        }
        if !found {
            return Err(Error::validation(
                format!("no chat with id {id}"),
                Some("id".to_string()),
            ));
        }
        self.store.set_default_chat(id)?;
        renderer.print_info(&format!("Default chat set to {id}"));
        Ok(())
    }

    /// The default chat id, creating and saving a chat if none is set.
    pub async fn default_chat_or_create(&self, renderer: &mut dyn Renderer) -> Result<String> {
        if let Some(id) = self.store.default_chat()? {
            return Ok(id);
        }
        let chat = self.new_chat(DEFAULT_GREETING, renderer).await?;
        self.store.set_default_chat(&chat.id)?;
        renderer.print_info(&format!("Default chat set to {}", chat.id));
        Ok(chat.id)
    }

    /// A session against `chat_id` with the configured model.
    pub fn session(&self, chat_id: &str) -> Result<ChatSession> {
        Ok(ChatSession::new(self.client()?, chat_id, &self.config.model))
    }

    /// Send one message to the default chat, printing the response as it streams.
    ///
    /// Unlike `chat`, this never creates a chat; a default must already be set.
    pub async fn input(&self, message: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let Some(chat_id) = self.store.default_chat()? else {
            return Err(Error::validation(
                "no default chat set; run `inception-api chats set-default ID` first",
                Some("default_chat".to_string()),
            ));
        };
        let mut session = self.session(&chat_id)?;
        session.send_streaming(message, renderer).await?;
        Ok(())
    }
}
