//! Command-line front end for the Inception chat service.
//!
//! # Usage
//!
//! ```bash
//! # Save an API key (prompted for), or log in through a browser
//! inception-api auth login
//! inception-api --browser auth login
//!
//! # Manage chats
//! inception-api chats ls
//! inception-api chats new "Write a haiku about Rust"
//! inception-api chats set-default <ID>
//! inception-api chats delete <ID>
//!
//! # Talk to the default chat
//! inception-api input "sup?"
//! inception-api chat
//! ```
//!
//! Inside `chat`, lines starting with `/` are commands: `/help`, `/clear`, `/model NAME`,
//! `/stats` and `/quit`.  Ctrl+C stops a response mid-stream.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use inception::cli::{
    App, ChatCommand, ChatSession, CliArgs, Command, ConfigStore, PlainTextRenderer, Renderer,
    help_text, parse_command, parse_subcommand, read_secret, usage,
};
use inception::{ChromeDriver, is_known_model};

const USAGE: &str = "inception-api [OPTIONS] COMMAND";

/// Main entry point for the inception-api tool.
#[tokio::main]
async fn main() {
    let (args, free) = CliArgs::from_command_line_relaxed(USAGE);
    let mut renderer = PlainTextRenderer::with_color(!args.no_color);
    let command = match parse_subcommand(&free) {
        Ok(command) => command,
        Err(message) => {
            renderer.print_error(&message);
            eprintln!("{}", usage());
            std::process::exit(2);
        }
    };
    if let Err(err) = run(args, command, &mut renderer).await {
        renderer.print_error(&err.to_string());
        std::process::exit(1);
    }
}

async fn run(
    args: CliArgs,
    command: Command,
    renderer: &mut PlainTextRenderer,
) -> Result<(), Box<dyn std::error::Error>> {
    if command == Command::Help {
        println!("{}", usage());
        return Ok(());
    }
    let mut app = App::new(ConfigStore::from_env()?, args)?;
    match command {
        Command::Help => {}
        Command::Login => {
            if app.config().browser {
                let driver = ChromeDriver::new(app.config().chrome.clone());
                app.login_with_browser(driver, renderer).await?;
            } else {
                let key = read_secret("Inception API key: ")?;
                app.login_with_key(&key, renderer).await?;
            }
        }
        Command::Logout => app.logout(renderer)?,
        Command::Status => app.status(renderer).await?,
        Command::ListChats { page } => app.list_chats(page, renderer).await?,
        Command::NewChat { text } => {
            app.new_chat(&text, renderer).await?;
        }
        Command::DeleteChat { id } => app.delete_chat(&id, renderer).await?,
        Command::SetDefault { id } => app.set_default(&id, renderer).await?,
        Command::Input { message } => app.input(&message, renderer).await?,
        Command::Chat => chat(&app, renderer).await?,
    }
    Ok(())
}

async fn chat(
    app: &App,
    renderer: &mut PlainTextRenderer,
) -> Result<(), Box<dyn std::error::Error>> {
    let chat_id = app.default_chat_or_create(renderer).await?;
    let mut session = app.session(&chat_id)?;
    let mut rl = DefaultEditor::new()?;
    let history_path = app.store().dir().join("history.txt");
    let _ = rl.load_history(&history_path);

    // Set by Ctrl+C; the session polls it while a response streams.
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed))?;
    let mut renderer =
        PlainTextRenderer::with_color(renderer.use_color()).with_interrupt(Arc::clone(&stop));

    println!("Chatting in {} with {}.", chat_id, session.model());
    println!("/help lists commands; /quit or Ctrl+D leaves.\n");

    loop {
        stop.store(false, Ordering::Relaxed);
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                renderer.print_error(&format!("cannot read input: {err}"));
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        match parse_command(line) {
            Some(ChatCommand::Quit) => break,
            Some(command) => slash_command(command, &mut session, &mut renderer),
            None => {
                if let Err(err) = session.send_streaming(line, &mut renderer).await {
                    renderer.print_error(&err.to_string());
                }
            }
        }
    }

    let _ = save_history(&mut rl, &history_path);
    Ok(())
}

fn slash_command(command: ChatCommand, session: &mut ChatSession, renderer: &mut dyn Renderer) {
    match command {
        ChatCommand::Quit => {}
        ChatCommand::Clear => {
            session.clear();
            renderer.print_info("Local thread cleared; the next message starts fresh.");
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("  {line}");
            }
        }
        ChatCommand::Model(model) => {
            if !is_known_model(&model) {
                renderer.print_info(&format!("{model} is not a model this tool knows about."));
            }
            renderer.print_info(&format!("Now using {model}."));
            session.set_model(model);
        }
        ChatCommand::Stats => print_stats(session),
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
}

fn save_history(rl: &mut DefaultEditor, path: &Path) -> rustyline::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rl.save_history(path)
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("  chat      {}", stats.chat_id);
    println!("  model     {}", stats.model);
    println!("  messages  {}", stats.message_count);
    println!(
        "  requests  {} ({} interrupted, {} chunks)",
        stats.total_requests, stats.interrupted_requests, stats.total_chunks
    );
    println!(
        "  tokens    {} prompt, {} completion",
        stats.usage.prompt_tokens, stats.usage.completion_tokens
    );
}
