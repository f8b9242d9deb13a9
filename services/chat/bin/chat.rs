//! Main Entrypoint for the DocuChat Terminal Client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Initializing logging (to stderr, so the transcript on stdout stays readable).
//! 3. Starting the chat session against the configured service.
//! 4. Turning typed lines into messages and uploads, and printing the transcript.
//! 5. Closing the connection normally on `/quit`, end of input, or `Ctrl+C`.

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use docuchat_chat::{
    config::Config,
    input::ChatInput,
    runtime::spawn_session,
    upload::HttpUploader,
};
use docuchat_core::{Author, ChatEntry, ConnectionState, DeliveryState, SessionSnapshot};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chat", version, about = "Chat with your documents from the terminal")]
struct Args {
    /// WebSocket endpoint of the chat service (overrides CHAT_WS_URL)
    #[arg(long)]
    ws_url: Option<String>,

    /// Document upload endpoint (overrides UPLOAD_URL)
    #[arg(long)]
    upload_url: Option<String>,
}

/// Listens for the `Ctrl+C` signal to end the session gracefully.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler.");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Prints whatever changed since the last snapshot.
#[derive(Default)]
struct Transcript {
    printed: usize,
    composing: bool,
    connection: ConnectionState,
    upload_status: String,
}

impl Transcript {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        if snapshot.connection != self.connection {
            match snapshot.connection {
                ConnectionState::Open => println!("-- connected --"),
                ConnectionState::Disconnected if self.connection == ConnectionState::Open => {
                    println!("-- connection lost, reconnecting --")
                }
                _ => {}
            }
            self.connection = snapshot.connection;
        }

        for entry in snapshot.entries.iter().skip(self.printed) {
            print_entry(entry);
        }
        self.printed = snapshot.entries.len();

        if snapshot.bot_composing && !self.composing {
            println!("ChatBot is typing...");
        }
        self.composing = snapshot.bot_composing;

        if snapshot.upload_status != self.upload_status {
            if !snapshot.upload_status.is_empty() {
                match &snapshot.selected_file {
                    Some(name) => println!("[upload: {}] {}", name, snapshot.upload_status),
                    None => println!("[upload] {}", snapshot.upload_status),
                }
            }
            self.upload_status = snapshot.upload_status.clone();
        }
    }
}

fn print_entry(entry: &ChatEntry) {
    let time = entry.timestamp.with_timezone(&Local).format("%H:%M");
    match entry.author {
        Author::User => {
            let marker = match entry.delivery {
                Some(DeliveryState::Pending) => " (queued)",
                Some(DeliveryState::Failed) => " (not sent)",
                _ => "",
            };
            println!("[{time}] You: {}{marker}", entry.text);
        }
        Author::Bot => {
            println!("[{time}] ChatBot: {}", entry.text);
            if !entry.sources.is_empty() {
                println!("        sources: {}", entry.sources.join(", "));
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(url) = args.ws_url {
        config.ws_url = url;
    }
    if let Some(url) = args.upload_url {
        config.upload_url = url;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(
        ws_url = %config.ws_url,
        upload_url = %config.upload_url,
        reconnect = ?config.reconnect,
        "Configuration loaded. Starting chat session..."
    );

    // --- 3. Start Session ---
    let uploader = Arc::new(HttpUploader::new(config.upload_url.clone()));
    let session = spawn_session(&config, uploader);
    let mut snapshots = session.subscribe();
    let mut transcript = Transcript::default();
    transcript.render(&snapshots.borrow_and_update());
    println!("Type a question, `/upload <path>...` to add documents, or `/quit` to leave.");

    // --- 4. Input Loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                transcript.render(&snapshot);
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match ChatInput::parse(&line) {
                    ChatInput::Message(text) => session.send_message(text).await?,
                    ChatInput::Upload(files) => {
                        session.select_files(files).await?;
                        session.upload().await?;
                    }
                    ChatInput::Quit => break,
                    ChatInput::Ignored(Some(hint)) => println!("{hint}"),
                    ChatInput::Ignored(None) => {}
                }
            },
        }
    }

    // --- 5. Shut Down ---
    session.shutdown().await?;
    info!("Chat client has shut down.");
    Ok(())
}
