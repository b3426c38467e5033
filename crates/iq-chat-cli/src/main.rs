//! iq-chat CLI - line-oriented chat against an agent runtime.
//!
//! This is the entry point for the `iq-chat` binary. It drives a session
//! against the in-process scripted runtime and prints the transcript as it
//! streams.
//!
//! Commands:
//!   /extras N   toggle and show reasoning, observations and metadata of message N
//!   /history    reprint the conversation
//!   /quit       close the session and exit

mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use iq_chat_session::{ChatSession, ScriptedRuntime, SessionConfig, SessionError, Snapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use render::{format_extras, write_history, Transcript};

/// iq-chat CLI - chat with an agent runtime.
#[derive(Parser, Debug)]
#[command(name = "iq-chat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON session configuration.
    #[arg(long, env = "IQ_CHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Conversation thread to open (overrides the config file).
    #[arg(long, env = "IQ_CHAT_THREAD")]
    thread: Option<String>,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("iq_chat=debug,iq_chat_session=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SessionConfig::default(),
    };
    if let Some(thread) = args.thread {
        config.thread_id = thread;
    }

    let runtime = Arc::new(ScriptedRuntime::new());
    let mut session = ChatSession::open(runtime, config)
        .await
        .context("Failed to open chat session")?;

    let printer = tokio::spawn(print_transcript(session.view()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "/quit" => break,
            "/history" => print_history(&session.messages()),
            _ if line.starts_with("/extras") => toggle_extras(&mut session, line),
            _ => match session.send(line).await {
                Ok(_) | Err(SessionError::EmptyQuery) => {}
                Err(e) => eprintln!("{e}"),
            },
        }
    }

    session.close();
    drop(session);
    printer.await?;

    Ok(())
}

/// Load a session configuration from a JSON file.
fn load_config(path: &Path) -> anyhow::Result<SessionConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

/// Print snapshots until the session is dropped.
async fn print_transcript(mut view: watch::Receiver<Snapshot>) {
    let mut transcript = Transcript::default();
    loop {
        let snapshot = Arc::clone(&view.borrow_and_update());
        if let Err(e) = transcript.update(&snapshot, &mut std::io::stdout()) {
            tracing::warn!(error = %e, "Failed to write transcript");
            return;
        }
        if view.changed().await.is_err() {
            return;
        }
    }
}

fn print_history(messages: &Snapshot) {
    if let Err(e) = write_history(messages, &mut std::io::stdout().lock()) {
        tracing::warn!(error = %e, "Failed to write history");
    }
}

fn toggle_extras<R>(session: &mut ChatSession<R>, line: &str)
where
    R: iq_chat_session::AgentRuntime + ?Sized,
{
    let Some(index) = line
        .split_whitespace()
        .nth(1)
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1))
    else {
        eprintln!("usage: /extras N");
        return;
    };

    let messages = session.messages();
    let Some(message) = messages.get(index) else {
        eprintln!("no message {}", index + 1);
        return;
    };

    session.toggle_extras(message.id);
    if message.extras_open {
        println!("(extras hidden)");
    } else if let Some(extras) = &message.extras {
        println!("{}", format_extras(extras));
    } else {
        println!("(no extras)");
    }
}
