//! Plain-text transcript rendering.
//!
//! Session snapshots are rendered incrementally: finished messages are
//! printed once, and the in-flight AI message is printed as it grows.

use std::io::{self, Write};

use iq_chat_core::{Message, Role, TurnExtras, PLACEHOLDER_CONTENT};
use iq_chat_session::CURSOR_MARKER;

/// Incremental printer for session snapshots.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Messages fully printed so far.
    printed: usize,
    /// Text already printed for the in-flight message.
    partial: String,
}

impl Transcript {
    /// Print whatever changed since the last call.
    pub fn update(&mut self, snapshot: &[Message], out: &mut impl Write) -> io::Result<()> {
        for message in snapshot.iter().skip(self.printed) {
            if message.streaming {
                self.print_partial(message, out)?;
                break;
            }

            if self.partial.is_empty() {
                write!(out, "{}{}", prefix(message.role), message.content)?;
            } else if let Some(rest) = message.content.strip_prefix(self.partial.as_str()) {
                write!(out, "{rest}")?;
            } else {
                // Final content replaced the streamed text (e.g. a stream error).
                write!(out, "\n{}{}", prefix(message.role), message.content)?;
            }
            writeln!(out)?;

            self.printed += 1;
            self.partial.clear();
        }
        out.flush()
    }

    fn print_partial(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        let visible = visible_content(message);
        if visible.is_empty() {
            return Ok(());
        }
        if self.partial.is_empty() {
            write!(out, "{}", prefix(message.role))?;
        }
        if let Some(delta) = visible.strip_prefix(self.partial.as_str()) {
            write!(out, "{delta}")?;
            self.partial = visible.to_string();
        }
        Ok(())
    }
}

fn prefix(role: Role) -> &'static str {
    match role {
        Role::User => "you> ",
        Role::Ai => "assistant> ",
    }
}

fn visible_content(message: &Message) -> &str {
    if message.content == PLACEHOLDER_CONTENT {
        return "";
    }
    message
        .content
        .strip_suffix(CURSOR_MARKER)
        .unwrap_or(&message.content)
}

/// Write the numbered conversation.
pub fn write_history(messages: &[Message], out: &mut impl Write) -> io::Result<()> {
    for (index, message) in messages.iter().enumerate() {
        writeln!(out, "{:>3} {:?}: {}", index + 1, message.role, message.content)?;
    }
    out.flush()
}

/// Format the extras panel of a message.
#[must_use]
pub fn format_extras(extras: &TurnExtras) -> String {
    let mut lines = Vec::new();

    if !extras.reasoning_text.is_empty() {
        lines.push("reasoning:".to_string());
        lines.extend(extras.reasoning_text.lines().map(|l| format!("  {l}")));
    }

    if !extras.observations.is_empty() {
        lines.push("observations:".to_string());
        for obs in &extras.observations {
            lines.push(format!(
                "  [{}] {:?} {}",
                obs.timestamp.format("%H:%M:%S"),
                obs.kind,
                obs.title
            ));
        }
    }

    if let Some(meta) = &extras.metadata {
        let mut parts = Vec::new();
        if let Some(n) = meta.input_tokens {
            parts.push(format!("in={n}"));
        }
        if let Some(n) = meta.output_tokens {
            parts.push(format!("out={n}"));
        }
        if let Some(n) = meta.thinking_tokens {
            parts.push(format!("thinking={n}"));
        }
        if let Some(ms) = meta.total_generation_time_ms {
            parts.push(format!("{ms}ms"));
        }
        if let Some(reason) = &meta.stop_reason {
            parts.push(format!("stop={reason}"));
        }
        lines.push(format!("metadata: {}", parts.join(" ")));
    }

    if lines.is_empty() {
        "(no extras)".to_string()
    } else {
        lines.join("\n")
    }
}
