//! Error types for the session controller.
//!
//! Runtime failures never escape a session as errors: the turn controller
//! converts them into the content of the in-flight AI message. The variants
//! that do reach callers are the rejections of `send`.

use iq_chat_core::{IdError, MessageId};
use thiserror::Error;

/// A result type using `SessionError`.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure reported by the agent runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    /// Human-readable description.
    pub message: String,
}

impl RuntimeError {
    /// Create a runtime error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a channel event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The event belongs to another session.
    ForeignSession,
    /// No turn is open.
    NoOpenTurn,
    /// The event correlates with a turn other than the open one.
    TurnMismatch,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::ForeignSession => "event for another session",
            Self::NoOpenTurn => "no turn is open",
            Self::TurnMismatch => "event for a different turn",
        };
        f.write_str(reason)
    }
}

/// Errors that can occur in a chat session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The agent runtime was unavailable at startup.
    #[error("chat service unavailable: {0}")]
    Initialization(RuntimeError),

    /// The token channel reported an error for the open turn.
    #[error("stream error: {0}")]
    Stream(String),

    /// The runtime call rejected.
    #[error("call failed: {0}")]
    Call(#[from] RuntimeError),

    /// A channel event did not match the open turn.
    #[error("stale event dropped: {0}")]
    StaleEvent(StaleReason),

    /// The query was empty or whitespace.
    #[error("query is empty")]
    EmptyQuery,

    /// A turn is already open for this session.
    #[error("turn {0} is still in flight")]
    TurnInFlight(MessageId),

    /// The session failed to initialize and accepts no turns.
    #[error("session is not ready")]
    NotReady,

    /// The configured session identifier is invalid.
    #[error("invalid session id: {0}")]
    InvalidSessionId(#[from] IdError),
}

impl SessionError {
    /// Text written into a message when this error ends a turn or a startup.
    #[must_use]
    pub fn inline_message(&self) -> String {
        match self {
            Self::Initialization(e) => {
                format!("Error: Could not initialize the chat service. Details: {e}")
            }
            Self::Stream(message) => format!("Stream Error: {message}"),
            Self::Call(e) => format!("Error during processing: {e}"),
            other => format!("System Error: {other}"),
        }
    }
}
