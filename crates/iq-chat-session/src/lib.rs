//! Session reconciliation for agent runtime chat clients.
//!
//! An agent runtime answers a query over three sources that race each other:
//! an observation channel carrying intermediate reasoning, a token channel
//! carrying response text and end-of-stream, and the call's own outcome.
//! This crate merges them into one consistent, append-only conversation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        AgentRuntime                          │
//! │   observations (broadcast)   tokens (broadcast)   start_call │
//! └──────────────────────────────────────────────────────────────┘
//!            │                        │                    │
//!            ▼                        ▼                    │
//!     ┌──────────────┐        ┌──────────────┐            │
//!     │ Subscription │        │ Subscription │            │
//!     └──────────────┘        └──────────────┘            │
//!            └──────────┬─────────────┘                    │
//!                       ▼ select! / drain                  ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ChatSession                          │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ TurnController ── Accumulator ── Ledger ──▶ Snapshot   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ watch
//!                               ▼
//!                          presentation
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use iq_chat_session::{ChatSession, ScriptedRuntime, SessionConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = Arc::new(ScriptedRuntime::new());
//! let mut session = ChatSession::open(runtime, SessionConfig::default()).await?;
//!
//! let turn_id = session.send("What is agentic AI?").await?;
//! let messages = session.messages();
//! let answer = messages.iter().find(|m| m.id == turn_id);
//! println!("{:?}", answer.map(|m| &m.content));
//!
//! session.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Finalization
//!
//! A turn is finalized exactly once. The first of end-of-stream, stream
//! error, call resolution or call rejection wins; the others are no-ops.
//! See the [`controller`] module for the state machine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accumulator;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod ledger;
pub mod runtime;
pub mod scripted;
pub mod session;
pub mod subscription;

pub use accumulator::{Accumulator, REASONING_SEPARATOR};
pub use config::{ProviderConfig, SessionConfig, ThreadConfig};
pub use controller::{
    Outcome, Turn, TurnController, TurnPhase, CURSOR_MARKER, INCOMPLETE_CONTENT,
    UNUSABLE_RESPONSE_CONTENT,
};
pub use error::{Result, RuntimeError, SessionError, StaleReason};
pub use events::{ChannelEvent, ObservationEvent, StreamEvent, StreamEventKind, TokenSubtype};
pub use ledger::{Ledger, Snapshot};
pub use runtime::{AgentRuntime, CallOutput, CallRequest, CallResponse};
pub use scripted::{Script, ScriptedRuntime};
pub use session::ChatSession;
pub use subscription::{ChannelKind, ChannelSubscriptions, Subscription};

// Re-export commonly used types from dependencies for convenience
pub use iq_chat_core::{Message, MessageId, SessionId};
