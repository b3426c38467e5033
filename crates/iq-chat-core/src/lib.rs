//! Core types for iq-chat.
//!
//! This crate provides the foundational types shared by the session controller
//! and its front ends:
//!
//! - **Identifiers**: Strongly-typed IDs for sessions and messages
//! - **Messages**: The conversation data model, including per-turn extras
//!
//! # Example
//!
//! ```
//! use iq_chat_core::{Message, MessageId, SessionId};
//!
//! let session_id: SessionId = "iq-support-chat".parse().unwrap();
//! let message = Message::user(session_id, "What do you build?");
//!
//! assert!(message.is_user());
//! assert_ne!(message.id, MessageId::generate());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod message;

pub use ids::{IdError, MessageId, SessionId};
pub use message::{
    LlmMetadata, Message, Observation, ObservationKind, Role, TurnExtras, PLACEHOLDER_CONTENT,
};
