//! Ordered, append-only message list.
//!
//! The ledger hands out [`Snapshot`]s: shared, immutable views of the message
//! list. Mutations copy the list when a snapshot is still held, so a consumer
//! never observes a change in the middle of rendering.

use std::sync::Arc;

use iq_chat_core::{Message, MessageId};

/// Immutable view of the ledger at one point in time.
pub type Snapshot = Arc<Vec<Message>>;

/// The session's messages in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    messages: Snapshot,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger seeded with existing messages.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(messages),
        }
    }

    /// Append a message at the end.
    pub fn append(&mut self, message: Message) {
        Arc::make_mut(&mut self.messages).push(message);
    }

    /// Apply `update` to the message with `id`.
    ///
    /// Returns `false` and leaves the ledger untouched when no such message
    /// exists; a patch never creates a message.
    pub fn patch(&mut self, id: MessageId, update: impl FnOnce(&mut Message)) -> bool {
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            return false;
        };
        update(&mut Arc::make_mut(&mut self.messages)[index]);
        true
    }

    /// Look up a message by ID.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Current view of all messages.
    #[must_use]
    pub fn to_list(&self) -> Snapshot {
        Arc::clone(&self.messages)
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the ledger holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
