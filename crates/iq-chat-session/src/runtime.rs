//! Agent runtime interface.
//!
//! The runtime is an external collaborator: it owns the model, the tools and
//! the conversation store. A session talks to it through [`AgentRuntime`],
//! which exposes two long-lived push channels and one request/response call.

use async_trait::async_trait;
use iq_chat_core::{LlmMetadata, Message, MessageId, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::{ProviderConfig, ThreadConfig};
use crate::error::RuntimeError;
use crate::events::{ObservationEvent, StreamEvent};

/// Trait for agent runtime communication.
///
/// This trait abstracts the runtime interface, allowing for in-process
/// implementations in tests and demos.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Apply the thread configuration and load prior messages.
    ///
    /// Returns at most `history_limit` messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime is unavailable.
    async fn prepare_session(
        &self,
        session_id: &SessionId,
        config: &ThreadConfig,
        history_limit: usize,
    ) -> Result<Vec<Message>, RuntimeError>;

    /// Subscribe to the observation channel.
    fn subscribe_observations(&self) -> broadcast::Receiver<ObservationEvent>;

    /// Subscribe to the token stream channel.
    fn subscribe_tokens(&self) -> broadcast::Receiver<StreamEvent>;

    /// Process a query and resolve with the final answer.
    ///
    /// # Errors
    ///
    /// Returns an error if processing fails.
    async fn start_call(&self, request: CallRequest) -> Result<CallResponse, RuntimeError>;
}

/// A query plus the correlators the runtime echoes on its channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// The user's query.
    pub query: String,
    /// Thread the query belongs to.
    pub session_id: SessionId,
    /// ID of the placeholder AI message, i.e. the turn.
    pub turn_id: MessageId,
    /// Caller identity.
    pub user_id: String,
    /// Provider and model.
    pub provider: ProviderConfig,
    /// System prompt override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Whether tokens should be streamed.
    pub stream: bool,
}

/// Final answer of a runtime call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// The answer.
    pub response: CallOutput,
    /// Metadata of the call, if reported.
    #[serde(default)]
    pub metadata: Option<LlmMetadata>,
}

impl CallResponse {
    /// Plain-text response without metadata.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            response: CallOutput::Text(text.into()),
            metadata: None,
        }
    }

    /// Attach call metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: LlmMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Shape of a call's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallOutput {
    /// Plain text.
    Text(String),
    /// A structured message; its `content` field holds the text.
    Structured(serde_json::Value),
}

impl CallOutput {
    /// Extract displayable text, if the output carries any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(value) => value.get("content").and_then(|v| v.as_str()),
        }
    }
}
