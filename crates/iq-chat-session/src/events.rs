//! Push-channel event types.
//!
//! The agent runtime exposes two independent channels: observations
//! (intermediate reasoning) and the token stream (response text, metadata,
//! end of turn, errors). Each channel carries a closed event type, and the
//! turn controller consumes both through [`ChannelEvent`].
//!
//! # Wire format
//!
//! ```json
//! {"sessionId": "thread-1", "turnId": "…", "type": "TOKEN", "subtype": "LLM_RESPONSE", "data": "Hel"}
//! {"sessionId": "thread-1", "type": "METADATA", "data": {"inputTokens": 12}}
//! {"sessionId": "thread-1", "type": "END"}
//! {"sessionId": "thread-1", "type": "ERROR", "data": "model unavailable"}
//! ```

use iq_chat_core::{LlmMetadata, MessageId, Observation, SessionId};
use serde::{Deserialize, Serialize};

/// Event delivered on the observation channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationEvent {
    /// Session the observation belongs to.
    pub session_id: SessionId,
    /// Turn correlator, when the runtime echoes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<MessageId>,
    /// The observation itself.
    #[serde(flatten)]
    pub observation: Observation,
}

/// Event delivered on the token stream channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// Turn correlator, when the runtime echoes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<MessageId>,
    /// What happened.
    #[serde(flatten)]
    pub kind: StreamEventKind,
}

/// Token stream event variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamEventKind {
    /// A text fragment.
    Token {
        /// Which phase of the agent produced the fragment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<TokenSubtype>,
        /// The fragment.
        data: String,
    },
    /// Model metadata for the current call.
    Metadata {
        /// The metadata snapshot.
        data: LlmMetadata,
    },
    /// The stream for the turn ended.
    End,
    /// The stream failed.
    Error {
        /// Human-readable description.
        data: String,
    },
}

/// Origin of a streamed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenSubtype {
    /// Hidden thinking of a plain call.
    LlmThinking,
    /// Response text of a plain call.
    LlmResponse,
    /// Hidden thinking during planning.
    AgentThoughtLlmThinking,
    /// Planning output.
    AgentThoughtLlmResponse,
    /// Hidden thinking during synthesis.
    FinalSynthesisLlmThinking,
    /// Final answer text.
    FinalSynthesisLlmResponse,
}

impl TokenSubtype {
    /// Whether tokens of this subtype belong in the displayed answer.
    #[must_use]
    pub const fn is_response(self) -> bool {
        matches!(self, Self::LlmResponse | Self::FinalSynthesisLlmResponse)
    }
}

/// An event from either channel, as submitted to the turn controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// From the observation channel.
    Observation(ObservationEvent),
    /// From the token stream channel.
    Stream(StreamEvent),
}

impl ChannelEvent {
    /// Session the event belongs to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Observation(event) => &event.session_id,
            Self::Stream(event) => &event.session_id,
        }
    }

    /// Turn correlator carried by the event, if any.
    #[must_use]
    pub fn turn_id(&self) -> Option<MessageId> {
        match self {
            Self::Observation(event) => event.turn_id,
            Self::Stream(event) => event.turn_id,
        }
    }
}

impl From<ObservationEvent> for ChannelEvent {
    fn from(event: ObservationEvent) -> Self {
        Self::Observation(event)
    }
}

impl From<StreamEvent> for ChannelEvent {
    fn from(event: StreamEvent) -> Self {
        Self::Stream(event)
    }
}
