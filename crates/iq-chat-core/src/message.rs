//! Conversation data model.
//!
//! A session owns an ordered list of [`Message`]s. AI messages that went
//! through an in-flight turn carry [`TurnExtras`]: the reasoning text, the
//! observations and the model metadata collected while the turn was open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId};

/// Content shown in an AI message before its first response token arrives.
pub const PLACEHOLDER_CONTENT: &str = "Thinking...";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Typed by the user.
    User,
    /// Produced by the agent runtime (or by the session on its behalf).
    Ai,
}

/// Category of an intermediate observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationKind {
    /// The agent stated its understanding of the query.
    Intent,
    /// The agent produced a plan.
    Plan,
    /// Free-form reasoning emitted while thinking.
    #[serde(alias = "THOUGHTS", alias = "reasoning")]
    Reasoning,
    /// The agent decided to call tools.
    ToolCall,
    /// A tool ran.
    ToolExecution,
    /// The agent is synthesizing the final answer.
    Synthesis,
    /// The runtime reported a problem.
    Error,
    /// The final response was produced.
    FinalResponse,
    /// Internal state changed.
    StateUpdate,
    /// Any kind this client does not know about.
    #[serde(other)]
    Other,
}

/// An intermediate reasoning event reported by the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Identifier assigned by the runtime.
    pub id: String,
    /// Observation category.
    pub kind: ObservationKind,
    /// Short human-readable title.
    pub title: String,
    /// Opaque structured data or text.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When the runtime produced the observation.
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Return the reasoning text carried by a reasoning observation.
    ///
    /// The text is either the payload itself (when it is a string) or the
    /// payload's `thoughts` field. Other kinds never carry reasoning text.
    #[must_use]
    pub fn reasoning_text(&self) -> Option<&str> {
        if self.kind != ObservationKind::Reasoning {
            return None;
        }
        match &self.payload {
            serde_json::Value::String(text) => Some(text),
            serde_json::Value::Object(map) => map.get("thoughts").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// Metadata reported for a model call.
///
/// Every field is optional; runtimes report whatever they know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmMetadata {
    /// Prompt tokens consumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Completion tokens produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    /// Tokens spent on hidden reasoning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_tokens: Option<u64>,
    /// Latency until the first streamed token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ms: Option<u64>,
    /// Wall time of the whole generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_generation_time_ms: Option<u64>,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Runtime trace identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Per-turn data attached to an AI message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnExtras {
    /// Reasoning segments joined in arrival order.
    pub reasoning_text: String,
    /// Observations in arrival order.
    pub observations: Vec<Observation>,
    /// Latest model metadata.
    pub metadata: Option<LlmMetadata>,
}

/// A single message in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Owning session.
    pub session_id: SessionId,
    /// Author.
    pub role: Role,
    /// Displayed text.
    pub content: String,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Reasoning, observations and metadata of the turn that produced this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<TurnExtras>,
    /// Whether response text is still streaming into `content`.
    #[serde(default)]
    pub streaming: bool,
    /// Whether the presentation layer shows `extras`.
    #[serde(default)]
    pub extras_open: bool,
}

impl Message {
    fn new(session_id: SessionId, role: Role, content: String) -> Self {
        Self {
            id: MessageId::generate(),
            session_id,
            role,
            content,
            timestamp: Utc::now(),
            extras: None,
            streaming: false,
            extras_open: false,
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::User, content.into())
    }

    /// Create a finished AI message.
    #[must_use]
    pub fn ai(session_id: SessionId, content: impl Into<String>) -> Self {
        Self::new(session_id, Role::Ai, content.into())
    }

    /// Create the placeholder AI message that opens a turn.
    #[must_use]
    pub fn placeholder(session_id: SessionId) -> Self {
        let mut message = Self::new(session_id, Role::Ai, PLACEHOLDER_CONTENT.to_string());
        message.streaming = true;
        message.extras = Some(TurnExtras::default());
        message
    }

    /// Check if this is a user message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> SessionId {
        SessionId::new("thread-1").unwrap()
    }

    fn observation(kind: ObservationKind, payload: serde_json::Value) -> Observation {
        Observation {
            id: "obs-1".to_string(),
            kind,
            title: "Thinking".to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn placeholder_message_is_streaming() {
        let msg = Message::placeholder(session());
        assert_eq!(msg.role, Role::Ai);
        assert_eq!(msg.content, PLACEHOLDER_CONTENT);
        assert!(msg.streaming);
        assert_eq!(msg.extras, Some(TurnExtras::default()));
    }

    #[test]
    fn user_message() {
        let msg = Message::user(session(), "Hello");
        assert!(msg.is_user());
        assert!(!msg.streaming);
        assert!(msg.extras.is_none());
    }

    #[test]
    fn reasoning_text_from_string_payload() {
        let obs = observation(ObservationKind::Reasoning, json!("step1"));
        assert_eq!(obs.reasoning_text(), Some("step1"));
    }

    #[test]
    fn reasoning_text_from_thoughts_field() {
        let obs = observation(ObservationKind::Reasoning, json!({"thoughts": "look it up"}));
        assert_eq!(obs.reasoning_text(), Some("look it up"));

        let obs = observation(ObservationKind::Reasoning, json!({"other": 1}));
        assert_eq!(obs.reasoning_text(), None);
    }

    #[test]
    fn non_reasoning_kinds_carry_no_reasoning() {
        let obs = observation(ObservationKind::Plan, json!("step1"));
        assert_eq!(obs.reasoning_text(), None);
    }

    #[test]
    fn observation_kind_wire_names() {
        let kind: ObservationKind = serde_json::from_str("\"THOUGHTS\"").unwrap();
        assert_eq!(kind, ObservationKind::Reasoning);
        let kind: ObservationKind = serde_json::from_str("\"reasoning\"").unwrap();
        assert_eq!(kind, ObservationKind::Reasoning);
        let kind: ObservationKind = serde_json::from_str("\"TOOL_CALL\"").unwrap();
        assert_eq!(kind, ObservationKind::ToolCall);
        let kind: ObservationKind = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(kind, ObservationKind::Other);
    }

    #[test]
    fn metadata_uses_camel_case() {
        let meta: LlmMetadata =
            serde_json::from_str(r#"{"inputTokens": 12, "stopReason": "stop"}"#).unwrap();
        assert_eq!(meta.input_tokens, Some(12));
        assert_eq!(meta.stop_reason.as_deref(), Some("stop"));
        assert_eq!(meta.output_tokens, None);
    }
}
