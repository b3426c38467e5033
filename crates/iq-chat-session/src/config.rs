//! Session configuration.

use std::time::Duration;

use iq_chat_core::{IdError, SessionId};
use serde::{Deserialize, Serialize};

/// Which provider and model the runtime should use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider registered in the runtime.
    pub provider_name: String,
    /// Model served by that provider.
    pub model_id: String,
}

/// Per-thread settings applied to the runtime at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadConfig {
    /// Provider and model.
    pub provider: ProviderConfig,
    /// Tools the agent may call.
    pub enabled_tools: Vec<String>,
    /// How many prior messages the runtime feeds back to the model.
    pub history_limit: u32,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Conversation thread identifier.
    #[serde(default = "SessionConfig::default_thread_id")]
    pub thread_id: String,

    /// User identifier forwarded with every call.
    #[serde(default = "SessionConfig::default_user_id")]
    pub user_id: String,

    /// Provider registered in the runtime.
    #[serde(default = "SessionConfig::default_provider_name")]
    pub provider_name: String,

    /// Model served by the provider.
    #[serde(default = "SessionConfig::default_model_id")]
    pub model_id: String,

    /// Tools the agent may call.
    #[serde(default)]
    pub enabled_tools: Vec<String>,

    /// Prior messages the runtime feeds back to the model.
    #[serde(default = "SessionConfig::default_history_limit")]
    pub history_limit: u32,

    /// Prior messages loaded into the ledger at startup.
    #[serde(default = "SessionConfig::default_history_load_limit")]
    pub history_load_limit: usize,

    /// Whether the runtime should stream tokens.
    #[serde(default = "SessionConfig::default_stream")]
    pub stream: bool,

    /// System prompt override sent with every call.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Message shown when the thread has no history.
    #[serde(default = "SessionConfig::default_greeting")]
    pub greeting: String,

    /// Runtime call timeout in seconds (0 disables the timeout).
    #[serde(default = "SessionConfig::default_call_timeout")]
    pub call_timeout_seconds: u64,
}

impl SessionConfig {
    fn default_thread_id() -> String {
        "iq-support-chat".to_string()
    }

    fn default_user_id() -> String {
        "web-user".to_string()
    }

    fn default_provider_name() -> String {
        "ollama-qwen3-14b".to_string()
    }

    fn default_model_id() -> String {
        "qwen3:14b-q4_K_M".to_string()
    }

    const fn default_history_limit() -> u32 {
        20
    }

    const fn default_history_load_limit() -> usize {
        50
    }

    const fn default_stream() -> bool {
        true
    }

    fn default_greeting() -> String {
        "Hello! I'm the Inference Quotient Support assistant. How can I help you today?"
            .to_string()
    }

    const fn default_call_timeout() -> u64 {
        120
    }

    /// Parse the thread identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if `thread_id` is not a valid session identifier.
    pub fn session_id(&self) -> Result<SessionId, IdError> {
        SessionId::new(self.thread_id.clone())
    }

    /// Provider and model for runtime calls.
    #[must_use]
    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig {
            provider_name: self.provider_name.clone(),
            model_id: self.model_id.clone(),
        }
    }

    /// Settings applied to the runtime thread at startup.
    #[must_use]
    pub fn thread_config(&self) -> ThreadConfig {
        ThreadConfig {
            provider: self.provider(),
            enabled_tools: self.enabled_tools.clone(),
            history_limit: self.history_limit,
        }
    }

    /// Get the call timeout as a `Duration`, if enabled.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_seconds > 0).then(|| Duration::from_secs(self.call_timeout_seconds))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thread_id: Self::default_thread_id(),
            user_id: Self::default_user_id(),
            provider_name: Self::default_provider_name(),
            model_id: Self::default_model_id(),
            enabled_tools: Vec::new(),
            history_limit: Self::default_history_limit(),
            history_load_limit: Self::default_history_load_limit(),
            stream: Self::default_stream(),
            system_prompt: None,
            greeting: Self::default_greeting(),
            call_timeout_seconds: Self::default_call_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.thread_id, "iq-support-chat");
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.history_load_limit, 50);
        assert!(config.stream);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.provider_name, "ollama-qwen3-14b");
        assert_eq!(config.model_id, "qwen3:14b-q4_K_M");
        assert_eq!(config.call_timeout_seconds, 120);
    }

    #[test]
    fn partial_json_overrides() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"thread_id": "support-42", "enabled_tools": ["search"], "call_timeout_seconds": 0}"#,
        )
        .unwrap();
        assert_eq!(config.session_id().unwrap().as_str(), "support-42");
        assert_eq!(config.thread_config().enabled_tools, vec!["search"]);
        assert_eq!(config.call_timeout(), None);
    }

    #[test]
    fn timeout_duration() {
        let config = SessionConfig::default();
        assert_eq!(config.call_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn invalid_thread_id() {
        let config = SessionConfig {
            thread_id: "has space".to_string(),
            ..SessionConfig::default()
        };
        assert_eq!(config.session_id(), Err(IdError::Whitespace));
    }
}
