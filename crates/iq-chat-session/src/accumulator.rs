//! Transient per-turn state.
//!
//! The accumulator collects reasoning text, observations and metadata while a
//! turn is open, independently of the displayed message list. It is reset when
//! a turn opens and again when it closes.

use iq_chat_core::{LlmMetadata, Observation, TurnExtras};

/// Separator placed between consecutive reasoning segments.
pub const REASONING_SEPARATOR: &str = "\n---\n";

/// Buffer for the open turn's reasoning, observations and metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    reasoning_text: String,
    observations: Vec<Observation>,
    metadata: Option<LlmMetadata>,
}

impl Accumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reasoning segment, separated from earlier segments.
    ///
    /// Empty fragments are ignored.
    pub fn append_reasoning(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.reasoning_text.is_empty() {
            self.reasoning_text.push_str(REASONING_SEPARATOR);
        }
        self.reasoning_text.push_str(text);
    }

    /// Append an observation in arrival order.
    pub fn append_observation(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    /// Replace the metadata snapshot (last writer wins).
    pub fn set_metadata(&mut self, metadata: LlmMetadata) {
        self.metadata = Some(metadata);
    }

    /// Copy the current state into message extras.
    ///
    /// The returned value owns its data; later mutations are not visible in it.
    #[must_use]
    pub fn snapshot(&self) -> TurnExtras {
        TurnExtras {
            reasoning_text: self.reasoning_text.clone(),
            observations: self.observations.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Latest metadata, if any arrived.
    #[must_use]
    pub fn metadata(&self) -> Option<&LlmMetadata> {
        self.metadata.as_ref()
    }

    /// Reasoning collected so far.
    #[must_use]
    pub fn reasoning_text(&self) -> &str {
        &self.reasoning_text
    }

    /// Whether nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reasoning_text.is_empty() && self.observations.is_empty() && self.metadata.is_none()
    }

    /// Discard everything.
    pub fn reset(&mut self) {
        self.reasoning_text.clear();
        self.observations.clear();
        self.metadata = None;
    }
}
