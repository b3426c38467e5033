//! Turn controller state machine.
//!
//! The controller is the only writer of the ledger and the accumulator. It
//! opens a turn, applies channel events that belong to it, and finalizes it
//! exactly once, whichever completion signal arrives first.
//!
//! # State Machine
//!
//! ```text
//!            start_turn
//!   ┌──────┐ ─────────▶ ┌──────┐  END / call resolved / ERROR / call rejected
//!   │ Idle │            │ Open │ ─────────────────────────────────────────┐
//!   └──────┘ ◀───────── └──────┘                                          │
//!       ▲     (release)                                                   ▼
//!       │                                                           ┌─────────┐
//!       └───────────────────────────────────────────────────────────│ Closing │
//!                     reset accumulator, release turn id            └─────────┘
//! ```
//!
//! Events are applied only in `Open`, only for this session, and only when
//! their turn correlator (if any) matches the open turn. Everything else is
//! dropped, never queued.

use iq_chat_core::{LlmMetadata, Message, MessageId, Observation, SessionId};

use crate::accumulator::Accumulator;
use crate::error::{Result, RuntimeError, SessionError, StaleReason};
use crate::events::{ChannelEvent, StreamEventKind, TokenSubtype};
use crate::ledger::{Ledger, Snapshot};
use crate::runtime::CallResponse;

/// Trailing glyph shown while response text is streaming.
pub const CURSOR_MARKER: char = '▍';

/// Content of a turn that ended without any response text.
pub const INCOMPLETE_CONTENT: &str = "Response processing incomplete.";

/// Content used when the call resolved with an answer that has no text.
pub const UNUSABLE_RESPONSE_CONTENT: &str = "Response processing had an issue.";

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No turn is open.
    #[default]
    Idle,
    /// A turn is open and accepts events.
    Open,
    /// The turn has been finalized and is being released.
    Closing,
}

/// Identity of an open turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// ID of the placeholder AI message.
    pub turn_id: MessageId,
    /// Session the turn belongs to.
    pub session_id: SessionId,
}

/// Result of submitting an event or a call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// The open message or the accumulator changed.
    Applied,
    /// Accepted, but nothing to display (e.g. a thinking token).
    Ignored,
    /// The turn was finalized and released.
    Finalized,
    /// The event did not belong to the open turn.
    Dropped(StaleReason),
}

impl Outcome {
    /// Whether the ledger may have changed.
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Applied | Self::Finalized)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenTurn {
    id: MessageId,
    /// Whether any response token reached the message content.
    streamed: bool,
}

enum Finish {
    Completed(Option<CallResponse>),
    Failed(SessionError),
    Forced,
}

/// Single-owner state machine reconciling the runtime's three sources.
#[derive(Debug, Clone)]
pub struct TurnController {
    session_id: SessionId,
    ledger: Ledger,
    accumulator: Accumulator,
    phase: TurnPhase,
    open: Option<OpenTurn>,
}

impl TurnController {
    /// Create a controller with an empty ledger.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self::with_history(session_id, Vec::new())
    }

    /// Create a controller whose ledger starts with `history`.
    #[must_use]
    pub fn with_history(session_id: SessionId, history: Vec<Message>) -> Self {
        Self {
            session_id,
            ledger: Ledger::from_messages(history),
            accumulator: Accumulator::new(),
            phase: TurnPhase::Idle,
            open: None,
        }
    }

    /// Session this controller serves.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// ID of the open turn, if any.
    #[must_use]
    pub fn open_turn(&self) -> Option<MessageId> {
        self.open.map(|open| open.id)
    }

    /// The per-turn buffer.
    #[must_use]
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// The message ledger.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Current immutable view of all messages.
    #[must_use]
    pub fn messages(&self) -> Snapshot {
        self.ledger.to_list()
    }

    /// Append a finished message outside of any turn (greeting, system notice).
    pub fn append_message(&mut self, message: Message) {
        self.ledger.append(message);
    }

    /// Open a turn for `query`.
    ///
    /// Appends the user message and a placeholder AI message whose ID becomes
    /// the turn ID.
    ///
    /// # Errors
    ///
    /// Returns `EmptyQuery` for blank input and `TurnInFlight` when a turn is
    /// already open. Neither touches the ledger.
    pub fn start_turn(&mut self, query: &str) -> Result<Turn> {
        if query.trim().is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        if let Some(open) = self.open {
            return Err(SessionError::TurnInFlight(open.id));
        }

        self.ledger.append(Message::user(self.session_id.clone(), query));
        let placeholder = Message::placeholder(self.session_id.clone());
        let turn_id = placeholder.id;
        self.ledger.append(placeholder);

        self.accumulator.reset();
        self.open = Some(OpenTurn {
            id: turn_id,
            streamed: false,
        });
        self.phase = TurnPhase::Open;

        tracing::debug!(session_id = %self.session_id, turn_id = %turn_id, "Turn opened");
        Ok(Turn {
            turn_id,
            session_id: self.session_id.clone(),
        })
    }

    /// Apply an event from either channel.
    pub fn dispatch(&mut self, event: ChannelEvent) -> Outcome {
        let turn_id = match self.admit(event.session_id(), event.turn_id()) {
            Ok(turn_id) => turn_id,
            Err(reason) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    error = %SessionError::StaleEvent(reason),
                    "Dropping channel event"
                );
                return Outcome::Dropped(reason);
            }
        };

        match event {
            ChannelEvent::Observation(event) => self.apply_observation(turn_id, event.observation),
            ChannelEvent::Stream(event) => match event.kind {
                StreamEventKind::Token { subtype, data } => {
                    self.apply_token(turn_id, subtype, &data)
                }
                StreamEventKind::Metadata { data } => self.apply_metadata(turn_id, data),
                StreamEventKind::End => self.finalize(turn_id, Finish::Completed(None)),
                StreamEventKind::Error { data } => {
                    tracing::warn!(turn_id = %turn_id, error = %data, "Token stream reported an error");
                    self.finalize(turn_id, Finish::Failed(SessionError::Stream(data)))
                }
            },
        }
    }

    /// Apply the runtime call's own outcome for `turn_id`.
    ///
    /// A no-op when the turn was already finalized by the token stream.
    pub fn resolve_call(
        &mut self,
        turn_id: MessageId,
        result: std::result::Result<CallResponse, RuntimeError>,
    ) -> Outcome {
        if !self.is_open(turn_id) {
            match &result {
                Ok(_) => {
                    tracing::debug!(turn_id = %turn_id, "Call resolved after turn was finalized");
                }
                Err(e) => {
                    tracing::warn!(turn_id = %turn_id, error = %e, "Call failed after turn was finalized");
                }
            }
            return Outcome::Dropped(self.stale_reason(turn_id));
        }

        match result {
            Ok(response) => self.finalize(turn_id, Finish::Completed(Some(response))),
            Err(e) => {
                tracing::warn!(turn_id = %turn_id, error = %e, "Runtime call failed");
                self.finalize(turn_id, Finish::Failed(SessionError::Call(e)))
            }
        }
    }

    /// Finalize `turn_id` with whatever has accumulated.
    ///
    /// Used when the call path ended without either completion signal
    /// finalizing the turn.
    pub fn force_finalize(&mut self, turn_id: MessageId) -> Outcome {
        if self.is_open(turn_id) {
            tracing::warn!(turn_id = %turn_id, "Forcing finalization of open turn");
        }
        self.finalize(turn_id, Finish::Forced)
    }

    /// Flip the extras visibility flag of a message.
    ///
    /// Returns `false` if no such message exists. Turn state is untouched.
    pub fn toggle_extras(&mut self, message_id: MessageId) -> bool {
        self.ledger
            .patch(message_id, |m| m.extras_open = !m.extras_open)
    }

    fn is_open(&self, turn_id: MessageId) -> bool {
        self.phase == TurnPhase::Open && self.open_turn() == Some(turn_id)
    }

    fn stale_reason(&self, turn_id: MessageId) -> StaleReason {
        match self.open {
            Some(open) if open.id != turn_id => StaleReason::TurnMismatch,
            _ => StaleReason::NoOpenTurn,
        }
    }

    fn admit(
        &self,
        session_id: &SessionId,
        correlator: Option<MessageId>,
    ) -> std::result::Result<MessageId, StaleReason> {
        if *session_id != self.session_id {
            return Err(StaleReason::ForeignSession);
        }
        let open = match (self.phase, self.open) {
            (TurnPhase::Open, Some(open)) => open,
            _ => return Err(StaleReason::NoOpenTurn),
        };
        match correlator {
            Some(turn_id) if turn_id != open.id => Err(StaleReason::TurnMismatch),
            _ => Ok(open.id),
        }
    }

    fn apply_observation(&mut self, turn_id: MessageId, observation: Observation) -> Outcome {
        if let Some(text) = observation.reasoning_text() {
            self.accumulator.append_reasoning(text);
        }
        self.accumulator.append_observation(observation);

        let extras = self.accumulator.snapshot();
        self.ledger.patch(turn_id, |m| m.extras = Some(extras));
        Outcome::Applied
    }

    fn apply_token(
        &mut self,
        turn_id: MessageId,
        subtype: Option<TokenSubtype>,
        data: &str,
    ) -> Outcome {
        if !subtype.is_some_and(TokenSubtype::is_response) {
            tracing::trace!(turn_id = %turn_id, subtype = ?subtype, "Ignoring non-response token");
            return Outcome::Ignored;
        }
        let Some(open) = self.open.as_mut() else {
            return Outcome::Dropped(StaleReason::NoOpenTurn);
        };
        let first_token = !open.streamed;
        open.streamed = true;

        let fragment: String = data.chars().filter(|c| *c != CURSOR_MARKER).collect();
        self.ledger.patch(turn_id, |m| {
            let mut content = if first_token {
                String::new()
            } else {
                strip_cursor(&m.content).to_string()
            };
            content.push_str(&fragment);
            content.push(CURSOR_MARKER);
            m.content = content;
            m.streaming = true;
        });
        Outcome::Applied
    }

    fn apply_metadata(&mut self, turn_id: MessageId, metadata: LlmMetadata) -> Outcome {
        self.accumulator.set_metadata(metadata);
        let extras = self.accumulator.snapshot();
        self.ledger.patch(turn_id, |m| m.extras = Some(extras));
        Outcome::Applied
    }

    /// Finalize-once guard: only the open turn's first completion signal gets here.
    fn finalize(&mut self, turn_id: MessageId, finish: Finish) -> Outcome {
        if !self.is_open(turn_id) {
            return Outcome::Dropped(self.stale_reason(turn_id));
        }
        let streamed = self.open.is_some_and(|open| open.streamed);
        self.phase = TurnPhase::Closing;

        let mut extras = self.accumulator.snapshot();
        if extras.metadata.is_none() {
            if let Finish::Completed(Some(response)) = &finish {
                extras.metadata.clone_from(&response.metadata);
            }
        }

        self.ledger.patch(turn_id, |m| {
            m.content = match &finish {
                Finish::Failed(error) => error.inline_message(),
                _ if streamed => strip_cursor(&m.content).to_string(),
                Finish::Completed(Some(response)) => response
                    .response
                    .content()
                    .unwrap_or(UNUSABLE_RESPONSE_CONTENT)
                    .to_string(),
                Finish::Completed(None) | Finish::Forced => INCOMPLETE_CONTENT.to_string(),
            };
            m.streaming = false;
            m.extras = Some(extras);
        });

        self.release(turn_id);
        Outcome::Finalized
    }

    fn release(&mut self, turn_id: MessageId) {
        self.accumulator.reset();
        self.open = None;
        self.phase = TurnPhase::Idle;
        tracing::debug!(session_id = %self.session_id, turn_id = %turn_id, "Turn closed");
    }
}

fn strip_cursor(content: &str) -> &str {
    content.strip_suffix(CURSOR_MARKER).unwrap_or(content)
}
