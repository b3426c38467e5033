//! Channel subscriptions scoped to a session.
//!
//! A subscription owns the broadcast receiver of one runtime channel. The
//! receiver is registered at subscribe time, so everything the runtime
//! publishes afterwards is queued in it until the session reads it. Events for
//! other sessions are skipped; whether an event still applies is decided by
//! the turn controller.

use std::fmt;

use iq_chat_core::SessionId;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};

use crate::events::{ChannelEvent, ObservationEvent, StreamEvent};
use crate::runtime::AgentRuntime;

/// Which runtime channel a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Intermediate reasoning events.
    Observations,
    /// Response tokens, metadata, end and error events.
    Tokens,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observations => f.write_str("observations"),
            Self::Tokens => f.write_str("tokens"),
        }
    }
}

/// One runtime channel, filtered to a session.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription<E> {
    kind: ChannelKind,
    session_id: SessionId,
    receiver: Option<broadcast::Receiver<E>>,
}

impl<E> Subscription<E>
where
    E: Clone + Into<ChannelEvent>,
{
    /// Wrap `receiver` for `session_id`.
    #[must_use]
    pub fn new(kind: ChannelKind, receiver: broadcast::Receiver<E>, session_id: SessionId) -> Self {
        tracing::debug!(channel = %kind, session_id = %session_id, "Subscribed");
        Self {
            kind,
            session_id,
            receiver: Some(receiver),
        }
    }

    /// Channel this subscription listens to.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Whether the runtime side of the channel is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Wait for the next event of this session.
    ///
    /// Returns `None` once the runtime closed the channel. Cancel safe.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(event) = self.admit(event) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => {
                    self.closed();
                    return None;
                }
            }
        }
    }

    /// Take the next queued event of this session without waiting.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(event) => {
                    if let Some(event) = self.admit(event) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Closed) => {
                    self.closed();
                    return None;
                }
            }
        }
    }

    /// Unsubscribe.
    pub fn close(self) {
        tracing::debug!(channel = %self.kind, session_id = %self.session_id, "Unsubscribed");
    }

    fn admit(&self, event: E) -> Option<ChannelEvent> {
        let event: ChannelEvent = event.into();
        if *event.session_id() == self.session_id {
            Some(event)
        } else {
            tracing::trace!(channel = %self.kind, other = %event.session_id(), "Skipping event for another session");
            None
        }
    }

    fn lagged(&self, skipped: u64) {
        tracing::warn!(channel = %self.kind, skipped = skipped, "Subscriber lagged, events lost");
    }

    fn closed(&mut self) {
        tracing::debug!(channel = %self.kind, "Channel closed by runtime");
        self.receiver = None;
    }
}

/// Both channel subscriptions of a session.
#[derive(Debug)]
pub struct ChannelSubscriptions {
    observations: Subscription<ObservationEvent>,
    tokens: Subscription<StreamEvent>,
}

impl ChannelSubscriptions {
    /// Subscribe to both runtime channels.
    pub fn open<R>(runtime: &R, session_id: &SessionId) -> Self
    where
        R: AgentRuntime + ?Sized,
    {
        Self {
            observations: Subscription::new(
                ChannelKind::Observations,
                runtime.subscribe_observations(),
                session_id.clone(),
            ),
            tokens: Subscription::new(
                ChannelKind::Tokens,
                runtime.subscribe_tokens(),
                session_id.clone(),
            ),
        }
    }

    /// Whether both channels are still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.observations.is_active() && self.tokens.is_active()
    }

    /// Wait for the next event from either channel.
    ///
    /// Returns `None` once both channels are closed. Cancel safe.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        tokio::select! {
            Some(event) = self.observations.recv() => Some(event),
            Some(event) = self.tokens.recv() => Some(event),
            else => None,
        }
    }

    /// Take every event already queued on both channels.
    ///
    /// Order is kept within a channel, not across channels.
    pub fn drain(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.observations.try_recv() {
            events.push(event);
        }
        while let Some(event) = self.tokens.try_recv() {
            events.push(event);
        }
        events
    }

    /// Unsubscribe from both channels.
    pub fn close(self) {
        self.observations.close();
        self.tokens.close();
    }
}
