//! Chat session driver.
//!
//! [`ChatSession`] wires an [`AgentRuntime`] to a [`TurnController`]. It
//! subscribes to both runtime channels before anything else, prepares the
//! thread, and then runs one turn per [`ChatSession::send`], applying channel
//! events and the call outcome in arrival order from a single task.
//!
//! Consumers read the conversation through [`ChatSession::view`], a watch
//! channel that always holds the latest immutable snapshot.

use std::sync::Arc;

use iq_chat_core::{Message, MessageId, SessionId};
use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::controller::{Outcome, TurnController, TurnPhase};
use crate::error::{Result, RuntimeError, SessionError};
use crate::ledger::Snapshot;
use crate::runtime::{AgentRuntime, CallRequest};
use crate::subscription::ChannelSubscriptions;

/// A chat session bound to one conversation thread.
pub struct ChatSession<R: AgentRuntime + ?Sized> {
    runtime: Arc<R>,
    config: SessionConfig,
    session_id: SessionId,
    controller: TurnController,
    subscriptions: Option<ChannelSubscriptions>,
    view: watch::Sender<Snapshot>,
    ready: bool,
}

impl<R: AgentRuntime + ?Sized> std::fmt::Debug for ChatSession<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("session_id", &self.session_id)
            .field("phase", &self.controller.phase())
            .field("messages", &self.controller.ledger().len())
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

impl<R: AgentRuntime + ?Sized> ChatSession<R> {
    /// Open a session.
    ///
    /// Subscribes to both channels, then applies the thread configuration and
    /// loads history. If the thread has no history the configured greeting is
    /// shown. If the runtime is unavailable the failure is shown as a single
    /// message, the subscriptions are closed, and the session stays not ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured thread ID is invalid.
    pub async fn open(runtime: Arc<R>, config: SessionConfig) -> Result<Self> {
        let session_id = config.session_id()?;

        let subscriptions = ChannelSubscriptions::open(runtime.as_ref(), &session_id);

        let prepared = runtime
            .prepare_session(&session_id, &config.thread_config(), config.history_load_limit)
            .await;

        let (controller, subscriptions, ready) = match prepared {
            Ok(history) => {
                tracing::info!(
                    session_id = %session_id,
                    history = history.len(),
                    "Chat session ready"
                );
                let mut controller = TurnController::with_history(session_id.clone(), history);
                if controller.ledger().is_empty() {
                    controller.append_message(Message::ai(session_id.clone(), config.greeting.clone()));
                }
                (controller, Some(subscriptions), true)
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to initialize chat session");
                let mut controller = TurnController::new(session_id.clone());
                let notice = SessionError::Initialization(e).inline_message();
                controller.append_message(Message::ai(session_id.clone(), notice));
                subscriptions.close();
                (controller, None, false)
            }
        };

        let (view, _) = watch::channel(controller.messages());
        Ok(Self {
            runtime,
            config,
            session_id,
            controller,
            subscriptions,
            view,
            ready,
        })
    }

    /// Session this instance serves.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Configuration the session was opened with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the session accepts queries.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether both channel subscriptions are live.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscriptions
            .as_ref()
            .is_some_and(ChannelSubscriptions::is_active)
    }

    /// Current turn phase.
    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        self.controller.phase()
    }

    /// Current snapshot of all messages.
    #[must_use]
    pub fn messages(&self) -> Snapshot {
        self.controller.messages()
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<Snapshot> {
        self.view.subscribe()
    }

    /// Run one turn for `query` and return the AI message's ID.
    ///
    /// Resolves once the turn is finalized, by whichever of the token stream
    /// or the call outcome gets there first. Runtime failures do not return
    /// errors; they become the AI message's content.
    ///
    /// # Errors
    ///
    /// Returns `NotReady` if the session failed to initialize or was closed,
    /// and `EmptyQuery` for blank input.
    pub async fn send(&mut self, query: &str) -> Result<MessageId> {
        if !self.ready {
            return Err(SessionError::NotReady);
        }
        self.settle_abandoned_turn();
        self.drain_channels();

        let turn = self.controller.start_turn(query)?;
        self.publish();

        let request = CallRequest {
            query: query.to_string(),
            session_id: self.session_id.clone(),
            turn_id: turn.turn_id,
            user_id: self.config.user_id.clone(),
            provider: self.config.provider(),
            system_prompt: self.config.system_prompt.clone(),
            stream: self.config.stream,
        };
        let runtime = Arc::clone(&self.runtime);
        let limit = self.config.call_timeout();
        let call = async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, runtime.start_call(request))
                    .await
                    .unwrap_or_else(|_| Err(RuntimeError::new("timeout"))),
                None => runtime.start_call(request).await,
            }
        };
        tokio::pin!(call);

        let result = loop {
            let Some(subscriptions) = self.subscriptions.as_mut() else {
                break (&mut call).await;
            };
            tokio::select! {
                biased;
                Some(event) = subscriptions.recv() => {
                    if self.controller.dispatch(event).changed() {
                        self.view.send_replace(self.controller.messages());
                    }
                }
                result = &mut call => break result,
            }
        };

        // Events the runtime published before resolving are still queued.
        self.drain_channels();
        let outcome = self.controller.resolve_call(turn.turn_id, result);
        tracing::trace!(turn_id = %turn.turn_id, outcome = ?outcome, "Call outcome applied");

        if self.controller.open_turn() == Some(turn.turn_id) {
            self.force_finalize(turn.turn_id);
        }
        self.publish();
        Ok(turn.turn_id)
    }

    /// Flip the extras visibility of a message.
    ///
    /// Returns `false` if no such message exists.
    pub fn toggle_extras(&mut self, message_id: MessageId) -> bool {
        let toggled = self.controller.toggle_extras(message_id);
        if toggled {
            self.publish();
        }
        toggled
    }

    /// Close the session.
    ///
    /// Finalizes any turn left open by a cancelled `send`, unsubscribes from
    /// both channels, and rejects further queries. Calling it twice is a no-op.
    pub fn close(&mut self) {
        self.settle_abandoned_turn();
        if let Some(subscriptions) = self.subscriptions.take() {
            subscriptions.close();
            tracing::info!(session_id = %self.session_id, "Chat session closed");
        }
        self.ready = false;
        self.publish();
    }

    /// Finalize a turn whose `send` future was dropped before completion.
    fn settle_abandoned_turn(&mut self) {
        if let Some(turn_id) = self.controller.open_turn() {
            self.drain_channels();
            self.force_finalize(turn_id);
            self.publish();
        }
    }

    fn force_finalize(&mut self, turn_id: MessageId) {
        match self.controller.force_finalize(turn_id) {
            Outcome::Dropped(reason) => {
                tracing::warn!(turn_id = %turn_id, reason = %reason, "Safety-net finalization skipped");
            }
            outcome => {
                tracing::trace!(turn_id = %turn_id, outcome = ?outcome, "Safety-net finalization applied");
            }
        }
    }

    /// Apply every event already queued on both channels.
    fn drain_channels(&mut self) {
        let Some(subscriptions) = self.subscriptions.as_mut() else {
            return;
        };
        let mut changed = false;
        for event in subscriptions.drain() {
            changed |= self.controller.dispatch(event).changed();
        }
        if changed {
            self.publish();
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.controller.messages());
    }
}

impl<R: AgentRuntime + ?Sized> Drop for ChatSession<R> {
    fn drop(&mut self) {
        if self.subscriptions.is_some() {
            tracing::debug!(session_id = %self.session_id, "Chat session dropped without close");
        }
    }
}
