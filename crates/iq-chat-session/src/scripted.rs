//! In-process agent runtime driven by scripts.
//!
//! [`ScriptedRuntime`] plays back a queue of [`Script`]s, one per call. Each
//! script emits observations and stream events on the runtime's broadcast
//! channels and then resolves the call. It backs the tests and the CLI demo.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use iq_chat_core::{LlmMetadata, Message, MessageId, Observation, ObservationKind, SessionId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::ThreadConfig;
use crate::error::RuntimeError;
use crate::events::{ObservationEvent, StreamEvent, StreamEventKind, TokenSubtype};
use crate::runtime::{AgentRuntime, CallRequest, CallResponse};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum Step {
    Observe(ObservationKind, String, Value),
    Stream(StreamEventKind),
    Pause(Duration),
}

#[derive(Debug, Clone)]
enum Reply {
    Respond(CallResponse),
    Fail(RuntimeError),
    Hang,
}

/// What the runtime does for one call.
#[derive(Debug, Clone)]
pub struct Script {
    steps: Vec<Step>,
    correlate: bool,
    reply: Reply,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// An empty script resolving with an empty text answer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            correlate: true,
            reply: Reply::Respond(CallResponse::text(String::new())),
        }
    }

    /// Stream `answer` word by word, then end the stream and resolve with it.
    #[must_use]
    pub fn answer(answer: &str) -> Self {
        Self::new()
            .reasoning("Reading the question")
            .response_words(answer)
            .end()
            .respond(answer)
    }

    /// Emit events without a turn correlator, like runtimes that only tag
    /// events with the thread.
    #[must_use]
    pub fn uncorrelated(mut self) -> Self {
        self.correlate = false;
        self
    }

    /// Emit a reasoning observation.
    #[must_use]
    pub fn reasoning(self, text: &str) -> Self {
        self.observation(ObservationKind::Reasoning, "Reasoning", Value::String(text.to_string()))
    }

    /// Emit an observation.
    #[must_use]
    pub fn observation(mut self, kind: ObservationKind, title: &str, payload: Value) -> Self {
        self.steps.push(Step::Observe(kind, title.to_string(), payload));
        self
    }

    /// Emit a token of the given subtype.
    #[must_use]
    pub fn token(mut self, subtype: Option<TokenSubtype>, data: &str) -> Self {
        self.steps.push(Step::Stream(StreamEventKind::Token {
            subtype,
            data: data.to_string(),
        }));
        self
    }

    /// Emit a response token.
    #[must_use]
    pub fn response_token(self, data: &str) -> Self {
        self.token(Some(TokenSubtype::LlmResponse), data)
    }

    /// Emit `text` as one response token per word.
    #[must_use]
    pub fn response_words(mut self, text: &str) -> Self {
        for word in text.split_inclusive(' ') {
            self = self.response_token(word);
        }
        self
    }

    /// Emit a thinking token.
    #[must_use]
    pub fn thinking_token(self, data: &str) -> Self {
        self.token(Some(TokenSubtype::LlmThinking), data)
    }

    /// Emit a metadata event.
    #[must_use]
    pub fn metadata(mut self, metadata: LlmMetadata) -> Self {
        self.steps.push(Step::Stream(StreamEventKind::Metadata { data: metadata }));
        self
    }

    /// Emit the end-of-stream event.
    #[must_use]
    pub fn end(mut self) -> Self {
        self.steps.push(Step::Stream(StreamEventKind::End));
        self
    }

    /// Emit a stream error event.
    #[must_use]
    pub fn stream_error(mut self, message: &str) -> Self {
        self.steps.push(Step::Stream(StreamEventKind::Error {
            data: message.to_string(),
        }));
        self
    }

    /// Sleep before the next step.
    #[must_use]
    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Pause(duration));
        self
    }

    /// Resolve the call with a text answer.
    #[must_use]
    pub fn respond(self, text: &str) -> Self {
        self.respond_with(CallResponse::text(text))
    }

    /// Resolve the call with a full response.
    #[must_use]
    pub fn respond_with(mut self, response: CallResponse) -> Self {
        self.reply = Reply::Respond(response);
        self
    }

    /// Reject the call.
    #[must_use]
    pub fn fail(mut self, message: &str) -> Self {
        self.reply = Reply::Fail(RuntimeError::new(message));
        self
    }

    /// Never resolve the call.
    #[must_use]
    pub fn hang(mut self) -> Self {
        self.reply = Reply::Hang;
        self
    }
}

/// Scripted implementation of [`AgentRuntime`].
#[derive(Debug)]
pub struct ScriptedRuntime {
    observations: broadcast::Sender<ObservationEvent>,
    tokens: broadcast::Sender<StreamEvent>,
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<CallRequest>>,
    history: Mutex<Vec<Message>>,
    thread_configs: Mutex<Vec<ThreadConfig>>,
    unavailable: Option<String>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    /// Create a runtime with no scripts and no history.
    ///
    /// Calls without a queued script echo the query back.
    #[must_use]
    pub fn new() -> Self {
        let (observations, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (tokens, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            observations,
            tokens,
            scripts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            thread_configs: Mutex::new(Vec::new()),
            unavailable: None,
        }
    }

    /// Create a runtime whose session preparation always fails.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            unavailable: Some(message.into()),
            ..Self::new()
        }
    }

    /// Seed stored history.
    #[must_use]
    pub fn with_history(self, history: Vec<Message>) -> Self {
        *self.history.lock() = history;
        self
    }

    /// Queue a script for the next call.
    pub fn push_script(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Requests received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().clone()
    }

    /// Thread configurations applied so far.
    #[must_use]
    pub fn thread_configs(&self) -> Vec<ThreadConfig> {
        self.thread_configs.lock().clone()
    }

    /// Publish an observation event outside of any call.
    pub fn emit_observation(&self, event: ObservationEvent) {
        let _ = self.observations.send(event);
    }

    /// Publish a stream event outside of any call.
    pub fn emit_stream(&self, event: StreamEvent) {
        let _ = self.tokens.send(event);
    }

    fn echo(query: &str) -> Script {
        let answer = format!("You asked: {query}");
        let output_tokens = u64::try_from(answer.split_whitespace().count()).unwrap_or(0);
        Script::new()
            .reasoning("Reading the question")
            .response_words(&answer)
            .metadata(LlmMetadata {
                output_tokens: Some(output_tokens),
                ..LlmMetadata::default()
            })
            .end()
            .respond(&answer)
    }

    async fn play(&self, steps: Vec<Step>, session_id: &SessionId, turn_id: Option<MessageId>) {
        for (index, step) in steps.into_iter().enumerate() {
            match step {
                Step::Observe(kind, title, payload) => {
                    self.emit_observation(ObservationEvent {
                        session_id: session_id.clone(),
                        turn_id,
                        observation: Observation {
                            id: format!("obs-{index}"),
                            kind,
                            title,
                            payload,
                            timestamp: Utc::now(),
                        },
                    });
                }
                Step::Stream(kind) => self.emit_stream(StreamEvent {
                    session_id: session_id.clone(),
                    turn_id,
                    kind,
                }),
                Step::Pause(duration) => tokio::time::sleep(duration).await,
            }
            // Let the session apply each step as it streams.
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn prepare_session(
        &self,
        session_id: &SessionId,
        config: &ThreadConfig,
        history_limit: usize,
    ) -> Result<Vec<Message>, RuntimeError> {
        if let Some(message) = &self.unavailable {
            return Err(RuntimeError::new(message.clone()));
        }
        self.thread_configs.lock().push(config.clone());

        let history = self.history.lock();
        let own: Vec<Message> = history
            .iter()
            .filter(|m| &m.session_id == session_id)
            .cloned()
            .collect();
        let skip = own.len().saturating_sub(history_limit);
        Ok(own.into_iter().skip(skip).collect())
    }

    fn subscribe_observations(&self) -> broadcast::Receiver<ObservationEvent> {
        self.observations.subscribe()
    }

    fn subscribe_tokens(&self) -> broadcast::Receiver<StreamEvent> {
        self.tokens.subscribe()
    }

    async fn start_call(&self, request: CallRequest) -> Result<CallResponse, RuntimeError> {
        tracing::debug!(session_id = %request.session_id, turn_id = %request.turn_id, "Scripted call started");
        self.calls.lock().push(request.clone());

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Self::echo(&request.query));
        let turn_id = script.correlate.then_some(request.turn_id);
        self.play(script.steps, &request.session_id, turn_id).await;

        match script.reply {
            Reply::Respond(response) => {
                if let Some(text) = response.response.content() {
                    let mut history = self.history.lock();
                    history.push(Message::user(request.session_id.clone(), request.query.clone()));
                    history.push(Message::ai(request.session_id.clone(), text));
                }
                Ok(response)
            }
            Reply::Fail(error) => Err(error),
            Reply::Hang => std::future::pending().await,
        }
    }
}
