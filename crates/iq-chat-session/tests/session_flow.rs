//! End-to-end session tests against the scripted runtime.
//!
//! Run with:
//!   cargo test -p iq-chat-session --test session_flow

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use iq_chat_core::{LlmMetadata, Message, Observation, ObservationKind, Role};
use iq_chat_session::{
    AgentRuntime, CallRequest, CallResponse, ChatSession, MessageId, ObservationEvent,
    RuntimeError, Script, ScriptedRuntime, SessionConfig, SessionError, SessionId, StreamEvent,
    StreamEventKind, ThreadConfig, TokenSubtype, TurnPhase, CURSOR_MARKER, INCOMPLETE_CONTENT,
};
use tokio::sync::broadcast;

const GREETING: &str =
    "Hello! I'm the Inference Quotient Support assistant. How can I help you today?";

async fn open(runtime: &Arc<ScriptedRuntime>) -> ChatSession<ScriptedRuntime> {
    ChatSession::open(Arc::clone(runtime), SessionConfig::default())
        .await
        .unwrap()
}

fn find(session: &ChatSession<ScriptedRuntime>, id: MessageId) -> Message {
    session
        .messages()
        .iter()
        .find(|m| m.id == id)
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn greeting_on_empty_history() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let session = open(&runtime).await;

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Ai);
    assert_eq!(messages[0].content, GREETING);
    assert!(session.is_ready());
    assert!(session.is_subscribed());
    assert_eq!(runtime.thread_configs().len(), 1);
}

#[tokio::test]
async fn history_replaces_greeting() {
    let thread = SessionId::new("iq-support-chat").unwrap();
    let runtime = Arc::new(ScriptedRuntime::new().with_history(vec![
        Message::user(thread.clone(), "Do you offer training?"),
        Message::ai(thread, "Yes, we run workshops."),
    ]));
    let session = open(&runtime).await;

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Yes, we run workshops.");
}

#[tokio::test]
async fn streamed_tokens_become_answer() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(
        Script::new()
            .response_token("Hel")
            .response_token("lo")
            .end()
            .respond("Hello"),
    );
    let mut session = open(&runtime).await;

    let turn_id = session.send("hi").await.unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].content, "hi");
    let answer = find(&session, turn_id);
    assert_eq!(answer.content, "Hello");
    assert!(!answer.streaming);
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn reasoning_is_collected_into_extras() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().reasoning("step1").reasoning("step2").end());
    let mut session = open(&runtime).await;

    let turn_id = session.send("plan it").await.unwrap();

    let answer = find(&session, turn_id);
    let extras = answer.extras.unwrap();
    assert_eq!(extras.reasoning_text, "step1\n---\nstep2");
    assert_eq!(extras.observations.len(), 2);
    assert_eq!(answer.content, INCOMPLETE_CONTENT);
}

#[tokio::test]
async fn thinking_tokens_are_not_shown() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(
        Script::new()
            .thinking_token("let me think")
            .token(Some(TokenSubtype::FinalSynthesisLlmResponse), "Answer")
            .end(),
    );
    let mut session = open(&runtime).await;

    let turn_id = session.send("q").await.unwrap();
    assert_eq!(find(&session, turn_id).content, "Answer");
}

#[tokio::test]
async fn call_rejection_is_shown_inline() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().fail("timeout"));
    let mut session = open(&runtime).await;

    let turn_id = session.send("q").await.unwrap();

    let answer = find(&session, turn_id);
    assert!(answer.content.ends_with("Error during processing: timeout"));
    assert!(!answer.streaming);
    assert!(session.is_ready());
}

#[tokio::test(start_paused = true)]
async fn hung_call_times_out() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().hang());
    let config = SessionConfig {
        call_timeout_seconds: 5,
        ..SessionConfig::default()
    };
    let mut session = ChatSession::open(Arc::clone(&runtime), config).await.unwrap();

    let turn_id = session.send("q").await.unwrap();
    assert_eq!(find(&session, turn_id).content, "Error during processing: timeout");
}

#[tokio::test]
async fn stream_error_wins_over_later_resolution() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(
        Script::new()
            .response_token("par")
            .stream_error("model crashed")
            .respond("ignored"),
    );
    let mut session = open(&runtime).await;

    let turn_id = session.send("q").await.unwrap();
    assert_eq!(find(&session, turn_id).content, "Stream Error: model crashed");
}

#[tokio::test]
async fn resolution_without_stream_uses_response() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().respond("Direct answer"));
    let mut session = open(&runtime).await;

    let turn_id = session.send("q").await.unwrap();
    assert_eq!(find(&session, turn_id).content, "Direct answer");
}

#[tokio::test]
async fn streamed_metadata_wins_over_call_metadata() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let streamed = LlmMetadata {
        output_tokens: Some(5),
        ..LlmMetadata::default()
    };
    let returned = LlmMetadata {
        output_tokens: Some(99),
        trace_id: Some("trace-1".to_string()),
        ..LlmMetadata::default()
    };
    runtime.push_script(
        Script::new()
            .response_token("ok")
            .metadata(streamed)
            .respond_with(CallResponse::text("ok").with_metadata(returned.clone())),
    );
    runtime.push_script(
        Script::new().respond_with(CallResponse::text("ok").with_metadata(returned)),
    );
    let mut session = open(&runtime).await;

    let first = session.send("one").await.unwrap();
    let meta = find(&session, first).extras.unwrap().metadata.unwrap();
    assert_eq!(meta.output_tokens, Some(5));

    let second = session.send("two").await.unwrap();
    let meta = find(&session, second).extras.unwrap().metadata.unwrap();
    assert_eq!(meta.trace_id.as_deref(), Some("trace-1"));
}

#[tokio::test]
async fn initialization_failure_is_single_message() {
    let runtime = Arc::new(ScriptedRuntime::unavailable("connection refused"));
    let mut session = open(&runtime).await;

    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].content,
        "Error: Could not initialize the chat service. Details: connection refused"
    );
    assert!(!session.is_ready());
    assert!(!session.is_subscribed());

    let result = session.send("hello?").await;
    assert!(matches!(result, Err(SessionError::NotReady)));
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let mut session = open(&runtime).await;

    let result = session.send("   ").await;
    assert!(matches!(result, Err(SessionError::EmptyQuery)));
    assert_eq!(session.messages().len(), 1);
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn request_carries_turn_and_thread() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let mut session = open(&runtime).await;

    let turn_id = session.send("What is agentic AI?").await.unwrap();

    let calls = runtime.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].turn_id, turn_id);
    assert_eq!(calls[0].session_id.as_str(), "iq-support-chat");
    assert_eq!(calls[0].user_id, "web-user");
    assert_eq!(calls[0].provider.model_id, "qwen3:14b-q4_K_M");
    assert!(calls[0].stream);
    let answer = find(&session, turn_id);
    assert_eq!(answer.content, "You asked: What is agentic AI?");
    let meta = answer.extras.unwrap().metadata.unwrap();
    assert_eq!(meta.output_tokens, Some(5));
}

#[tokio::test]
async fn stray_events_between_turns_are_dropped() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let mut session = open(&runtime).await;
    let thread = session.session_id().clone();

    runtime.emit_stream(StreamEvent {
        session_id: thread.clone(),
        turn_id: None,
        kind: StreamEventKind::Token {
            subtype: Some(TokenSubtype::LlmResponse),
            data: "late".to_string(),
        },
    });
    runtime.emit_stream(StreamEvent {
        session_id: thread,
        turn_id: None,
        kind: StreamEventKind::End,
    });
    tokio::task::yield_now().await;

    runtime.push_script(Script::new().response_token("fresh").end());
    let turn_id = session.send("q").await.unwrap();

    assert_eq!(find(&session, turn_id).content, "fresh");
    assert_eq!(session.messages().len(), 3);
}

#[tokio::test]
async fn uncorrelated_runtime_events_still_apply() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().uncorrelated().response_token("tagged by thread").end());
    let mut session = open(&runtime).await;

    let turn_id = session.send("q").await.unwrap();
    assert_eq!(find(&session, turn_id).content, "tagged by thread");
}

#[tokio::test]
async fn sessions_sharing_a_runtime_stay_apart() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let mut first = open(&runtime).await;
    let mut second = ChatSession::open(
        Arc::clone(&runtime),
        SessionConfig {
            thread_id: "other-thread".to_string(),
            ..SessionConfig::default()
        },
    )
    .await
    .unwrap();

    runtime.push_script(Script::new().response_token("for first").end());
    let turn_id = first.send("q").await.unwrap();
    assert_eq!(find(&first, turn_id).content, "for first");

    runtime.push_script(Script::new().response_token("for second").end());
    let turn_id = second.send("q").await.unwrap();
    assert_eq!(find(&second, turn_id).content, "for second");
    assert_eq!(second.messages().len(), 3);
}

#[tokio::test]
async fn view_publishes_snapshots() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().reasoning("why").response_token("Done").end());
    let mut session = open(&runtime).await;
    let mut view = session.view();
    let before = Arc::clone(&view.borrow_and_update());

    let turn_id = session.send("q").await.unwrap();
    assert!(view.has_changed().unwrap());
    assert_eq!(before.len(), 1);

    assert!(session.toggle_extras(turn_id));
    let latest = Arc::clone(&view.borrow_and_update());
    let answer = latest.iter().find(|m| m.id == turn_id).unwrap();
    assert!(answer.extras_open);
    assert_eq!(answer.content, "Done");
    assert!(!session.toggle_extras(MessageId::generate()));
}

#[tokio::test(start_paused = true)]
async fn cancelled_send_is_finalized_later() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().response_token("partial").hang());
    let mut session = open(&runtime).await;

    let cancelled = tokio::time::timeout(Duration::from_millis(10), session.send("q")).await;
    assert!(cancelled.is_err());
    assert_eq!(session.phase(), TurnPhase::Open);

    runtime.push_script(Script::new().response_token("next").end());
    let turn_id = session.send("again").await.unwrap();

    let messages = session.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[2].content, "partial");
    assert!(!messages[2].streaming);
    assert_eq!(find(&session, turn_id).content, "next");
}

#[tokio::test(start_paused = true)]
async fn close_settles_open_turn_and_unsubscribes() {
    let runtime = Arc::new(ScriptedRuntime::new());
    runtime.push_script(Script::new().hang());
    let mut session = open(&runtime).await;

    let _ = tokio::time::timeout(Duration::from_millis(10), session.send("q")).await;
    session.close();

    let messages = session.messages();
    assert_eq!(messages.last().unwrap().content, INCOMPLETE_CONTENT);
    assert!(!session.is_ready());
    assert!(!session.is_subscribed());
    assert!(matches!(session.send("q").await, Err(SessionError::NotReady)));

    session.close();
    assert_eq!(session.messages().len(), messages.len());
}

/// Runtime that publishes its whole answer and resolves within one poll of
/// the call, leaving the events queued when the call returns.
struct BurstRuntime {
    observations: broadcast::Sender<ObservationEvent>,
    tokens: broadcast::Sender<StreamEvent>,
    yield_after_first_token: bool,
    send_end: bool,
}

impl BurstRuntime {
    fn new(yield_after_first_token: bool, send_end: bool) -> Self {
        Self {
            observations: broadcast::channel(16).0,
            tokens: broadcast::channel(16).0,
            yield_after_first_token,
            send_end,
        }
    }

    fn token(&self, request: &CallRequest, kind: StreamEventKind) {
        let _ = self.tokens.send(StreamEvent {
            session_id: request.session_id.clone(),
            turn_id: Some(request.turn_id),
            kind,
        });
    }
}

#[async_trait]
impl AgentRuntime for BurstRuntime {
    async fn prepare_session(
        &self,
        _session_id: &SessionId,
        _config: &ThreadConfig,
        _history_limit: usize,
    ) -> Result<Vec<Message>, RuntimeError> {
        Ok(Vec::new())
    }

    fn subscribe_observations(&self) -> broadcast::Receiver<ObservationEvent> {
        self.observations.subscribe()
    }

    fn subscribe_tokens(&self) -> broadcast::Receiver<StreamEvent> {
        self.tokens.subscribe()
    }

    async fn start_call(&self, request: CallRequest) -> Result<CallResponse, RuntimeError> {
        let _ = self.observations.send(ObservationEvent {
            session_id: request.session_id.clone(),
            turn_id: Some(request.turn_id),
            observation: Observation {
                id: "obs-1".to_string(),
                kind: ObservationKind::Reasoning,
                title: "Reasoning".to_string(),
                payload: serde_json::Value::String("checked the docs".to_string()),
                timestamp: Utc::now(),
            },
        });
        let response = |data: &str| StreamEventKind::Token {
            subtype: Some(TokenSubtype::LlmResponse),
            data: data.to_string(),
        };

        self.token(&request, response("Hel"));
        if self.yield_after_first_token {
            tokio::task::yield_now().await;
        }
        self.token(&request, response("lo"));
        if self.send_end {
            self.token(&request, StreamEventKind::End);
        }
        Ok(CallResponse::text("Hello"))
    }
}

#[tokio::test]
async fn queued_tokens_apply_before_call_resolution() {
    let runtime = Arc::new(BurstRuntime::new(true, true));
    let mut session = ChatSession::open(runtime, SessionConfig::default())
        .await
        .unwrap();

    let turn_id = session.send("hi").await.unwrap();

    let messages = session.messages();
    let answer = messages.iter().find(|m| m.id == turn_id).unwrap();
    assert_eq!(answer.content, "Hello");
    assert!(!answer.streaming);
    let extras = answer.extras.as_ref().unwrap();
    assert_eq!(extras.reasoning_text, "checked the docs");
}

#[tokio::test]
async fn call_resolving_in_one_poll_keeps_streamed_text() {
    let runtime = Arc::new(BurstRuntime::new(false, false));
    let mut session = ChatSession::open(runtime, SessionConfig::default())
        .await
        .unwrap();

    let turn_id = session.send("hi").await.unwrap();

    let messages = session.messages();
    let answer = messages.iter().find(|m| m.id == turn_id).unwrap();
    assert_eq!(answer.content, "Hello");
    assert!(!answer.content.contains(CURSOR_MARKER));
    assert_eq!(session.phase(), TurnPhase::Idle);
}
