//! Task Lifecycle Scenario Tests
//!
//! Drives a composed core (mock HTTP API, no network) through the task
//! state machine: happy path, duplicate terminal reconciliation, fragment
//! reassembly, the cancel race, and message retention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use command_center_core::models::protocol::{AgentEvent, EventOrigin, Frame, SourceEvent};
use command_center_core::{
    CancelAck, CommandApi, CommandCenter, CoreConfig, CoreResult, MessageKind, MessageRole,
    NullNotifier, StepLogKind, StreamHandle, TaskOptions, TaskStatus, UiEventKind,
};

/// Mock API: submissions hand out idle stream handles and record their ids;
/// cancellation acknowledges per configuration.
struct MockApi {
    stream_ids: Mutex<Vec<String>>,
    cancel_success: bool,
}

impl MockApi {
    fn new(cancel_success: bool) -> Self {
        Self {
            stream_ids: Mutex::new(Vec::new()),
            cancel_success,
        }
    }

    fn last_stream_id(&self) -> String {
        self.stream_ids
            .lock()
            .unwrap()
            .last()
            .expect("no stream opened")
            .clone()
    }
}

#[async_trait]
impl CommandApi for MockApi {
    async fn submit(
        &self,
        _command: &str,
        _options: &TaskOptions,
        _events_tx: mpsc::Sender<SourceEvent>,
    ) -> CoreResult<StreamHandle> {
        let stream_id = uuid::Uuid::new_v4().to_string();
        self.stream_ids.lock().unwrap().push(stream_id.clone());
        Ok(StreamHandle::idle(stream_id))
    }

    async fn cancel_task(
        &self,
        _task_id: &str,
        _reason: &str,
        _identity: &str,
    ) -> CoreResult<CancelAck> {
        Ok(CancelAck {
            success: self.cancel_success,
            error: (!self.cancel_success).then(|| "refused".to_string()),
        })
    }

    async fn whoami(&self) -> CoreResult<String> {
        Ok("integration-user".to_string())
    }
}

fn test_config() -> CoreConfig {
    CoreConfig {
        // A closed port and zero retries keep the socket runner quiet
        socket_base_url: "ws://127.0.0.1:1".to_string(),
        http_base_url: "http://127.0.0.1:1".to_string(),
        reconnect_max_attempts: 0,
        ..Default::default()
    }
}

fn build_core(cancel_success: bool) -> (CommandCenter, Arc<MockApi>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let api = Arc::new(MockApi::new(cancel_success));
    let core = CommandCenter::with_api(test_config(), api.clone(), Arc::new(NullNotifier)).unwrap();
    (core, api)
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn inject(core: &CommandCenter, origin: EventOrigin, event: AgentEvent) {
    core.orchestrator()
        .source_sender()
        .send(SourceEvent::Inbound {
            origin,
            frame: Frame::Agent(event),
        })
        .await
        .unwrap();
}

fn stream_origin(api: &MockApi) -> EventOrigin {
    EventOrigin::Stream {
        stream_id: api.last_stream_id(),
    }
}

#[tokio::test]
async fn test_happy_path() {
    let (core, api) = build_core(true);
    let errors = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&errors);
    core.bus().on(UiEventKind::TaskError, move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    core.orchestrator()
        .submit("hello", TaskOptions::default())
        .await
        .unwrap();

    let origin = stream_origin(&api);
    inject(
        &core,
        origin.clone(),
        AgentEvent::TaskStart {
            task_id: "A".to_string(),
            command: Some("hello".to_string()),
        },
    )
    .await;
    inject(
        &core,
        origin.clone(),
        AgentEvent::StepProgress {
            task_id: "A".to_string(),
            progress: Some(50.0),
            intermediate_result: None,
        },
    )
    .await;
    inject(
        &core,
        origin,
        AgentEvent::TaskComplete {
            task_id: "A".to_string(),
            result: Some(json!({"summary": "hi"})),
        },
    )
    .await;
    settle().await;

    let state = core.stores().tasks.snapshot();
    assert_eq!(state.active.len(), 1);
    let task = &state.active[0];
    assert_eq!(task.id, "A");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    assert_eq!(task.result, Some(json!({"summary": "hi"})));

    assert!(!core.stores().tasks.has_stream("A"));
    assert_eq!(errors.load(Ordering::SeqCst), 0);

    // The submission itself landed in the timeline as a command message
    let timeline = core.stores().messages.snapshot().timeline;
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].role, MessageRole::User);
    assert_eq!(timeline[0].kind, MessageKind::Command);

    core.dispose().await;
}

#[tokio::test]
async fn test_duplicate_terminal_reconciled() {
    let (core, api) = build_core(true);
    let completions = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&completions);
    core.bus().on(UiEventKind::TaskComplete, move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    core.orchestrator()
        .submit("hello", TaskOptions::default())
        .await
        .unwrap();

    let origin = stream_origin(&api);
    inject(
        &core,
        origin.clone(),
        AgentEvent::TaskStart {
            task_id: "A".to_string(),
            command: None,
        },
    )
    .await;

    let complete = AgentEvent::TaskComplete {
        task_id: "A".to_string(),
        result: Some(json!({"summary": "hi"})),
    };
    // Delivered once by the stream, once by the socket
    inject(&core, origin, complete.clone()).await;
    inject(&core, EventOrigin::Socket, complete).await;
    settle().await;

    let state = core.stores().tasks.snapshot();
    assert_eq!(state.active.len(), 1);
    assert_eq!(state.active[0].status, TaskStatus::Completed);
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    core.dispose().await;
}

#[tokio::test]
async fn test_fragment_reassembly_single_step_log() {
    let (core, _api) = build_core(true);

    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::TaskStart {
            task_id: "A".to_string(),
            command: None,
        },
    )
    .await;
    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::FunctionCallPartial {
            task_id: "A".to_string(),
            function_name: "click".to_string(),
            partial_args: "{\"x\":1".to_string(),
        },
    )
    .await;
    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::FunctionCallPartial {
            task_id: "A".to_string(),
            function_name: "click".to_string(),
            partial_args: ",\"y\":2}".to_string(),
        },
    )
    .await;
    settle().await;

    let state = core.stores().tasks.snapshot();
    let logs = &state.step_logs["A"];
    assert_eq!(logs.len(), 1);
    match &logs[0].kind {
        StepLogKind::FunctionCall {
            function_name,
            args,
        } => {
            assert_eq!(function_name, "click");
            assert_eq!(*args, json!({"x": 1, "y": 2}));
        }
        other => panic!("Expected FunctionCall, got {:?}", other),
    }

    core.dispose().await;
}

#[tokio::test]
async fn test_unparseable_fragments_never_log() {
    let (core, _api) = build_core(true);

    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::TaskStart {
            task_id: "A".to_string(),
            command: None,
        },
    )
    .await;
    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::FunctionCallPartial {
            task_id: "A".to_string(),
            function_name: "click".to_string(),
            partial_args: "{\"x\":".to_string(),
        },
    )
    .await;
    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::TaskComplete {
            task_id: "A".to_string(),
            result: None,
        },
    )
    .await;
    // A fragment after the terminal is dropped along with the buffer
    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::FunctionCallPartial {
            task_id: "A".to_string(),
            function_name: "click".to_string(),
            partial_args: "1}".to_string(),
        },
    )
    .await;
    settle().await;

    let state = core.stores().tasks.snapshot();
    assert!(state.step_logs.get("A").map_or(true, |l| l.is_empty()));

    core.dispose().await;
}

#[tokio::test]
async fn test_cancel_race_first_terminal_wins() {
    let (core, api) = build_core(true);

    core.orchestrator()
        .submit("hello", TaskOptions::default())
        .await
        .unwrap();

    let origin = stream_origin(&api);
    inject(
        &core,
        origin,
        AgentEvent::TaskStart {
            task_id: "A".to_string(),
            command: None,
        },
    )
    .await;
    settle().await;

    core.orchestrator().cancel("A").await.unwrap();
    settle().await;
    assert_eq!(
        core.stores().tasks.get("A").unwrap().status,
        TaskStatus::Cancelled
    );

    // The server's completion echo arrives after the cancel took effect
    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::TaskComplete {
            task_id: "A".to_string(),
            result: Some(json!({"summary": "too late"})),
        },
    )
    .await;
    settle().await;

    let task = core.stores().tasks.get("A").unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_ne!(task.result, Some(json!({"summary": "too late"})));

    core.dispose().await;
}

#[tokio::test]
async fn test_cancel_refused_is_an_error() {
    let (core, _api) = build_core(false);

    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::TaskStart {
            task_id: "A".to_string(),
            command: None,
        },
    )
    .await;
    settle().await;

    assert!(core.orchestrator().cancel("A").await.is_err());
    settle().await;

    // The task keeps running: no optimistic transition without an ack
    assert_eq!(
        core.stores().tasks.get("A").unwrap().status,
        TaskStatus::Pending
    );

    core.dispose().await;
}

#[tokio::test]
async fn test_message_overflow_keeps_newest_hundred() {
    let (core, _api) = build_core(true);
    let messages = &core.stores().messages;

    for i in 1..=105 {
        messages.create_message(
            MessageRole::User,
            MessageKind::Chat,
            format!("message {}", i),
            Some(format!("m{}", i)),
        );
    }

    let timeline = messages.snapshot().timeline;
    assert_eq!(timeline.len(), 100);
    assert_eq!(timeline.first().unwrap().id, "m6");
    assert_eq!(timeline.last().unwrap().id, "m105");
    // Still in insertion order
    for (offset, message) in timeline.iter().enumerate() {
        assert_eq!(message.id, format!("m{}", offset + 6));
    }

    core.dispose().await;
}

#[tokio::test]
async fn test_api_key_missing_requests_settings() {
    let (core, _api) = build_core(true);
    let requested = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&requested);
    core.bus().on(UiEventKind::SettingsModalRequested, move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    inject(
        &core,
        EventOrigin::Socket,
        AgentEvent::ApiKeyMissing { message: None },
    )
    .await;
    settle().await;

    assert_eq!(requested.load(Ordering::SeqCst), 1);
    // No task state was touched
    assert!(core.stores().tasks.snapshot().active.is_empty());

    core.dispose().await;
}

#[tokio::test]
async fn test_stream_failure_surfaces_as_task_error() {
    let (core, api) = build_core(true);

    core.orchestrator()
        .submit("hello", TaskOptions::default())
        .await
        .unwrap();

    let stream_id = api.last_stream_id();
    inject(
        &core,
        EventOrigin::Stream {
            stream_id: stream_id.clone(),
        },
        AgentEvent::TaskStart {
            task_id: "A".to_string(),
            command: None,
        },
    )
    .await;
    core.orchestrator()
        .source_sender()
        .send(SourceEvent::StreamFailed {
            stream_id,
            error: "connection reset".to_string(),
        })
        .await
        .unwrap();
    settle().await;

    let task = core.stores().tasks.get("A").unwrap();
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.error.as_deref(), Some("connection reset"));
    assert!(!core.stores().tasks.has_stream("A"));

    core.dispose().await;
}
