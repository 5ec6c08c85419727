//! Task Stream Orchestrator
//!
//! Wires the socket transport and per-submission request streams into the
//! task and message stores, owns the task state machine, and coordinates
//! cancellation and cleanup. Every source funnels into one queue consumed
//! by a single event-loop task, so store mutations happen in a fixed order
//! and the state machine's tie-breaks are the only race resolution needed:
//! the first terminal event wins, a terminal event before `taskStart`
//! lazily creates the task, and post-terminal progress is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::message::{MessageKind, MessageRole};
use crate::models::notification::{Notification, NotificationAction, UiNotifier};
use crate::models::protocol::{AgentEvent, EventOrigin, Frame, SourceEvent, StreamChunk};
use crate::models::task::{StepLog, Task, TaskOptions, TaskPatch, TaskStatus};
use crate::services::bus::{EventBus, UiEvent};
use crate::services::http::CommandApi;
use crate::services::identity::IdentityProvider;
use crate::services::message_store::MessageStore;
use crate::services::reassembly::FragmentReassembler;
use crate::services::socket::{SocketStatus, SocketTransport};
use crate::services::stream::StreamHandle;
use crate::services::task_store::TaskStore;
use crate::utils::error::{CoreError, CoreResult};

pub(crate) const QUEUE_CAPACITY: usize = 100;
const CANCEL_REASON: &str = "user_request";

/// Coordinates event ingest, the task state machine, and cleanup
pub struct Orchestrator {
    tasks: Arc<TaskStore>,
    messages: Arc<MessageStore>,
    bus: Arc<EventBus>,
    socket: Arc<SocketTransport>,
    api: Arc<dyn CommandApi>,
    identity: Arc<IdentityProvider>,
    notifier: Arc<dyn UiNotifier>,
    events_tx: mpsc::Sender<SourceEvent>,
    /// Streams opened but not yet bound to a task id
    pending_streams: Arc<Mutex<HashMap<String, StreamHandle>>>,
    cancel: CancellationToken,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

/// State private to the event loop
struct LoopState {
    reassembler: FragmentReassembler,
    /// Maps stream ids to task ids, once known
    bindings: HashMap<String, String>,
}

impl Orchestrator {
    /// Construct the orchestrator and start its event loop.
    ///
    /// `events_rx` must be the receiving end of `events_tx`; the socket
    /// transport and request streams share the sending side.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        tasks: Arc<TaskStore>,
        messages: Arc<MessageStore>,
        bus: Arc<EventBus>,
        socket: Arc<SocketTransport>,
        api: Arc<dyn CommandApi>,
        identity: Arc<IdentityProvider>,
        notifier: Arc<dyn UiNotifier>,
        events_tx: mpsc::Sender<SourceEvent>,
        events_rx: mpsc::Receiver<SourceEvent>,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            tasks,
            messages,
            bus,
            socket,
            api,
            identity,
            notifier,
            events_tx,
            pending_streams: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
            loop_task: Mutex::new(None),
        });

        let handle = tokio::spawn(run_event_loop(Arc::clone(&orchestrator), events_rx));
        *orchestrator.loop_task.lock().expect("loop lock poisoned") = Some(handle);
        orchestrator
    }

    /// Submit a command for execution.
    ///
    /// Records the user's command in the timeline, resolves identity,
    /// ensures the socket is connected, and opens the request stream. There
    /// is no retry: failures surface as a notification and an error.
    pub async fn submit(&self, command: &str, options: TaskOptions) -> CoreResult<()> {
        options
            .validate()
            .map_err(CoreError::validation)?;

        self.messages
            .create_message(MessageRole::User, MessageKind::Command, command, None);

        let identity = self.identity.get_identity().await?;
        self.socket.connect(&identity).await;

        match self
            .api
            .submit(command, &options, self.events_tx.clone())
            .await
        {
            Ok(handle) => {
                self.pending_streams
                    .lock()
                    .expect("pending lock poisoned")
                    .insert(handle.stream_id().to_string(), handle);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.notifier.notify(Notification::error(&message));
                self.bus
                    .emit(UiEvent::Notification(Notification::error(&message)));
                Err(e)
            }
        }
    }

    /// Cancel a task cooperatively.
    ///
    /// Issues the HTTP cancel; on acknowledgement an optimistic local
    /// terminal transition is applied through the event queue so the UI is
    /// not blocked on the server's echo. A racing server terminal wins if
    /// it lands first.
    pub async fn cancel(&self, task_id: &str) -> CoreResult<()> {
        let identity = self.identity.get_identity().await.unwrap_or_default();

        match self.api.cancel_task(task_id, CANCEL_REASON, &identity).await {
            Ok(ack) if ack.success => {
                let _ = self
                    .events_tx
                    .send(SourceEvent::CancelAcknowledged {
                        task_id: task_id.to_string(),
                    })
                    .await;
                Ok(())
            }
            Ok(ack) => {
                let reason = ack
                    .error
                    .unwrap_or_else(|| "server refused cancellation".to_string());
                let error = CoreError::cancel_failed(reason);
                self.notifier.notify(Notification::error(error.to_string()));
                Err(error)
            }
            Err(e) => {
                self.notifier.notify(Notification::error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Tear everything down: stop the event loop, close every stream, and
    /// shut the socket. Idempotent.
    pub async fn dispose(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        {
            let mut pending = self.pending_streams.lock().expect("pending lock poisoned");
            for (_, handle) in pending.drain() {
                handle.close();
            }
        }
        self.tasks.close_all_streams();
        self.socket.close().await;

        let handle = self.loop_task.lock().expect("loop lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Socket connection status, for a UI indicator
    pub fn socket_status(&self) -> SocketStatus {
        self.socket.status()
    }

    /// Sender for the ingest queue. Additional event sources feed the
    /// state machine through this; delivery order equals send order.
    pub fn source_sender(&self) -> mpsc::Sender<SourceEvent> {
        self.events_tx.clone()
    }
}

async fn run_event_loop(orchestrator: Arc<Orchestrator>, mut events_rx: mpsc::Receiver<SourceEvent>) {
    let mut state = LoopState {
        reassembler: FragmentReassembler::new(),
        bindings: HashMap::new(),
    };

    loop {
        tokio::select! {
            _ = orchestrator.cancel.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(event) => handle_source_event(&orchestrator, &mut state, event),
                None => break,
            },
        }
    }
}

fn handle_source_event(orchestrator: &Orchestrator, state: &mut LoopState, event: SourceEvent) {
    match event {
        SourceEvent::Inbound { origin, frame } => match frame {
            Frame::Agent(event) => handle_agent_event(orchestrator, state, &origin, event),
            Frame::Chunk(chunk) => handle_stream_chunk(orchestrator, chunk),
        },
        SourceEvent::StreamFailed { stream_id, error } => {
            handle_stream_failure(orchestrator, state, &stream_id, error)
        }
        SourceEvent::StreamEnded { stream_id } => {
            release_stream(orchestrator, state, &stream_id);
        }
        SourceEvent::CancelAcknowledged { task_id } => {
            apply_terminal(
                orchestrator,
                state,
                &task_id,
                TaskStatus::Cancelled,
                None,
                None,
            );
        }
    }
}

fn handle_agent_event(
    orchestrator: &Orchestrator,
    state: &mut LoopState,
    origin: &EventOrigin,
    event: AgentEvent,
) {
    // First task-bearing event from a stream binds that stream to its task
    if let (EventOrigin::Stream { stream_id }, Some(task_id)) = (origin, event.task_id()) {
        bind_stream(orchestrator, state, stream_id, task_id);
    }

    match event {
        AgentEvent::TaskStart { task_id, command } => {
            let created = orchestrator
                .tasks
                .add_task(Task::new(&task_id, command.unwrap_or_default()));
            if created {
                orchestrator.bus.emit(UiEvent::TaskStart { task_id });
            }
        }

        AgentEvent::StepProgress {
            task_id,
            progress,
            intermediate_result,
        } => {
            let progress = progress.map(|p| p.clamp(0.0, 100.0).round() as u8);
            let changed = orchestrator.tasks.update_task(
                &task_id,
                TaskPatch {
                    status: Some(TaskStatus::Processing),
                    progress,
                    ..Default::default()
                },
            );
            if let Some(raw) = &intermediate_result {
                if is_live(orchestrator, &task_id) {
                    orchestrator.tasks.add_intermediate(&task_id, Some(raw));
                }
            }
            if changed {
                orchestrator.bus.emit(UiEvent::StepProgress {
                    progress: orchestrator
                        .tasks
                        .get(&task_id)
                        .map(|t| t.progress)
                        .unwrap_or(0),
                    task_id,
                });
            }
        }

        AgentEvent::FunctionCallPartial {
            task_id,
            function_name,
            partial_args,
        } => {
            if !is_live(orchestrator, &task_id) {
                return;
            }
            if let Some((name, args)) =
                state
                    .reassembler
                    .push(&task_id, &function_name, &partial_args)
            {
                orchestrator
                    .tasks
                    .add_step_log(&task_id, StepLog::function_call(name, args));
            }
        }

        AgentEvent::PlanLog { task_id, message } => {
            if is_live(orchestrator, &task_id) {
                orchestrator
                    .tasks
                    .add_step_log(&task_id, StepLog::plan_log(message));
            }
        }

        AgentEvent::IntermediateResult { task_id, result } => {
            if is_live(orchestrator, &task_id) {
                orchestrator.tasks.add_intermediate(&task_id, Some(&result));
            }
        }

        AgentEvent::ThoughtComplete { task_id, content } => {
            if let Some(chunk) = content.as_deref() {
                if !chunk.is_empty() {
                    orchestrator
                        .messages
                        .append_streaming(MessageKind::Thought, chunk);
                }
            }
            if let Some((_, text)) = orchestrator.messages.finalize_streaming() {
                if !text.is_empty() && is_live(orchestrator, &task_id) {
                    orchestrator
                        .tasks
                        .add_step_log(&task_id, StepLog::thought(text));
                }
            }
            // The thought phase ends the per-request stream; the socket
            // carries the rest of the task
            orchestrator.tasks.close_stream(&task_id);
        }

        AgentEvent::TaskComplete { task_id, result } => {
            apply_terminal(
                orchestrator,
                state,
                &task_id,
                TaskStatus::Completed,
                result,
                None,
            );
        }

        AgentEvent::TaskError { task_id, error } => {
            apply_terminal(
                orchestrator,
                state,
                &task_id,
                TaskStatus::Error,
                None,
                Some(error.unwrap_or_else(|| "task failed".to_string())),
            );
        }

        AgentEvent::ApiKeyMissing { message } => {
            let text = message
                .unwrap_or_else(|| "No API key configured for the agent".to_string());
            let notification =
                Notification::warning(text).with_action(NotificationAction::OpenSettings);
            orchestrator.notifier.notify(notification.clone());
            orchestrator
                .bus
                .emit(UiEvent::Notification(notification));
            orchestrator.bus.emit(UiEvent::SettingsModalRequested);
        }
    }
}

fn handle_stream_chunk(orchestrator: &Orchestrator, chunk: StreamChunk) {
    match chunk {
        StreamChunk::ChatResponseStream {
            content, completed, ..
        } => {
            if !content.is_empty() {
                orchestrator
                    .messages
                    .append_streaming(MessageKind::Chat, &content);
            }
            if completed {
                orchestrator.messages.finalize_streaming();
            }
        }
        StreamChunk::AiThoughtStream {
            task_id,
            content,
            completed,
            ..
        } => {
            if !content.is_empty() {
                orchestrator
                    .messages
                    .append_streaming(MessageKind::Thought, &content);
            }
            if completed {
                if let Some((_, text)) = orchestrator.messages.finalize_streaming() {
                    if !text.is_empty() && is_live(orchestrator, &task_id) {
                        orchestrator
                            .tasks
                            .add_step_log(&task_id, StepLog::thought(text));
                    }
                }
            }
        }
    }
}

/// Apply a terminal transition with first-wins semantics.
///
/// Creates the task lazily when the terminal arrives before `taskStart`.
/// Emission, stream closure, and buffer cleanup happen only when the
/// transition actually took effect.
fn apply_terminal(
    orchestrator: &Orchestrator,
    state: &mut LoopState,
    task_id: &str,
    status: TaskStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
) {
    let changed = if orchestrator.tasks.get(task_id).is_some() {
        orchestrator.tasks.update_task(
            task_id,
            TaskPatch {
                status: Some(status),
                result: result.clone(),
                error: error.clone(),
                ..Default::default()
            },
        )
    } else {
        orchestrator
            .tasks
            .add_task(Task::terminal(task_id, status, result.clone(), error.clone()))
    };

    // Cleanup is mandatory on terminal transitions, even duplicates
    orchestrator.tasks.close_stream(task_id);
    state.reassembler.clear(task_id);
    state.bindings.retain(|_, bound| bound != task_id);

    if !changed {
        return;
    }

    match status {
        TaskStatus::Completed => orchestrator.bus.emit(UiEvent::TaskComplete {
            task_id: task_id.to_string(),
            result,
        }),
        TaskStatus::Error => orchestrator.bus.emit(UiEvent::TaskError {
            task_id: task_id.to_string(),
            error,
        }),
        // Local cancellation is visible through the store only
        _ => {}
    }
}

/// Move a pending stream handle into the task store once its task is known
fn bind_stream(orchestrator: &Orchestrator, state: &mut LoopState, stream_id: &str, task_id: &str) {
    if state.bindings.contains_key(stream_id) {
        return;
    }

    let handle = orchestrator
        .pending_streams
        .lock()
        .expect("pending lock poisoned")
        .remove(stream_id);

    if let Some(handle) = handle {
        state
            .bindings
            .insert(stream_id.to_string(), task_id.to_string());
        orchestrator.tasks.attach_stream(task_id, handle);
    }
}

/// A stream died without a terminal event: surface it as that task's error.
/// Transport failures on unbound streams are recovered silently.
fn handle_stream_failure(
    orchestrator: &Orchestrator,
    state: &mut LoopState,
    stream_id: &str,
    error: String,
) {
    match state.bindings.get(stream_id).cloned() {
        Some(task_id) => {
            tracing::warn!(stream_id, task_id = %task_id, error = %error, "request stream failed");
            apply_terminal(
                orchestrator,
                state,
                &task_id,
                TaskStatus::Error,
                None,
                Some(error),
            );
        }
        None => {
            tracing::warn!(stream_id, error = %error, "unbound request stream failed");
            release_stream(orchestrator, state, stream_id);
        }
    }
}

fn release_stream(orchestrator: &Orchestrator, state: &mut LoopState, stream_id: &str) {
    if let Some(handle) = orchestrator
        .pending_streams
        .lock()
        .expect("pending lock poisoned")
        .remove(stream_id)
    {
        handle.close();
    }
    if let Some(task_id) = state.bindings.remove(stream_id) {
        orchestrator.tasks.close_stream(&task_id);
    }
}

/// The task exists and has not reached a terminal status. Transcript
/// appends are gated on this so intermediate logs never outlive (or
/// predate) their owning task.
fn is_live(orchestrator: &Orchestrator, task_id: &str) -> bool {
    orchestrator
        .tasks
        .get(task_id)
        .map(|t| !t.status.is_terminal())
        .unwrap_or(false)
}
