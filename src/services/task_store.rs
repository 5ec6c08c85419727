//! Task Store
//!
//! The active-task collection with deduplication, terminal-guarded status
//! updates, per-task intermediate and step-log transcripts, and ownership
//! of per-task stream handles. Both the request stream and the socket may
//! report the same logical event, so every write path is idempotent under
//! duplicate delivery.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::task::{IntermediateResult, StepLog, Task, TaskPatch, TaskStatus};
use crate::services::store::{Store, SubscriberId};
use crate::services::stream::StreamHandle;

/// Snapshot of everything the task store owns
#[derive(Debug, Clone, Default)]
pub struct TasksState {
    /// Active tasks, insertion-ordered, unique by id
    pub active: Vec<Task>,
    /// Ordered observations per task
    pub intermediate_results: HashMap<String, Vec<IntermediateResult>>,
    /// Ordered transcript entries per task
    pub step_logs: HashMap<String, Vec<StepLog>>,
}

/// Store for tasks and their transcripts
pub struct TaskStore {
    store: Store<TasksState>,
    /// At most one live stream handle per task; not part of the snapshot
    streams: Mutex<HashMap<String, StreamHandle>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            store: Store::new(TasksState::default()),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Add a task, merging into an existing one with the same id.
    ///
    /// Never produces duplicates. Returns whether the store changed.
    pub fn add_task(&self, task: Task) -> bool {
        self.store.update(|state| {
            match state.active.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => {
                    let patch = TaskPatch {
                        command: (!task.command.is_empty()).then(|| task.command.clone()),
                        status: Some(task.status),
                        progress: Some(task.progress),
                        result: task.result.clone(),
                        error: task.error.clone(),
                    };
                    apply_patch(existing, &patch)
                }
                None => {
                    state.active.push(task.clone());
                    true
                }
            }
        })
    }

    /// Shallow-merge a patch into a task.
    ///
    /// Silently ignored when the task is absent or already terminal; a
    /// terminal status never regresses. Returns whether anything changed.
    pub fn update_task(&self, task_id: &str, patch: TaskPatch) -> bool {
        self.store.update(|state| {
            match state.active.iter_mut().find(|t| t.id == task_id) {
                Some(task) => apply_patch(task, &patch),
                None => false,
            }
        })
    }

    /// Detach a task and dispose its stream handle, if any
    pub fn remove_task(&self, task_id: &str) -> bool {
        self.close_stream(task_id);
        self.store.update(|state| {
            let before = state.active.len();
            state.active.retain(|t| t.id != task_id);
            state.intermediate_results.remove(task_id);
            state.step_logs.remove(task_id);
            state.active.len() != before
        })
    }

    /// Append a normalized observation to a task's intermediate log.
    ///
    /// Malformed or missing payloads are normalized to a default entry so
    /// downstream views always see a non-null `extracted_info`.
    pub fn add_intermediate(&self, task_id: &str, raw: Option<&serde_json::Value>) {
        let entry = IntermediateResult::normalize(raw);
        self.store.update(|state| {
            state
                .intermediate_results
                .entry(task_id.to_string())
                .or_default()
                .push(entry.clone());
        });
    }

    /// Append a transcript entry
    pub fn add_step_log(&self, task_id: &str, entry: StepLog) {
        self.store.update(|state| {
            state
                .step_logs
                .entry(task_id.to_string())
                .or_default()
                .push(entry.clone());
        });
    }

    /// Track a task's stream handle, disposing any previous one
    pub fn attach_stream(&self, task_id: &str, handle: StreamHandle) {
        let mut streams = self.streams.lock().expect("stream lock poisoned");
        if let Some(previous) = streams.insert(task_id.to_string(), handle) {
            previous.close();
        }
    }

    /// Dispose a task's stream handle. Returns whether one was open.
    pub fn close_stream(&self, task_id: &str) -> bool {
        let handle = self
            .streams
            .lock()
            .expect("stream lock poisoned")
            .remove(task_id);
        match handle {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Dispose every stream handle (shutdown path)
    pub fn close_all_streams(&self) {
        let mut streams = self.streams.lock().expect("stream lock poisoned");
        for (_, handle) in streams.drain() {
            handle.close();
        }
    }

    /// Whether a task currently has a live stream handle
    pub fn has_stream(&self, task_id: &str) -> bool {
        self.streams
            .lock()
            .expect("stream lock poisoned")
            .contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.store
            .get()
            .active
            .into_iter()
            .find(|t| t.id == task_id)
    }

    pub fn snapshot(&self) -> TasksState {
        self.store.get()
    }

    pub fn subscribe(&self, listener: impl Fn(&TasksState) + Send + Sync + 'static) -> SubscriberId {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.store.unsubscribe(id)
    }
}

/// Apply a patch under the lifecycle rules. Terminal tasks accept nothing,
/// status never ranks downward, progress is monotone and clamped to 100.
fn apply_patch(task: &mut Task, patch: &TaskPatch) -> bool {
    if task.status.is_terminal() {
        return false;
    }

    let mut changed = false;

    if let Some(command) = &patch.command {
        if task.command.is_empty() && !command.is_empty() {
            task.command = command.clone();
            changed = true;
        }
    }

    if let Some(progress) = patch.progress {
        let next = progress.min(100).max(task.progress);
        if next != task.progress {
            task.progress = next;
            changed = true;
        }
    }

    if let Some(status) = patch.status {
        if status != task.status && status.rank() >= task.status.rank() {
            task.status = status;
            changed = true;
            if status == TaskStatus::Completed {
                task.progress = 100;
            }
        }
    }

    if let Some(result) = &patch.result {
        if task.result.as_ref() != Some(result) {
            task.result = Some(result.clone());
            changed = true;
        }
    }

    if let Some(error) = &patch.error {
        if task.error.as_deref() != Some(error.as_str()) {
            task.error = Some(error.clone());
            changed = true;
        }
    }

    changed
}
