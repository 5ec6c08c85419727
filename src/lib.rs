//! Command Center Client Core
//!
//! Client-side core for the Command Center assistant shell. It dispatches
//! commands to a remote agent, multiplexes the per-submission request
//! stream with the process-wide socket, reassembles fragmented tool-call
//! payloads, and maintains the ordered task and message stores the UI
//! renders from.

pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export the surface UI layers work against
pub use models::config::CoreConfig;
pub use models::message::{FilterMode, Message, MessageKind, MessageRole};
pub use models::notification::{
    Notification, NotificationAction, NotificationLevel, NullNotifier, UiNotifier,
};
pub use models::protocol::{AgentEvent, EventOrigin, Frame, SourceEvent, StreamChunk};
pub use models::task::{
    IntermediateResult, StepLog, StepLogKind, Task, TaskOptions, TaskPatch, TaskStatus,
};
pub use services::{
    CancelAck, CommandApi, EventBus, HttpCommandApi, MessageStore, Orchestrator, SocketStatus,
    SocketTransport, StreamHandle, TaskStore, UiEvent, UiEventKind,
};
pub use state::{CommandCenter, Stores};
pub use utils::error::{CoreError, CoreResult};
