//! Wire Protocol
//!
//! Inbound frame types shared by the socket transport and the per-request
//! stream, plus the normalized ingest events consumed by the orchestrator.
//! Frames carry either an `event` discriminator (agent lifecycle vocabulary)
//! or a `type` discriminator (streamed assistant output).

use serde::{Deserialize, Serialize};

use crate::utils::error::{CoreError, CoreResult};

/// Agent lifecycle events, delivered by both the socket and request streams
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    /// A task has been accepted and assigned an id
    TaskStart {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },

    /// Progress update, optionally carrying an observation payload
    StepProgress {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intermediate_result: Option<serde_json::Value>,
    },

    /// Terminal success with the structured final report
    TaskComplete {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },

    /// Terminal server-reported failure
    TaskError {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A fragment of a tool call's argument payload
    FunctionCallPartial {
        task_id: String,
        function_name: String,
        partial_args: String,
    },

    /// A plan transcript line
    PlanLog { task_id: String, message: String },

    /// The active thought finished streaming
    ThoughtComplete {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// A standalone observation outside a progress update
    IntermediateResult {
        task_id: String,
        result: serde_json::Value,
    },

    /// The server has no credentials configured for the agent
    ApiKeyMissing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl AgentEvent {
    /// The task this event belongs to, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            AgentEvent::TaskStart { task_id, .. }
            | AgentEvent::StepProgress { task_id, .. }
            | AgentEvent::TaskComplete { task_id, .. }
            | AgentEvent::TaskError { task_id, .. }
            | AgentEvent::FunctionCallPartial { task_id, .. }
            | AgentEvent::PlanLog { task_id, .. }
            | AgentEvent::ThoughtComplete { task_id, .. }
            | AgentEvent::IntermediateResult { task_id, .. } => Some(task_id),
            AgentEvent::ApiKeyMissing { .. } => None,
        }
    }

    /// Whether this event finalizes a task's status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentEvent::TaskComplete { .. } | AgentEvent::TaskError { .. }
        )
    }
}

/// Streamed assistant output frames, socket-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Visible assistant reply tokens
    ChatResponseStream {
        task_id: String,
        content: String,
        completed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// Reasoning tokens rendered as a collapsible thought
    AiThoughtStream {
        task_id: String,
        content: String,
        completed: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl StreamChunk {
    pub fn task_id(&self) -> &str {
        match self {
            StreamChunk::ChatResponseStream { task_id, .. }
            | StreamChunk::AiThoughtStream { task_id, .. } => task_id,
        }
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Agent(AgentEvent),
    Chunk(StreamChunk),
}

/// Classify a raw JSON text frame by its discriminator.
///
/// Frames with an `event` key parse as [`AgentEvent`], frames with a `type`
/// key as [`StreamChunk`]; anything else is a protocol violation the caller
/// logs and drops.
pub fn classify_frame(raw: &str) -> CoreResult<Frame> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| CoreError::protocol(format!("not a JSON frame: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| CoreError::protocol("frame is not a JSON object"))?;

    if obj.contains_key("event") {
        let event = AgentEvent::deserialize(&value)
            .map_err(|e| CoreError::protocol(format!("bad event frame: {}", e)))?;
        Ok(Frame::Agent(event))
    } else if obj.contains_key("type") {
        let chunk = StreamChunk::deserialize(&value)
            .map_err(|e| CoreError::protocol(format!("bad type frame: {}", e)))?;
        Ok(Frame::Chunk(chunk))
    } else {
        Err(CoreError::protocol("frame has no discriminator"))
    }
}

/// Where a normalized event came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOrigin {
    Socket,
    Stream { stream_id: String },
}

/// Normalized ingest event fed to the orchestrator's single queue
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A classified frame from the socket or a request stream
    Inbound { origin: EventOrigin, frame: Frame },
    /// A request stream died before delivering a terminal event
    StreamFailed { stream_id: String, error: String },
    /// A request stream reached end-of-body
    StreamEnded { stream_id: String },
    /// The server acknowledged a local cancellation
    CancelAcknowledged { task_id: String },
}
