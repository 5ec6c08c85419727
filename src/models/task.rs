//! Task Models
//!
//! Tasks, their lifecycle status, submission options, and the per-task
//! transcript entries (intermediate results and step logs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created on submission, no progress yet
    Pending,
    /// At least one progress event has arrived
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with a server-reported error
    Error,
    /// Cancelled by the user
    Cancelled,
}

impl TaskStatus {
    /// Check if this status is terminal (no further mutations accepted)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    /// Ordering rank used to reject status regressions from late duplicates
    pub(crate) fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled => 2,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Error => write!(f, "error"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "error" => Ok(TaskStatus::Error),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// A single user-initiated agent execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Server-assigned opaque identifier
    #[serde(rename = "_id")]
    pub id: String,
    /// The natural-language command that started this task
    pub command: String,
    pub status: TaskStatus,
    /// Completion percentage in [0, 100]
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    /// Structured final report, present once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Create a freshly submitted task
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            status: TaskStatus::Pending,
            progress: 0,
            start_time: Utc::now(),
            result: None,
            error: None,
        }
    }

    /// Create a task directly in a terminal status (late-arriving terminal
    /// events for tasks this client never saw start)
    pub fn terminal(
        id: impl Into<String>,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Self {
        let progress = if status == TaskStatus::Completed { 100 } else { 0 };
        Self {
            id: id.into(),
            command: String::new(),
            status,
            progress,
            start_time: Utc::now(),
            result,
            error,
        }
    }
}

/// Partial update applied to a task through the task store
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub command: Option<String>,
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Submission options for a task
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    /// Reference to a stored YAML map to execute instead of free-form planning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaml_map_ref: Option<String>,
    /// Upper bound on agent steps, 1..=50
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u8>,
}

impl TaskOptions {
    /// Validate option ranges
    pub fn validate(&self) -> Result<(), String> {
        if let Some(steps) = self.max_steps {
            if !(1..=50).contains(&steps) {
                return Err(format!("maxSteps must be in [1, 50], got {}", steps));
            }
        }
        Ok(())
    }
}

/// A structured observation produced mid-task, usually with a screenshot
/// reference, the current URL, and a free-text extract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateResult {
    /// Observation kind, "info" when the server omits one
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    /// Free-text extract; never null, downstream views rely on it
    pub extracted_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    /// Marks the last observation of the task
    #[serde(default)]
    pub is_final: bool,
}

impl IntermediateResult {
    /// Normalize an arbitrary server payload into a well-formed entry.
    ///
    /// Missing or non-object payloads become a default `info` entry; a
    /// missing `extractedInfo` is derived from `content`, then `title`.
    pub fn normalize(raw: Option<&serde_json::Value>) -> Self {
        let obj = match raw.and_then(|v| v.as_object()) {
            Some(obj) => obj,
            None => {
                return Self {
                    kind: "info".to_string(),
                    timestamp: Utc::now(),
                    extracted_info: String::new(),
                    screenshot: None,
                    current_url: None,
                    is_final: false,
                }
            }
        };

        let str_field = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let extracted_info = str_field("extractedInfo")
            .or_else(|| str_field("content"))
            .or_else(|| str_field("title"))
            .unwrap_or_default();

        Self {
            kind: str_field("type").unwrap_or_else(|| "info".to_string()),
            timestamp: Utc::now(),
            extracted_info,
            screenshot: str_field("screenshot"),
            current_url: str_field("currentUrl").or_else(|| str_field("url")),
            is_final: obj
                .get("isFinal")
                .or_else(|| obj.get("final"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

/// A transcript entry, ordered by arrival; distinct from the rendered
/// message timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepLog {
    #[serde(flatten)]
    pub kind: StepLogKind,
    pub timestamp: DateTime<Utc>,
}

/// What a step-log entry records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepLogKind {
    /// A completed tool invocation with parsed arguments
    FunctionCall {
        function_name: String,
        args: serde_json::Value,
    },
    /// A plan log line, optionally carrying an extracted step number
    PlanLog {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<u32>,
    },
    /// A completed thought
    Thought { text: String },
}

impl StepLog {
    pub fn function_call(function_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            kind: StepLogKind::FunctionCall {
                function_name: function_name.into(),
                args,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn plan_log(text: impl Into<String>) -> Self {
        let text = text.into();
        let step = parse_step_number(&text);
        Self {
            kind: StepLogKind::PlanLog { text, step },
            timestamp: Utc::now(),
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            kind: StepLogKind::Thought { text: text.into() },
            timestamp: Utc::now(),
        }
    }
}

/// Extract a step number from a plan line.
///
/// Accepts "Step N", "step N:", and bare "N." / "N:" / "N)" prefixes.
pub fn parse_step_number(text: &str) -> Option<u32> {
    let trimmed = text.trim_start();
    let lower = trimmed.to_lowercase();

    let (rest, prefixed) = if lower.starts_with("step") {
        (&trimmed[4..], true)
    } else {
        (trimmed, false)
    };
    let rest = rest.trim_start();

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if !prefixed {
        // A bare number only counts as a step marker with list punctuation
        match rest[digits.len()..].chars().next() {
            Some('.') | Some(':') | Some(')') => {}
            _ => return None,
        }
    }

    digits.parse().ok()
}
