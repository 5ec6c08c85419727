//! UI Notifications
//!
//! Typed notifications handed to the host shell's notifier, and the
//! notifier seam itself. Only user-initiated and task-level failures travel
//! this path; transport and protocol errors are recovered internally.

use serde::{Deserialize, Serialize};

/// Severity of a notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Follow-up action a notification can offer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    /// Open the settings surface for credentials
    OpenSettings,
}

/// A notification surfaced to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
            action: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
            action: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
            action: None,
        }
    }

    /// Attach a follow-up action
    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Seam to the host shell's notification surface.
///
/// Implementations must not block; the orchestrator calls this from its
/// event loop.
pub trait UiNotifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that drops everything, for headless use and tests
#[derive(Debug, Default)]
pub struct NullNotifier;

impl UiNotifier for NullNotifier {
    fn notify(&self, _notification: Notification) {}
}
