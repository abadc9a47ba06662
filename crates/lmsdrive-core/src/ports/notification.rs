//! Notification service port (driven/secondary port)
//!
//! This module defines the outbound channel used to tell the user that a
//! sync run finished or failed. The channel itself (tray balloon, desktop
//! notification, log line) belongs to an adapter.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because notification delivery is adapter-specific.
//! - Notifications are fire-and-forget; a delivery failure never fails a sync.

use serde::{Deserialize, Serialize};

/// Priority level for a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// A notification to display to the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Short, descriptive title
    pub title: String,
    /// Details about the event
    pub body: String,
    pub priority: NotificationPriority,
    /// Category for grouping/filtering (`"sync"` or `"error"`)
    pub category: String,
}

impl Notification {
    /// Creates a new notification with `Normal` priority and no category
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            priority: NotificationPriority::Normal,
            category: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Creates a sync-completion notification
    pub fn sync(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body).with_category("sync")
    }

    /// Creates an error notification with High priority
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body)
            .with_priority(NotificationPriority::High)
            .with_category("error")
    }
}

/// Port trait for user-facing notifications
///
/// Implementations should swallow delivery problems where they can (e.g. no
/// notification daemon running) and only report genuinely unexpected errors.
#[async_trait::async_trait]
pub trait INotificationService: Send + Sync {
    /// Sends a one-shot notification to the user
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
