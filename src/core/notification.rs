//! Transient user-facing notifications.
//!
//! The engine queues short messages (approvals, feedback receipts,
//! generation failures) that the presentation layer drains and displays.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Error,
    Success,
    Warning,
    Info,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single dismissible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    /// Create a notification.
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message)
    }

    /// Icon shown next to the message.
    pub fn icon(&self) -> &'static str {
        match self.kind {
            NotificationKind::Error => "❌",
            NotificationKind::Success => "✅",
            NotificationKind::Warning => "⚠️",
            NotificationKind::Info => "ℹ️",
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.icon(), self.message)
    }
}

/// Bounded FIFO of pending notifications.
#[derive(Debug)]
pub struct NotificationCenter {
    queue: Mutex<VecDeque<Notification>>,
    max_pending: usize,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    /// Create a center keeping at most 32 pending messages.
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    /// Create a center keeping at most `max_pending` messages; older ones are dropped.
    pub fn with_capacity(max_pending: usize) -> Self {
        Self { queue: Mutex::new(VecDeque::new()), max_pending: max_pending.max(1) }
    }

    /// Queue a notification.
    pub fn push(&self, notification: Notification) {
        let mut queue = self.queue.lock();
        while queue.len() >= self.max_pending {
            queue.pop_front();
        }
        tracing::debug!(kind = %notification.kind, message = %notification.message, "Notification");
        queue.push_back(notification);
    }

    /// Take every pending notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of pending notifications.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
