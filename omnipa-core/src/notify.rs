//! User-facing notifications.

use std::fmt;
use std::sync::Mutex;

use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationLevel::Info => write!(f, "info"),
            NotificationLevel::Success => write!(f, "success"),
            NotificationLevel::Error => write!(f, "error"),
        }
    }
}

/// A short message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Receives notifications raised by mutations and sync passes.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => tracing::warn!("{}", notification.message),
            _ => tracing::info!("{}", notification.message),
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.received).clone()
    }

    /// Messages received so far, without levels.
    pub fn messages(&self) -> Vec<String> {
        lock(&self.received)
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }

    /// Drain everything received so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *lock(&self.received))
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        lock(&self.received).push(notification);
    }
}
