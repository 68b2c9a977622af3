//! Prints sync notifications to stderr so command output stays clean.

use omnipa_core::{Notification, NotificationLevel, Notifier};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    fn render(notification: &Notification) -> String {
        match notification.level {
            NotificationLevel::Info => format!("  {}", notification.message),
            NotificationLevel::Success => format!("✓ {}", notification.message),
            NotificationLevel::Error => format!("✗ {}", notification.message),
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        eprintln!("{}", Self::render(&notification));
    }
}
