use crate::Notification;

/// Receives every notification the store creates, after it has been recorded.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Forwards notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::info!(
            kind = ?notification.kind,
            booking_id = ?notification.booking_id,
            "{}: {}",
            notification.title,
            notification.message
        );
    }
}
