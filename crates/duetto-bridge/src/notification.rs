/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    /// Neutral informational message.
    Info,
    /// Something degraded, but the session keeps running (e.g. dropped
    /// blocks, a model that failed to load).
    Warning,
    /// A request could not be fulfilled.
    Error,
}

/// A notification payload intended for the host.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub notification_type: NotificationType,
    /// The text content to display to the user.
    pub message: String,
}

impl NotificationMessage {
    pub fn new(notification_type: NotificationType, message: impl Into<String>) -> Self {
        Self {
            notification_type,
            message: message.into(),
        }
    }
}
