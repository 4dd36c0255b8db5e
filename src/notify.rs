//! User-facing notifications raised from request callbacks.

use std::sync::Arc;
use std::time::Duration;

use crate::faram::FaramErrors;
use crate::transport::TransportResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDuration {
    Short,
    Medium,
    Long,
}

impl NotificationDuration {
    pub fn as_duration(&self) -> Duration {
        match self {
            NotificationDuration::Short => Duration::from_secs(2),
            NotificationDuration::Medium => Duration::from_secs(5),
            NotificationDuration::Long => Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub kind: NotificationKind,
    pub message: String,
    pub duration: NotificationDuration,
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, n: Notification) {
        match n.kind {
            NotificationKind::Error => tracing::error!(title = %n.title, "{}", n.message),
            NotificationKind::Warning => tracing::warn!(title = %n.title, "{}", n.message),
            NotificationKind::Success | NotificationKind::Info => {
                tracing::info!(title = %n.title, "{}", n.message)
            }
        }
    }
}

/// Builds a `failure` callback that raises an error notification carrying
/// the server's non-field errors.
pub fn notify_on_failure(
    notifier: Arc<dyn Notifier>,
    title: impl Into<String>,
) -> impl Fn(&TransportResponse) + Send + Sync + 'static {
    let title = title.into();
    move |response: &TransportResponse| {
        let errors = FaramErrors::from_response(&response.body);
        notifier.send(Notification {
            title: title.clone(),
            kind: NotificationKind::Error,
            message: errors.message_for_notification(),
            duration: NotificationDuration::Medium,
        });
    }
}
