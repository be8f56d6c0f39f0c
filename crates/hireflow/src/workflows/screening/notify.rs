use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, JobId};

/// Outbound candidate communication hook (e-mail, webhook).
pub trait Notifier: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub application_id: ApplicationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

pub const AUTOMATIC_REJECTION_TEMPLATE: &str = "candidate_rejected_automatically";
pub const FEEDBACK_TEMPLATE: &str = "candidate_rejection_feedback";

/// Fire-and-forget: a failed notification never changes the record.
pub(crate) fn publish_quietly<N: Notifier + ?Sized>(notifier: &N, notification: Notification) {
    let application_id = notification.application_id.clone();
    let template = notification.template.clone();
    if let Err(err) = notifier.publish(notification) {
        tracing::warn!(
            application_id = %application_id,
            template = %template,
            error = %err,
            "notification failed"
        );
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        tracing::info!(
            application_id = %notification.application_id,
            template = %notification.template,
            recipient = notification.recipient.as_deref().unwrap_or("-"),
            "candidate notification"
        );
        Ok(())
    }
}
