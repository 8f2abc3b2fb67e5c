use crate::external::{Mailer, Notification, render};
use std::sync::Arc;

/// Fire-and-forget dispatch of membership/order notifications. A failed or
/// skipped send never fails the operation that triggered it; it is logged
/// and forgotten.
#[derive(Clone)]
pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    pub async fn dispatch(&self, to: &str, recipient_name: &str, notification: &Notification<'_>) {
        if to.is_empty() {
            log::debug!("notification skipped, recipient has no email address");
            return;
        }
        let (subject, body) = render(recipient_name, notification);
        if let Err(e) = self.mailer.send(to, &subject, &body).await {
            log::warn!("notification dispatch failed: to={to} subject={subject}: {e:?}");
        }
    }
}
