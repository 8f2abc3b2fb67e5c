use crate::error::AppResult;
use async_trait::async_trait;

/// Outbound mail transport. The actual relay (SMTP provider) is an external
/// collaborator; this service only hands it a rendered message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Default transport: record the send in the log and report success. Used
/// in development and wherever no relay is configured.
pub struct LogMailer {
    from_address: String,
}

impl LogMailer {
    pub fn new(from_address: String) -> Self {
        Self { from_address }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> AppResult<()> {
        log::info!(
            "email queued: from={} to={to} subject={subject}",
            self.from_address
        );
        Ok(())
    }
}
