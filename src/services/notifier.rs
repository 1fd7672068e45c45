//! Birthday notification senders

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::job_scheduling::BirthdayPayload;

/// A birthday message ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthdayMessage {
    pub person_id: Uuid,
    pub name: String,
    pub email: String,
    pub occurrence_date: NaiveDate,
}

impl BirthdayMessage {
    /// Rendered greeting
    pub fn text(&self) -> String {
        format!("Happy Birthday, {}! ({})", self.name, self.email)
    }
}

impl From<&BirthdayPayload> for BirthdayMessage {
    fn from(payload: &BirthdayPayload) -> Self {
        Self {
            person_id: payload.person_id,
            name: payload.name.clone(),
            email: payload.email.clone(),
            occurrence_date: payload.occurrence_date,
        }
    }
}

/// Performs the actual "send birthday message" side effect
///
/// Any error is treated as transient and retried under the job's retry
/// policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BirthdayNotifier: Send + Sync {
    async fn send(&self, message: &BirthdayMessage) -> anyhow::Result<()>;
}

/// Writes the greeting to the application log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl BirthdayNotifier for LogNotifier {
    async fn send(&self, message: &BirthdayMessage) -> anyhow::Result<()> {
        info!(
            person_id = %message.person_id,
            date = %message.occurrence_date,
            "{}",
            message.text()
        );
        Ok(())
    }
}
