use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    /// iCalendar payload attached as `invite.ics`
    pub calendar_invite: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Transactional email provider
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> CoreResult<()>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> CoreResult<()>;
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Returns the provider's event id
    async fn create_event(&self, event: &CalendarEvent) -> CoreResult<String>;
}
