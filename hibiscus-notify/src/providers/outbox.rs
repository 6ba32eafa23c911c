//! In-process outbox. Stands in for real providers in development and tests:
//! every message is logged and kept for inspection.

use async_trait::async_trait;
use hibiscus_core::notify::{CalendarClient, CalendarEvent, EmailMessage, EmailSender, SmsSender};
use hibiscus_core::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub to: String,
    pub body: String,
}

#[derive(Default)]
pub struct Outbox {
    emails: Mutex<Vec<EmailMessage>>,
    sms: Mutex<Vec<SentSms>>,
    events: Mutex<Vec<CalendarEvent>>,
    failing: AtomicBool,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail, as an unreachable provider would.
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn emails(&self) -> Vec<EmailMessage> {
        self.emails.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn sms(&self) -> Vec<SentSms> {
        self.sms.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.events.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn sms_to(&self, to: &str) -> Vec<SentSms> {
        self.sms().into_iter().filter(|m| m.to == to).collect()
    }

    pub fn emails_to(&self, to: &str) -> Vec<EmailMessage> {
        self.emails().into_iter().filter(|m| m.to == to).collect()
    }

    fn check(&self) -> CoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::upstream("outbox is failing sends"));
        }
        Ok(())
    }
}

#[async_trait]
impl EmailSender for Outbox {
    async fn send_email(&self, message: &EmailMessage) -> CoreResult<()> {
        self.check()?;
        info!("[outbox] email to {}: {}", message.to, message.subject);
        if let Ok(mut emails) = self.emails.lock() {
            emails.push(message.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl SmsSender for Outbox {
    async fn send_sms(&self, to: &str, body: &str) -> CoreResult<()> {
        self.check()?;
        info!("[outbox] sms to {} ({} chars)", to, body.len());
        if let Ok(mut sms) = self.sms.lock() {
            sms.push(SentSms {
                to: to.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarClient for Outbox {
    async fn create_event(&self, event: &CalendarEvent) -> CoreResult<String> {
        self.check()?;
        let mut events = self
            .events
            .lock()
            .map_err(|_| CoreError::upstream("outbox lock poisoned"))?;
        events.push(event.clone());
        Ok(format!("outbox-event-{}", events.len()))
    }
}
