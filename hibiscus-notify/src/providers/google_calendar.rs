use async_trait::async_trait;
use hibiscus_core::notify::{CalendarClient, CalendarEvent};
use hibiscus_core::{CoreError, CoreResult};
use hibiscus_store::app_config::GoogleCalendarConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

#[derive(Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    access_token: String,
    calendar_id: String,
}

#[derive(Deserialize)]
struct CreatedEvent {
    id: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleCalendarConfig, timeout: Duration) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CoreError::upstream)?;
        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            calendar_id: config.calendar_id.clone(),
        })
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn create_event(&self, event: &CalendarEvent) -> CoreResult<String> {
        let url = format!("{}/calendars/{}/events", CALENDAR_API_BASE, self.calendar_id);
        let body = json!({
            "summary": event.summary,
            "description": event.description,
            "location": event.location,
            "start": { "dateTime": event.start.to_rfc3339() },
            "end": { "dateTime": event.end.to_rfc3339() },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::upstream(format!("Calendar request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::upstream(format!(
                "Calendar API returned {}",
                response.status()
            )));
        }

        let created: CreatedEvent = response
            .json()
            .await
            .map_err(|e| CoreError::upstream(format!("Unreadable calendar response: {e}")))?;
        Ok(created.id)
    }
}
