use chrono::NaiveDate;
use hibiscus_core::notify::{CalendarClient, EmailMessage, EmailSender, SmsSender};
use hibiscus_core::{Booking, TrackingSession};
use hibiscus_store::app_config::NotificationsConfig;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::calendar;
use crate::templates;

/// Everything a driver needs to see in a job offer.
#[derive(Debug, Clone)]
pub struct JobOffer {
    pub booking_id: String,
    pub booking_ref: String,
    /// "Outbound" / "Return"
    pub leg_label: String,
    pub driver_name: String,
    pub driver_email: Option<String>,
    pub driver_phone: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub passengers: u32,
    pub customer_name: String,
    pub payout: f64,
    pub notes: Option<String>,
    pub accept_url: String,
    pub auto_dispatched: bool,
}

/// Best-effort fan-out to email, SMS and calendar providers.
///
/// Every method swallows provider failures after logging them. Boolean results
/// report whether a message was handed to the provider successfully, so the
/// caller can stamp cooldowns for channels that actually went out.
#[derive(Clone)]
pub struct NotificationDispatcher {
    email: Option<Arc<dyn EmailSender>>,
    sms: Option<Arc<dyn SmsSender>>,
    calendar: Option<Arc<dyn CalendarClient>>,
    settings: NotificationsConfig,
    utc_offset_hours: i32,
}

impl NotificationDispatcher {
    pub fn new(settings: NotificationsConfig, utc_offset_hours: i32) -> Self {
        Self {
            email: None,
            sms: None,
            calendar: None,
            settings,
            utc_offset_hours,
        }
    }

    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    pub fn with_sms(mut self, sender: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sender);
        self
    }

    pub fn with_calendar(mut self, client: Arc<dyn CalendarClient>) -> Self {
        self.calendar = Some(client);
        self
    }

    pub fn settings(&self) -> &NotificationsConfig {
        &self.settings
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours
    }

    /// Driver-facing link carrying the acceptance token
    pub fn job_url(&self, booking_id: &str, token: &str) -> String {
        format!(
            "{}/driver/job/{}?token={}",
            self.settings.frontend_url.trim_end_matches('/'),
            booking_id,
            token
        )
    }

    pub fn tracking_url(&self, booking_ref: &str) -> String {
        format!(
            "{}/{}",
            self.settings.tracking_url_base.trim_end_matches('/'),
            booking_ref
        )
    }

    async fn deliver_email(&self, message: EmailMessage, context: &str) -> bool {
        let Some(sender) = &self.email else {
            warn!("Email provider not configured - skipping {}", context);
            return false;
        };
        if message.to.trim().is_empty() {
            warn!("No recipient address - skipping {}", context);
            return false;
        }
        match sender.send_email(&message).await {
            Ok(()) => {
                info!("Email sent: {}", context);
                true
            }
            Err(e) => {
                error!("Failed to send {} email: {}", context, e);
                false
            }
        }
    }

    async fn deliver_sms(&self, to: &str, body: &str, context: &str) -> bool {
        let Some(sender) = &self.sms else {
            warn!("SMS provider not configured - skipping {}", context);
            return false;
        };
        if to.trim().is_empty() {
            warn!("No recipient number - skipping {}", context);
            return false;
        }
        match sender.send_sms(to, body).await {
            Ok(()) => {
                info!("SMS sent: {}", context);
                true
            }
            Err(e) => {
                error!("Failed to send {} SMS: {}", context, e);
                false
            }
        }
    }

    fn html(to: &str, (subject, html_body): (String, String)) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject,
            html_body,
            calendar_invite: None,
        }
    }

    pub async fn send_customer_confirmation_email(&self, booking: &Booking) -> bool {
        let mut message = Self::html(
            booking.email.expose(),
            templates::customer_confirmation_email(booking, &self.settings.business_phone),
        );
        message.calendar_invite = calendar::calendar_invite(booking, self.utc_offset_hours);
        self.deliver_email(message, &format!("customer confirmation {}", booking.booking_ref))
            .await
    }

    pub async fn send_customer_confirmation_sms(&self, booking: &Booking) -> bool {
        let body = templates::customer_confirmation_sms(booking, &self.settings.business_phone);
        self.deliver_sms(
            booking.phone.expose(),
            &body,
            &format!("customer confirmation {}", booking.booking_ref),
        )
        .await
    }

    pub async fn send_admin_new_booking(&self, booking: &Booking) {
        let message = Self::html(&self.settings.admin_email, templates::admin_new_booking_email(booking));
        self.deliver_email(message, &format!("admin new booking {}", booking.booking_ref))
            .await;

        match &self.settings.admin_phone {
            Some(phone) => {
                let body = templates::admin_new_booking_sms(booking);
                self.deliver_sms(phone, &body, &format!("admin new booking {}", booking.booking_ref))
                    .await;
            }
            None => warn!("Admin phone not set - skipping admin SMS"),
        }
    }

    pub async fn send_urgent_alert(&self, booking: &Booking, hours_until: f64) {
        let message = Self::html(
            &self.settings.admin_email,
            templates::urgent_admin_email(booking, hours_until),
        );
        self.deliver_email(message, &format!("urgent alert {}", booking.booking_ref))
            .await;

        match &self.settings.admin_phone {
            Some(phone) => {
                let body = templates::urgent_admin_sms(booking, hours_until);
                self.deliver_sms(phone, &body, &format!("urgent alert {}", booking.booking_ref))
                    .await;
            }
            None => warn!("Admin phone not set - skipping urgent admin SMS"),
        }
    }

    pub async fn send_cancellation(&self, booking: &Booking) {
        let message = Self::html(
            booking.email.expose(),
            templates::cancellation_email(booking, &self.settings.business_phone),
        );
        self.deliver_email(message, &format!("cancellation {}", booking.booking_ref))
            .await;
        let body = templates::cancellation_sms(booking, &self.settings.business_phone);
        self.deliver_sms(
            booking.phone.expose(),
            &body,
            &format!("cancellation {}", booking.booking_ref),
        )
        .await;
    }

    pub async fn send_job_offer(&self, offer: &JobOffer) {
        let context = format!("job offer {} to {}", offer.booking_ref, offer.driver_name);
        if let Some(email) = offer.driver_email.as_deref() {
            let message = Self::html(email, templates::driver_job_email(offer));
            self.deliver_email(message, &context).await;
        }
        if let Some(phone) = offer.driver_phone.as_deref() {
            let body = templates::driver_job_sms(offer);
            self.deliver_sms(phone, &body, &context).await;
        }
    }

    pub async fn send_driver_response(
        &self,
        booking: &Booking,
        driver_name: &str,
        accepted: bool,
        reason: Option<&str>,
    ) {
        let message = Self::html(
            &self.settings.admin_email,
            templates::driver_response_email(booking, driver_name, accepted, reason),
        );
        self.deliver_email(message, &format!("driver response {}", booking.booking_ref))
            .await;
    }

    pub async fn send_proximity_sms(&self, session: &TrackingSession, eta_minutes: i64) -> bool {
        let url = self.tracking_url(&session.booking_ref);
        let body = templates::proximity_sms(session, &url, eta_minutes);
        self.deliver_sms(
            session.customer_phone.expose(),
            &body,
            &format!("proximity {}", session.booking_ref),
        )
        .await
    }

    /// Email and SMS; true if either went out.
    pub async fn send_reminder(&self, booking: &Booking) -> bool {
        let message = Self::html(
            booking.email.expose(),
            templates::reminder_email(booking, &self.settings.business_phone),
        );
        let context = format!("reminder {}", booking.booking_ref);
        let emailed = self.deliver_email(message, &context).await;
        let body = templates::reminder_sms(booking, &self.settings.business_phone);
        let texted = self.deliver_sms(booking.phone.expose(), &body, &context).await;
        emailed || texted
    }

    pub async fn send_payment_link(&self, booking: &Booking, payment_url: &str) -> bool {
        let context = format!("payment link {}", booking.booking_ref);
        let message = Self::html(
            booking.email.expose(),
            templates::payment_link_email(booking, payment_url),
        );
        let emailed = self.deliver_email(message, &context).await;
        let body = templates::payment_link_sms(booking, payment_url);
        let texted = self.deliver_sms(booking.phone.expose(), &body, &context).await;
        emailed || texted
    }

    /// Returns the provider event id when the booking was synced.
    pub async fn sync_calendar(&self, booking: &Booking) -> Option<String> {
        let Some(client) = &self.calendar else {
            warn!("Calendar not configured - skipping sync for {}", booking.booking_ref);
            return None;
        };
        let Some(event) = calendar::calendar_event(booking, self.utc_offset_hours) else {
            warn!("Unreadable pickup time {:?} on {}", booking.time, booking.booking_ref);
            return None;
        };
        match client.create_event(&event).await {
            Ok(id) => {
                info!("Calendar event created for {}: {}", booking.booking_ref, id);
                Some(id)
            }
            Err(e) => {
                error!("Calendar sync failed for {}: {}", booking.booking_ref, e);
                None
            }
        }
    }
}
