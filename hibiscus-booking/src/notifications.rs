use chrono::{NaiveDate, Utc};
use hibiscus_core::repository::BookingMark;
use hibiscus_core::{Booking, BookingStatus, CoreError, CoreResult, PaymentStatus};
use hibiscus_notify::{check_notification_cooldown, Channel};
use tracing::{info, warn};

use crate::manager::BookingManager;
use crate::models::{ReminderReport, ResendOutcome};

impl BookingManager {
    /// Resend the customer confirmation on `channel`.
    ///
    /// Each channel is checked against its own cooldown. A single-channel
    /// request that is cooling down fails with `RateLimited`; `Both` only fails
    /// when neither channel is eligible and otherwise sends what it can.
    /// `force` skips the cooldown check.
    pub async fn resend_notification(&self, id: &str, channel: Channel, force: bool) -> CoreResult<ResendOutcome> {
        let mut booking = self.get_booking(id).await?;
        let now = Utc::now();
        let cooldown = self.rules.notification_cooldown_minutes;

        let (email_ok, email_wait) = if force {
            (true, 0)
        } else {
            check_notification_cooldown(booking.notifications.last_email_sent.as_deref(), cooldown, now)
        };
        let (sms_ok, sms_wait) = if force {
            (true, 0)
        } else {
            check_notification_cooldown(booking.notifications.last_sms_sent.as_deref(), cooldown, now)
        };

        let send_email = channel.includes_email() && email_ok;
        let send_sms = channel.includes_sms() && sms_ok;
        if !send_email && !send_sms {
            let minutes_remaining = match channel {
                Channel::Email => email_wait,
                Channel::Sms => sms_wait,
                Channel::Both => email_wait.min(sms_wait),
            };
            warn!("Resend {} for {} blocked for {} min", channel, booking.booking_ref, minutes_remaining);
            return Err(CoreError::RateLimited { minutes_remaining });
        }

        let mut channels_sent = Vec::new();
        if send_email && self.notifier.send_customer_confirmation_email(&booking).await {
            self.record_mark(&mut booking, BookingMark::EmailSent(now.to_rfc3339())).await;
            channels_sent.push(Channel::Email);
        }
        if send_sms && self.notifier.send_customer_confirmation_sms(&booking).await {
            self.record_mark(&mut booking, BookingMark::SmsSent(now.to_rfc3339())).await;
            channels_sent.push(Channel::Sms);
        }
        info!("Resent {:?} for {} (force={})", channels_sent, booking.booking_ref, force);

        Ok(ResendOutcome {
            booking_ref: booking.booking_ref,
            channels_sent,
        })
    }

    /// Confirmed, paid trips on `date` that have not been reminded yet.
    pub async fn pending_reminders(&self, date: NaiveDate) -> CoreResult<Vec<Booking>> {
        let bookings = self.bookings.list_by_date(date).await?;
        Ok(bookings
            .into_iter()
            .filter(|b| {
                b.status == BookingStatus::Confirmed
                    && b.payment_status == PaymentStatus::Paid
                    && !b.notifications.reminder_sent
            })
            .collect())
    }

    pub async fn send_reminders(&self, date: NaiveDate) -> CoreResult<ReminderReport> {
        let mut report = ReminderReport::default();
        for mut booking in self.pending_reminders(date).await? {
            if self.notifier.send_reminder(&booking).await {
                self.record_mark(&mut booking, BookingMark::ReminderSent(Utc::now())).await;
                report.sent.push(booking.booking_ref);
            } else {
                report.failed.push(booking.booking_ref);
            }
        }
        info!("Reminders for {}: {} sent, {} failed", date, report.sent.len(), report.failed.len());
        Ok(report)
    }
}
