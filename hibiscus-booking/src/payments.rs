use chrono::{DateTime, Duration, Utc};
use hibiscus_core::repository::BookingMark;
use hibiscus_core::payment::{CheckoutRequest, CheckoutSession, PaymentGateway};
use hibiscus_core::{Booking, BookingStatus, CoreError, CoreResult, PaymentStatus};
use std::sync::Arc;
use tracing::info;

use crate::manager::BookingManager;
use crate::models::{PaymentLinkOutcome, PaymentStatusView};

/// Emailed payment links stay valid for a day.
const PAYMENT_LINK_TTL_HOURS: i64 = 24;

impl BookingManager {
    fn gateway(&self) -> CoreResult<&Arc<dyn PaymentGateway>> {
        self.payments
            .as_ref()
            .ok_or_else(|| CoreError::UpstreamUnavailable("payment gateway not configured".into()))
    }

    fn checkout_request(&self, booking: &Booking, expires_at: Option<DateTime<Utc>>) -> CheckoutRequest {
        let frontend = self.notifier.settings().frontend_url.trim_end_matches('/');
        CheckoutRequest {
            booking_id: booking.id.clone(),
            product_name: format!("Airport Transfer - {}", booking.booking_ref),
            description: format!("{} to {}", booking.pickup_address, booking.dropoff_address),
            amount_cents: (booking.total_price * 100.0).round() as i64,
            currency: self.currency.clone(),
            success_url: format!("{}/payment/success?booking_id={}", frontend, booking.id),
            cancel_url: format!("{}/payment/cancel?booking_id={}", frontend, booking.id),
            expires_at,
        }
    }

    async fn open_checkout(&self, booking: &mut Booking, expires_at: Option<DateTime<Utc>>) -> CoreResult<CheckoutSession> {
        let gateway = self.gateway()?;
        if booking.payment_status == PaymentStatus::Paid {
            return Err(CoreError::Conflict(format!("{} is already paid", booking.booking_ref)));
        }
        let session = gateway
            .create_checkout_session(&self.checkout_request(booking, expires_at))
            .await?;
        self.record_mark(booking, BookingMark::CheckoutSession(session.id.clone())).await;
        Ok(session)
    }

    /// Hosted checkout for the full fare. Gateway failures are returned.
    pub async fn create_checkout(&self, booking_id: &str) -> CoreResult<CheckoutSession> {
        let mut booking = self.get_booking(booking_id).await?;
        let session = self.open_checkout(&mut booking, None).await?;
        info!("Checkout {} opened for {}", session.id, booking.booking_ref);
        Ok(session)
    }

    pub async fn send_payment_link(&self, booking_id: &str) -> CoreResult<PaymentLinkOutcome> {
        let mut booking = self.get_booking(booking_id).await?;
        let now = Utc::now();
        let session = self
            .open_checkout(&mut booking, Some(now + Duration::hours(PAYMENT_LINK_TTL_HOURS)))
            .await?;

        let delivered = self.notifier.send_payment_link(&booking, &session.url).await;
        self.record_mark(&mut booking, BookingMark::PaymentLinkSent(now)).await;
        info!("Payment link for {} sent (delivered={})", booking.booking_ref, delivered);

        Ok(PaymentLinkOutcome {
            payment_url: session.url,
            delivered,
        })
    }

    /// Completed checkout reported by the gateway webhook.
    ///
    /// Redelivered webhooks for an already confirmed and paid booking are
    /// acknowledged without notifying anyone again.
    pub async fn confirm_payment(&self, booking_id: &str) -> CoreResult<Booking> {
        let mut booking = self.get_booking(booking_id).await?;
        if booking.status == BookingStatus::Confirmed && booking.payment_status == PaymentStatus::Paid {
            info!("Payment for {} already recorded", booking.booking_ref);
            return Ok(booking);
        }

        let now = Utc::now();
        let paid = BookingMark::Paid(now);
        if !self.bookings.apply_mark(&booking.id, &paid).await? {
            return Err(CoreError::not_found("Booking"));
        }
        paid.apply(&mut booking);
        info!("Payment received for {}", booking.booking_ref);

        self.send_customer_confirmation(&mut booking, now).await;
        self.notifier.send_admin_new_booking(&booking).await;
        self.sync_calendar(&mut booking).await;
        Ok(booking)
    }

    /// Webhook entry point: looks the session up at the gateway and confirms
    /// the booking it belongs to. Unpaid sessions are ignored.
    pub async fn confirm_checkout(&self, session_id: &str) -> CoreResult<Option<Booking>> {
        let outcome = self.gateway()?.fetch_checkout_session(session_id).await?;
        if !outcome.paid {
            info!("Checkout {} not paid yet, ignoring", outcome.session_id);
            return Ok(None);
        }
        let booking_id = outcome
            .booking_id
            .ok_or_else(|| CoreError::Validation(format!("checkout {} has no booking id", session_id)))?;
        self.confirm_payment(&booking_id).await.map(Some)
    }

    pub async fn payment_status(&self, booking_id: &str) -> CoreResult<PaymentStatusView> {
        let booking = self.get_booking(booking_id).await?;
        Ok(PaymentStatusView {
            booking_id: booking.id,
            booking_ref: booking.booking_ref,
            status: booking.status,
            payment_status: booking.payment_status,
        })
    }
}
