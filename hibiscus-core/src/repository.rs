use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    Booking, BookingStatus, DispatchLeg, Driver, GeoPoint, Leg, PaymentStatus, TrackingSession,
    TrackingStatus,
};
use crate::CoreResult;

/// Precondition for a conditional leg update.
#[derive(Debug, Clone)]
pub struct LegGuard {
    /// Stored acceptance token must equal this value
    pub expected_token: String,
    /// Stored `driver_accepted` must still be null
    pub require_unanswered: bool,
}

/// Bookkeeping recorded after a provider call. Each variant writes only its
/// own keys, so concurrent writers never undo each other.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingMark {
    /// `notifications.last_email_sent`
    EmailSent(String),
    /// `notifications.last_sms_sent`
    SmsSent(String),
    ReminderSent(DateTime<Utc>),
    CalendarEvent(String),
    CheckoutSession(String),
    PaymentLinkSent(DateTime<Utc>),
    /// Confirmed and paid, with `payment.paid_at` and `updated_at` stamped
    Paid(DateTime<Utc>),
}

impl BookingMark {
    /// Apply to an in-memory copy.
    pub fn apply(&self, booking: &mut Booking) {
        match self {
            BookingMark::EmailSent(at) => booking.notifications.last_email_sent = Some(at.clone()),
            BookingMark::SmsSent(at) => booking.notifications.last_sms_sent = Some(at.clone()),
            BookingMark::ReminderSent(at) => {
                booking.notifications.reminder_sent = true;
                booking.notifications.reminder_sent_at = Some(*at);
            }
            BookingMark::CalendarEvent(id) => booking.calendar_event_id = Some(id.clone()),
            BookingMark::CheckoutSession(id) => booking.payment.checkout_session_id = Some(id.clone()),
            BookingMark::PaymentLinkSent(at) => booking.payment.payment_link_sent_at = Some(*at),
            BookingMark::Paid(at) => {
                booking.status = BookingStatus::Confirmed;
                booking.payment_status = PaymentStatus::Paid;
                booking.payment.paid_at = Some(*at);
                booking.touch(*at);
            }
        }
    }
}

/// Document store for bookings plus the parallel soft-delete collection.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Fails with `Conflict` if the id or reference is already taken.
    async fn insert(&self, booking: &Booking) -> CoreResult<()>;

    async fn get(&self, id: &str) -> CoreResult<Option<Booking>>;

    async fn find_by_reference(&self, booking_ref: &str) -> CoreResult<Option<Booking>>;

    async fn find_by_tracking_id(&self, tracking_id: &str) -> CoreResult<Option<Booking>>;

    /// Active bookings, newest first
    async fn list(&self) -> CoreResult<Vec<Booking>>;

    async fn list_by_date(&self, date: NaiveDate) -> CoreResult<Vec<Booking>>;

    /// Reference of the most recently created booking that has one
    async fn latest_reference(&self) -> CoreResult<Option<String>>;

    /// Replace the document except for `legs` and the bookkeeping keys
    /// (`notifications`, `payment`, `calendar_event_id`), which keep their
    /// stored value. Legs are only written through `set_leg`, `update_leg`,
    /// `set_leg_tracking` and `record_driver_position`; bookkeeping only
    /// through `apply_mark`. Returns false if the booking is gone.
    async fn save(&self, booking: &Booking) -> CoreResult<bool>;

    /// Write only the keys `mark` covers. Returns false if the booking is gone.
    async fn apply_mark(&self, booking_id: &str, mark: &BookingMark) -> CoreResult<bool>;

    /// Unconditionally replace one leg.
    async fn set_leg(&self, booking_id: &str, leg: Leg, value: &DispatchLeg) -> CoreResult<bool>;

    /// Replace one leg only if `guard` holds. Returns whether it was applied.
    async fn update_leg(
        &self,
        booking_id: &str,
        leg: Leg,
        guard: &LegGuard,
        value: &DispatchLeg,
    ) -> CoreResult<bool>;

    /// Set the tracking fields of an existing leg, leaving the assignment and
    /// the driver's response untouched. `driver` also overwrites the driver
    /// id and name. Returns false if the booking or the leg is missing.
    async fn set_leg_tracking(
        &self,
        booking_id: &str,
        leg: Leg,
        tracking_id: Option<&str>,
        status: TrackingStatus,
        driver: Option<(&str, &str)>,
    ) -> CoreResult<bool>;

    /// Mirror the latest tracked position onto the outbound leg.
    async fn record_driver_position(
        &self,
        booking_id: &str,
        location: &GeoPoint,
        eta_minutes: Option<i64>,
    ) -> CoreResult<bool>;

    /// Move to the deleted store with `deletedAt`/`deletedBy` stamped.
    async fn soft_delete(
        &self,
        id: &str,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Booking>>;

    /// Deleted bookings, most recently deleted first
    async fn list_deleted(&self) -> CoreResult<Vec<Booking>>;

    /// Move back to the active store with status reset to `pending`.
    async fn restore(&self, id: &str, at: DateTime<Utc>) -> CoreResult<Option<Booking>>;

    /// Permanently remove from the deleted store.
    async fn purge(&self, id: &str) -> CoreResult<bool>;
}

#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn create(&self, driver: &Driver) -> CoreResult<()>;

    async fn get(&self, id: &str) -> CoreResult<Option<Driver>>;

    async fn list(&self) -> CoreResult<Vec<Driver>>;

    async fn list_active(&self) -> CoreResult<Vec<Driver>> {
        Ok(self.list().await?.into_iter().filter(|d| d.active).collect())
    }

    async fn save(&self, driver: &Driver) -> CoreResult<bool>;

    async fn delete(&self, id: &str) -> CoreResult<bool>;
}

/// Storage for live tracking sessions, keyed by tracking id.
///
/// Implementations must serialise mutations per session; the proximity flag
/// is only ever flipped through `claim_proximity`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>>;

    async fn put(&self, session: TrackingSession) -> CoreResult<()>;

    async fn delete(&self, tracking_id: &str) -> CoreResult<Option<TrackingSession>>;

    /// Mark the session active in place. Returns false if it is gone.
    async fn activate(&self, tracking_id: &str) -> CoreResult<bool>;

    async fn find_by_pair(
        &self,
        booking_id: &str,
        driver_id: &str,
    ) -> CoreResult<Option<TrackingSession>>;

    async fn find_by_booking(&self, booking_id: &str) -> CoreResult<Vec<TrackingSession>>;

    /// Store a new position (promoting a pending session to active) and
    /// return the updated snapshot.
    async fn record_location(
        &self,
        tracking_id: &str,
        location: GeoPoint,
    ) -> CoreResult<Option<TrackingSession>>;

    async fn record_eta(&self, tracking_id: &str, eta_minutes: i64) -> CoreResult<()>;

    /// Compare-and-set the proximity flag from false to true. Returns true
    /// only for the single caller that flipped it.
    async fn claim_proximity(&self, tracking_id: &str) -> CoreResult<bool>;
}
