use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use hibiscus_pricing::PriceBreakdown;
use hibiscus_shared::Masked;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Test,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Test => "test",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Test,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Test => "test",
        };
        f.write_str(s)
    }
}

/// One directional trip of a booking
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    #[default]
    Outbound,
    Return,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Outbound => f.write_str("outbound"),
            Leg::Return => f.write_str("return"),
        }
    }
}

/// Tracking status mirrored onto the booking for each leg
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    PendingDriverAcceptance,
    DriverAssigned,
    DriverDeclined,
    DriverOnWay,
    Arrived,
}

/// Dispatch state of a leg, derived from its stored fields
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LegState {
    Unassigned,
    PendingAcceptance,
    Accepted,
    Declined,
    TrackingActive,
    Arrived,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub updated_at: DateTime<Utc>,
}

/// Driver assignment for one leg.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchLeg {
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub driver_payout: Option<f64>,
    pub driver_notes: Option<String>,
    pub acceptance_token: Option<String>,
    /// `None` while awaiting a response
    pub driver_accepted: Option<bool>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub tracking_id: Option<String>,
    pub tracking_status: Option<TrackingStatus>,
    #[serde(default)]
    pub auto_dispatched: bool,
    pub driver_location: Option<GeoPoint>,
    pub driver_eta_minutes: Option<i64>,
}

impl DispatchLeg {
    pub fn state(&self) -> LegState {
        if self.tracking_status == Some(TrackingStatus::Arrived) {
            return LegState::Arrived;
        }
        match (&self.driver_id, self.driver_accepted) {
            (None, Some(false)) => LegState::Declined,
            (None, _) => LegState::Unassigned,
            (Some(_), None) => LegState::PendingAcceptance,
            (Some(_), Some(false)) => LegState::Declined,
            (Some(_), Some(true)) if self.tracking_status == Some(TrackingStatus::DriverOnWay) => {
                LegState::TrackingActive
            }
            (Some(_), Some(true)) => LegState::Accepted,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.driver_id.is_some()
    }

    /// Overwrites any previous assignment; the previous response is cleared.
    pub fn assign(&mut self, offer: LegOffer, now: DateTime<Utc>) {
        *self = DispatchLeg {
            driver_id: Some(offer.driver_id),
            driver_name: Some(offer.driver_name),
            driver_payout: Some(offer.payout),
            driver_notes: offer.notes,
            acceptance_token: Some(offer.token),
            driver_accepted: None,
            assigned_at: Some(now),
            tracking_id: offer.tracking_id,
            tracking_status: Some(TrackingStatus::PendingDriverAcceptance),
            auto_dispatched: offer.auto_dispatched,
            ..DispatchLeg::default()
        };
    }

    pub fn accept(&mut self, now: DateTime<Utc>) {
        self.driver_accepted = Some(true);
        self.accepted_at = Some(now);
        self.tracking_status = Some(TrackingStatus::DriverAssigned);
    }

    /// The leg goes back to needing a fresh assignment. The token and the
    /// `false` result stay so a repeated response is recognised as a duplicate.
    pub fn decline(&mut self, reason: Option<String>, now: DateTime<Utc>) {
        self.driver_accepted = Some(false);
        self.declined_at = Some(now);
        self.decline_reason = reason;
        self.tracking_status = Some(TrackingStatus::DriverDeclined);
        self.driver_id = None;
        self.driver_name = None;
        self.driver_payout = None;
        self.driver_notes = None;
        self.assigned_at = None;
        self.tracking_id = None;
    }

    pub fn token_matches(&self, token: &str) -> bool {
        self.acceptance_token.as_deref() == Some(token)
    }
}

/// Parameters of a job offer placed on a leg
#[derive(Debug, Clone)]
pub struct LegOffer {
    pub driver_id: String,
    pub driver_name: String,
    pub payout: f64,
    pub notes: Option<String>,
    pub token: String,
    pub tracking_id: Option<String>,
    pub auto_dispatched: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceOptions {
    #[serde(default)]
    pub vip_pickup: bool,
    #[serde(default)]
    pub oversized_luggage: bool,
    #[serde(default)]
    pub return_trip: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlightInfo {
    pub departure_flight_number: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_flight_number: Option<String>,
    pub arrival_time: Option<String>,
}

/// Last-sent stamps per channel. Kept as raw strings: a malformed stamp must
/// never block a resend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationLog {
    pub last_email_sent: Option<String>,
    pub last_sms_sent: Option<String>,
    #[serde(default)]
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentLog {
    pub checkout_session_id: Option<String>,
    pub payment_link_sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub booking_ref: String,
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub date: NaiveDate,
    /// Pickup time as entered, `HH:MM`
    pub time: String,
    pub passengers: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub options: ServiceOptions,
    #[serde(default)]
    pub flight: FlightInfo,
    pub pricing: Option<PriceBreakdown>,
    pub total_price: f64,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub legs: BTreeMap<Leg, DispatchLeg>,
    #[serde(default)]
    pub notifications: NotificationLog,
    #[serde(default)]
    pub payment: PaymentLog,
    #[serde(default)]
    pub calendar_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn leg(&self, leg: Leg) -> Option<&DispatchLeg> {
        self.legs.get(&leg)
    }

    pub fn leg_mut(&mut self, leg: Leg) -> &mut DispatchLeg {
        self.legs.entry(leg).or_default()
    }

    pub fn outbound(&self) -> Option<&DispatchLeg> {
        self.leg(Leg::Outbound)
    }

    /// Return leg fare: half of the round-trip total.
    pub fn leg_price(&self, leg: Leg) -> f64 {
        match leg {
            Leg::Outbound => self.total_price,
            Leg::Return => self.total_price / 2.0,
        }
    }

    pub fn pickup_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(self.time.trim(), "%H:%M:%S"))
            .ok()
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("there")
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    pub fn mark_deleted(&mut self, deleted_by: &str, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.deleted_by = Some(deleted_by.to_string());
    }

    /// Clears the deletion stamps and sends the booking back to `pending`.
    pub fn mark_restored(&mut self, now: DateTime<Utc>) {
        self.deleted_at = None;
        self.deleted_by = None;
        self.restored_at = Some(now);
        self.status = BookingStatus::Pending;
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }
}
