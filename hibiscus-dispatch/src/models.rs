use chrono::{DateTime, NaiveDate, Utc};
use hibiscus_core::models::FlightInfo;
use hibiscus_core::{GeoPoint, Leg, LegState, TrackingStatus};
use hibiscus_shared::Masked;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub driver_id: String,
    /// Replaces the ratio-based payout
    #[serde(default)]
    pub driver_payout: Option<f64>,
    #[serde(default)]
    pub notes_to_driver: Option<String>,
}

/// Result of placing a job offer on a leg
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub booking_id: String,
    pub booking_ref: String,
    pub leg: Leg,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_payout: f64,
    pub acceptance_token: String,
    pub tracking_id: Option<String>,
    pub tracking_status: TrackingStatus,
    pub auto_dispatched: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RespondStatus {
    Accepted,
    Declined,
    AlreadyResponded,
}

#[derive(Debug, Clone, Serialize)]
pub struct RespondOutcome {
    pub status: RespondStatus,
    pub booking_ref: String,
    pub leg: Leg,
}

/// What a driver sees behind the job link.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub booking_id: String,
    pub booking_ref: String,
    pub leg: Leg,
    pub date: NaiveDate,
    pub time: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub passengers: u32,
    pub customer_name: String,
    /// Only shown to a driver holding the current token
    pub customer_phone: Option<Masked<String>>,
    pub driver_payout: Option<f64>,
    pub driver_notes: Option<String>,
    pub driver_accepted: Option<bool>,
    pub state: LegState,
    pub tracking_status: Option<TrackingStatus>,
    pub flight: FlightInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStart {
    pub tracking_id: String,
    pub tracking_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationOutcome {
    pub tracking_id: String,
    pub eta_minutes: Option<i64>,
    /// Whether the proximity SMS has gone out for this trip
    pub sms_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverView {
    pub id: Option<String>,
    pub name: String,
    pub phone: Masked<String>,
    pub vehicle: String,
}

/// Customer-facing tracking view. The live session wins over the snapshot
/// mirrored on the booking.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingInfo {
    pub booking_id: String,
    pub booking_ref: String,
    pub customer_name: String,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub pickup_date: NaiveDate,
    pub pickup_time: String,
    pub tracking_status: Option<TrackingStatus>,
    pub driver: Option<DriverView>,
    pub location: Option<GeoPoint>,
    pub eta_minutes: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub live: bool,
}
