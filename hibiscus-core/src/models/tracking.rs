use chrono::{DateTime, Utc};
use hibiscus_shared::Masked;
use serde::{Deserialize, Serialize};

use super::booking::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    PendingAcceptance,
    Active,
    Arrived,
}

/// Ephemeral live-tracking state for one (booking, driver) pair.
///
/// Driver and customer details are captured when the session starts so the
/// tracking view never needs a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub tracking_id: String,
    pub booking_id: String,
    pub booking_ref: String,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_phone: Masked<String>,
    pub vehicle: String,
    pub pickup_address: String,
    pub customer_name: String,
    pub customer_phone: Masked<String>,
    pub started_at: DateTime<Utc>,
    pub last_location: Option<GeoPoint>,
    pub current_eta_minutes: Option<i64>,
    /// One-shot flag for the "driver is near" SMS
    pub proximity_sms_sent: bool,
    pub status: SessionStatus,
}

impl TrackingSession {
    pub fn matches(&self, booking_id: &str, driver_id: &str) -> bool {
        self.booking_id == booking_id && self.driver_id == driver_id
    }
}
