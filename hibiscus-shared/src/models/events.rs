use serde::{Deserialize, Serialize};

/// Broadcast whenever a tracked driver reports a new position or arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdateEvent {
    pub booking_id: String,
    pub tracking_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub eta_minutes: Option<i64>,
    pub status: String,
    pub timestamp: i64,
}
