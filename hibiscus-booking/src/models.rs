use chrono::NaiveDate;
use hibiscus_core::models::{FlightInfo, ServiceOptions};
use hibiscus_core::{BookingStatus, PaymentStatus};
use hibiscus_notify::Channel;
use hibiscus_pricing::PriceBreakdown;
use hibiscus_shared::Masked;
use serde::{Deserialize, Serialize};

fn one() -> u32 {
    1
}

/// Fare quote input. Either a known distance or both addresses.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRequest {
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub dropoff_address: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default = "one")]
    pub passengers: u32,
    #[serde(default)]
    pub vip_pickup: bool,
    #[serde(default)]
    pub oversized_luggage: bool,
}

/// Booking intake from the public form or the admin dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    pub pickup_address: String,
    pub dropoff_address: String,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default = "one")]
    pub passengers: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub options: ServiceOptions,
    #[serde(default)]
    pub flight: FlightInfo,
    /// Skips the distance lookup when already known
    #[serde(default)]
    pub distance_km: Option<f64>,
    /// Admin override of the computed fare
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingUpdate {
    pub name: Option<String>,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
    pub pickup_address: Option<String>,
    pub dropoff_address: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub passengers: Option<u32>,
    pub notes: Option<String>,
    pub service_type: Option<String>,
    pub options: Option<ServiceOptions>,
    pub flight: Option<FlightInfo>,
    pub pricing: Option<PriceBreakdown>,
    pub total_price: Option<f64>,
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResendOutcome {
    pub booking_ref: String,
    pub channels_sent: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLinkOutcome {
    pub payment_url: String,
    /// Whether the link reached the customer on at least one channel
    pub delivered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub booking_id: String,
    pub booking_ref: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReminderReport {
    pub sent: Vec<String>,
    pub failed: Vec<String>,
}
