pub mod models;
pub mod notify;
pub mod payment;
pub mod reference;
pub mod repository;
pub mod routing;

pub use models::{
    Booking, BookingStatus, DispatchLeg, Driver, GeoPoint, Leg, LegState, PaymentStatus,
    SessionStatus, TrackingSession, TrackingStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Recently sent, retry in {minutes_remaining} minute(s)")]
    RateLimited { minutes_remaining: i64 },
    #[error("No drivers available")]
    NoDriversAvailable,
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        CoreError::UpstreamUnavailable(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        CoreError::Storage(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
