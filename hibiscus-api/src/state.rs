use hibiscus_booking::BookingManager;
use hibiscus_core::repository::DriverRepository;
use hibiscus_dispatch::{DispatchService, TrackingService};
use hibiscus_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingManager>,
    pub dispatch: Arc<DispatchService>,
    pub tracking: Arc<TrackingService>,
    pub drivers: Arc<dyn DriverRepository>,
    /// Rate limiting is skipped when absent
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
}
