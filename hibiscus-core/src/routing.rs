use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::CoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Driving-time estimate from a live position to an address
#[async_trait]
pub trait RouteEstimator: Send + Sync {
    async fn eta_minutes(&self, from: Coordinates, to_address: &str) -> CoreResult<i64>;
}

/// Road distance between two addresses, in km
#[async_trait]
pub trait DistanceLookup: Send + Sync {
    async fn distance_km(&self, origin: &str, destination: &str) -> CoreResult<f64>;
}
