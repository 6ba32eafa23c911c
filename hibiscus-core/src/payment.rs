use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub booking_id: String,
    pub product_name: String,
    pub description: String,
    /// Smallest currency unit
    pub amount_cents: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Provider-side state of a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub session_id: String,
    /// Taken from the session metadata
    pub booking_id: Option<String>,
    pub paid: bool,
}

/// Hosted checkout provider. Capture happens on the provider's side and is
/// reported back through a webhook.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> CoreResult<CheckoutSession>;

    /// Re-read a session from the provider. Webhook payloads are never
    /// trusted on their own.
    async fn fetch_checkout_session(&self, session_id: &str) -> CoreResult<CheckoutOutcome>;
}
