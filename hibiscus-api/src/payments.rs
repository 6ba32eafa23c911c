use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use hibiscus_booking::PaymentStatusView;
use hibiscus_core::payment::CheckoutSession;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    booking_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/payment/create-checkout", post(create_checkout))
        .route("/payment/status/{id}", get(payment_status))
        .route("/webhook/stripe", post(stripe_webhook))
}

async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, AppError> {
    Ok(Json(state.bookings.create_checkout(&req.booking_id).await?))
}

async fn payment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentStatusView>, AppError> {
    Ok(Json(state.bookings.payment_status(&id).await?))
}

/// POST /api/webhook/stripe
///
/// Only `checkout.session.completed` is acted on. The session is re-read
/// from Stripe before the booking is confirmed.
async fn stripe_webhook(
    State(state): State<AppState>,
    Json(payload): Json<StripeWebhook>,
) -> Result<StatusCode, AppError> {
    info!("Received webhook {}: {} for {}", payload.id, payload.type_, payload.data.object.id);

    if payload.type_ == "checkout.session.completed" {
        if let Some(booking) = state.bookings.confirm_checkout(&payload.data.object.id).await? {
            info!("Booking {} marked as paid via webhook", booking.booking_ref);
        }
    }
    Ok(StatusCode::OK)
}
