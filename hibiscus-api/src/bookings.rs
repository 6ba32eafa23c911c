use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use hibiscus_booking::{
    BookingUpdate, NewBooking, PaymentLinkOutcome, PriceRequest, ReminderReport, ResendOutcome,
};
use hibiscus_core::{Booking, BookingStatus, PaymentStatus};
use hibiscus_notify::Channel;
use hibiscus_pricing::PriceBreakdown;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::middleware::AdminClaims;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CreatedBooking {
    id: String,
    booking_ref: String,
    total_price: f64,
    status: BookingStatus,
    payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
struct StatusPatch {
    #[serde(default)]
    status: Option<BookingStatus>,
    #[serde(default)]
    payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct ResendQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ReminderQuery {
    /// Defaults to tomorrow in business time
    #[serde(default)]
    date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct PendingReminders {
    date: NaiveDate,
    bookings: Vec<Booking>,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/calculate-price", post(calculate_price))
        .route("/bookings", post(create_booking))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings))
        .route("/admin/bookings", post(admin_create_booking))
        .route(
            "/bookings/{id}",
            get(get_booking)
                .put(update_booking)
                .patch(patch_status)
                .delete(delete_booking),
        )
        .route("/bookings/deleted/list", get(list_deleted))
        .route("/bookings/restore/{id}", post(restore_booking))
        .route("/bookings/permanent/{id}", axum::routing::delete(purge_booking))
        .route("/bookings/{id}/duplicate", post(duplicate_booking))
        .route("/bookings/{id}/resend-email", post(resend_email))
        .route("/bookings/{id}/resend-sms", post(resend_sms))
        .route("/bookings/{id}/resend-all", post(resend_all))
        .route("/bookings/{id}/send-payment-link", post(send_payment_link))
        .route("/reminders/pending", get(pending_reminders))
        .route("/reminders/send-tomorrow", post(send_reminders))
}

async fn calculate_price(
    State(state): State<AppState>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<PriceBreakdown>, AppError> {
    let quote = state.bookings.quote(&req).await?;
    Ok(Json(quote))
}

/// Customer form. Status, payment and fare always come from the server.
async fn create_booking(
    State(state): State<AppState>,
    Json(mut req): Json<NewBooking>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    req.status = BookingStatus::Pending;
    req.payment_status = PaymentStatus::Unpaid;
    req.total_price = None;
    created(state.bookings.create_booking(req).await?)
}

async fn admin_create_booking(
    State(state): State<AppState>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    created(state.bookings.create_booking(req).await?)
}

fn created(booking: Booking) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    Ok((
        StatusCode::CREATED,
        Json(CreatedBooking {
            id: booking.id,
            booking_ref: booking.booking_ref,
            total_price: booking.total_price,
            status: booking.status,
            payment_status: booking.payment_status,
        }),
    ))
}

async fn list_bookings(State(state): State<AppState>) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_bookings().await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(&id).await?))
}

async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<BookingUpdate>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.update_booking(&id, update).await?))
}

async fn patch_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<StatusPatch>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .update_status(&id, patch.status, patch.payment_status)
        .await?;
    Ok(Json(booking))
}

async fn delete_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let deleted = state.bookings.delete_booking(&id, claims.actor()).await?;
    Ok(Json(deleted))
}

async fn list_deleted(State(state): State<AppState>) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_deleted().await?))
}

async fn restore_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.restore_booking(&id).await?))
}

async fn purge_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.bookings.purge_booking(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn duplicate_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let copy = state.bookings.duplicate_booking(&id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

async fn resend(state: &AppState, id: &str, channel: Channel, force: bool) -> Result<Json<ResendOutcome>, AppError> {
    let outcome = state.bookings.resend_notification(id, channel, force).await?;
    info!("Resend {} for {}: {:?}", channel, outcome.booking_ref, outcome.channels_sent);
    Ok(Json(outcome))
}

async fn resend_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ResendQuery>,
) -> Result<Json<ResendOutcome>, AppError> {
    resend(&state, &id, Channel::Email, q.force).await
}

async fn resend_sms(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ResendQuery>,
) -> Result<Json<ResendOutcome>, AppError> {
    resend(&state, &id, Channel::Sms, q.force).await
}

async fn resend_all(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ResendQuery>,
) -> Result<Json<ResendOutcome>, AppError> {
    resend(&state, &id, Channel::Both, q.force).await
}

async fn send_payment_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentLinkOutcome>, AppError> {
    Ok(Json(state.bookings.send_payment_link(&id).await?))
}

async fn pending_reminders(
    State(state): State<AppState>,
    Query(q): Query<ReminderQuery>,
) -> Result<Json<PendingReminders>, AppError> {
    let date = q
        .date
        .unwrap_or_else(|| state.bookings.business_tomorrow(Utc::now()));
    let bookings = state.bookings.pending_reminders(date).await?;
    Ok(Json(PendingReminders { date, bookings }))
}

async fn send_reminders(
    State(state): State<AppState>,
    Query(q): Query<ReminderQuery>,
) -> Result<Json<ReminderReport>, AppError> {
    let date = q
        .date
        .unwrap_or_else(|| state.bookings.business_tomorrow(Utc::now()));
    Ok(Json(state.bookings.send_reminders(date).await?))
}
