use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use hibiscus_dispatch::{LocationOutcome, TrackingInfo, TrackingStart};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct StartRequest {
    booking_id: String,
    driver_id: String,
}

#[derive(Debug, Deserialize)]
struct LocationRequest {
    booking_id: String,
    driver_id: String,
    lat: f64,
    lng: f64,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/tracking/start", post(start_tracking))
        .route("/tracking/update-location", post(update_location))
        .route("/tracking/stop/{id}", post(stop_tracking))
        .route("/tracking/{reference}", get(tracking_info))
        .route("/tracking/{reference}/stream", get(tracking_stream))
}

async fn start_tracking(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<TrackingStart>, AppError> {
    Ok(Json(state.tracking.start(&req.booking_id, &req.driver_id).await?))
}

async fn update_location(
    State(state): State<AppState>,
    Json(req): Json<LocationRequest>,
) -> Result<Json<LocationOutcome>, AppError> {
    let outcome = state
        .tracking
        .update_location(&req.booking_id, &req.driver_id, req.lat, req.lng)
        .await?;
    Ok(Json(outcome))
}

async fn stop_tracking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.tracking.stop(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn tracking_info(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TrackingInfo>, AppError> {
    Ok(Json(state.tracking.tracking_info(&reference).await?))
}

/// Live position pushes for one booking. Lagged receivers just skip ahead.
async fn tracking_stream(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let booking_id = state.tracking.tracking_info(&reference).await?.booking_id;
    let rx = state.tracking.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let booking_id = booking_id.clone();
        async move {
            match result {
                Ok(event) if event.booking_id == booking_id => Event::default()
                    .event(event.status.clone())
                    .json_data(&event)
                    .ok()
                    .map(Ok::<_, Infallible>),
                _ => None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
