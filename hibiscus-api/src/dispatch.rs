use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use hibiscus_core::{Driver, Leg};
use hibiscus_dispatch::{AssignRequest, Assignment, JobView, RespondOutcome};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct UnassignRequest {
    #[serde(default, alias = "trip_type")]
    leg: Leg,
}

#[derive(Debug, Serialize)]
struct Unassigned {
    booking_ref: String,
    leg: Leg,
}

#[derive(Debug, Deserialize)]
struct JobQuery {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    leg: Leg,
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    token: String,
    accepted: bool,
    #[serde(default)]
    decline_reason: Option<String>,
    #[serde(default)]
    leg: Leg,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/driver/job/{id}", get(job_details))
        .route("/driver/job/{id}/respond", post(respond))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings/{id}/available-drivers", get(available_drivers))
        .route("/bookings/{id}/assign-driver", post(assign_driver))
        .route("/bookings/{id}/assign-return-driver", post(assign_return_driver))
        .route("/bookings/{id}/unassign-driver", post(unassign_driver))
        .route("/bookings/{id}/auto-dispatch", post(auto_dispatch))
}

async fn available_drivers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Driver>>, AppError> {
    Ok(Json(state.dispatch.available_drivers(&id).await?))
}

async fn assign_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(state.dispatch.assign(&id, Leg::Outbound, &req).await?))
}

async fn assign_return_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(state.dispatch.assign(&id, Leg::Return, &req).await?))
}

async fn unassign_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UnassignRequest>,
) -> Result<Json<Unassigned>, AppError> {
    let leg = req.leg;
    let booking_ref = state.dispatch.unassign(&id, leg).await?;
    Ok(Json(Unassigned { booking_ref, leg }))
}

async fn auto_dispatch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Assignment>, AppError> {
    Ok(Json(state.dispatch.auto_dispatch(&id).await?))
}

async fn job_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<JobQuery>,
) -> Result<Json<JobView>, AppError> {
    let view = state
        .dispatch
        .job_details(&id, q.leg, q.token.as_deref())
        .await?;
    Ok(Json(view))
}

async fn respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondOutcome>, AppError> {
    let outcome = state
        .dispatch
        .respond(&id, req.leg, &req.token, req.accepted, req.decline_reason)
        .await?;
    Ok(Json(outcome))
}
