use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use hibiscus_core::{CoreError, Driver};
use hibiscus_shared::Masked;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDriverRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub vehicle: Option<String>,
    pub license: Option<String>,
    pub active: Option<bool>,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/drivers", get(list_drivers).post(create_driver))
        .route(
            "/drivers/{id}",
            get(get_driver).put(update_driver).delete(delete_driver),
        )
}

async fn list_drivers(State(state): State<AppState>) -> Result<Json<Vec<Driver>>, AppError> {
    Ok(Json(state.drivers.list().await?))
}

async fn create_driver(
    State(state): State<AppState>,
    Json(req): Json<CreateDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    if req.name.trim().is_empty() || req.phone.trim().is_empty() {
        return Err(AppError::ValidationError("name and phone are required".to_string()));
    }
    let mut driver = Driver::new(req.name, req.phone, req.email);
    driver.vehicle = req.vehicle;
    driver.license = req.license;
    state.drivers.create(&driver).await?;
    info!("Driver created: {} ({})", driver.name, driver.id);
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn load(state: &AppState, id: &str) -> Result<Driver, AppError> {
    let driver = state
        .drivers
        .get(id)
        .await?
        .ok_or_else(|| CoreError::not_found("Driver"))?;
    Ok(driver)
}

async fn get_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(load(&state, &id).await?))
}

async fn update_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    let mut driver = load(&state, &id).await?;
    if let Some(name) = req.name {
        driver.name = name;
    }
    if let Some(phone) = req.phone {
        driver.phone = Masked(phone);
    }
    if let Some(email) = req.email {
        driver.email = Masked(email);
    }
    if req.vehicle.is_some() {
        driver.vehicle = req.vehicle;
    }
    if req.license.is_some() {
        driver.license = req.license;
    }
    if let Some(active) = req.active {
        driver.active = active;
    }
    if !state.drivers.save(&driver).await? {
        return Err(CoreError::not_found("Driver").into());
    }
    info!("Driver updated: {}", id);
    Ok(Json(driver))
}

async fn delete_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.drivers.delete(&id).await? {
        return Err(CoreError::not_found("Driver").into());
    }
    info!("Driver deleted: {}", id);
    Ok(StatusCode::NO_CONTENT)
}
