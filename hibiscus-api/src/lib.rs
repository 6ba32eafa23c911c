use axum::{
    extract::{ConnectInfo, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod integrations;
pub mod middleware;
pub mod payments;
pub mod state;
pub mod tracking;

pub use state::{AppState, AuthConfig};

const RATE_LIMIT_PER_MINUTE: i64 = 100;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let admin = Router::new()
        .merge(bookings::admin_routes())
        .merge(drivers::admin_routes())
        .merge(dispatch::admin_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let api = Router::new()
        .route("/health", get(health))
        .merge(bookings::public_routes())
        .merge(payments::public_routes())
        .merge(dispatch::public_routes())
        .merge(tracking::public_routes())
        .merge(admin);

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Per-IP fixed window in Redis. Fails open when Redis or the peer address
/// is unavailable.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let (Some(redis), Some(ConnectInfo(addr))) = (
        state.redis.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().cloned(),
    ) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match redis.check_rate_limit(&key, RATE_LIMIT_PER_MINUTE, 60).await {
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Ok(true) => next.run(req).await,
        Err(e) => {
            tracing::warn!("Rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
