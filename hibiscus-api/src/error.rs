use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hibiscus_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    TooManyRequests(String),
    ServiceUnavailable(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::NotFound(_) => AppError::NotFoundError(message),
            CoreError::Unauthorized(_) => AppError::AuthenticationError(message),
            CoreError::Conflict(_) | CoreError::NoDriversAvailable => AppError::ConflictError(message),
            CoreError::RateLimited { .. } => AppError::TooManyRequests(message),
            CoreError::UpstreamUnavailable(_) => AppError::ServiceUnavailable(message),
            CoreError::Validation(_) => AppError::ValidationError(message),
            CoreError::Storage(_) => AppError::InternalServerError(message),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status() {
        let cases = [
            (CoreError::not_found("Booking"), StatusCode::NOT_FOUND),
            (CoreError::Unauthorized("token".into()), StatusCode::UNAUTHORIZED),
            (CoreError::NoDriversAvailable, StatusCode::CONFLICT),
            (CoreError::RateLimited { minutes_remaining: 3 }, StatusCode::TOO_MANY_REQUESTS),
            (CoreError::upstream("stripe"), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::Validation("date".into()), StatusCode::BAD_REQUEST),
            (CoreError::storage("pool closed"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
