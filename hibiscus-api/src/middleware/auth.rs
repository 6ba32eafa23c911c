use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Claims of an admin token. Tokens are issued elsewhere and only verified here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

impl AdminClaims {
    /// Name recorded on audit stamps such as `deleted_by`
    pub fn actor(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.sub)
    }
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<AdminClaims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if token_data.claims.role != "ADMIN" && token_data.claims.role != "SUPER_ADMIN" {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
