use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::auth::decode_access_token;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || AppError::Unauthorized("Not authenticated".to_string());

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(unauthorized)?;
    let token = auth_header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

    let claims = decode_access_token(token, &state.config.jwt_secret)?;
    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Could not validate credentials".to_string()))?;

    req.extensions_mut().insert(AuthUser {
        id,
        username: claims.username,
        is_admin: claims.is_admin,
    });

    Ok(next.run(req).await)
}
