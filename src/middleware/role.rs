use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;

/// Must run inside `auth_middleware`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let auth_user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    if !auth_user.is_admin {
        tracing::warn!(username = %auth_user.username, "admin access denied");
        return Err(AppError::Forbidden("Admin privileges required".to_string()));
    }

    Ok(next.run(req).await)
}
