use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{refresh_token, user};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::services::auth::{self as auth_service, TokenPair};
use crate::services::jobs::JobService;
use crate::state::AppState;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: chrono::NaiveDateTime,
    pub daily_usage: i32,
    pub daily_limit: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

fn validate_registration(payload: &RegisterRequest) -> Result<(), AppError> {
    let email = payload.email.trim();
    let valid_email = email.len() <= 255
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid_email {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    let username_len = payload.username.trim().chars().count();
    if !(3..=50).contains(&username_len) {
        return Err(AppError::BadRequest(
            "username must be between 3 and 50 characters".to_string(),
        ));
    }

    let password_len = payload.password.chars().count();
    if !(8..=100).contains(&password_len) {
        return Err(AppError::BadRequest(
            "password must be between 8 and 100 characters".to_string(),
        ));
    }
    Ok(())
}

async fn profile(state: &AppState, user: user::Model) -> Result<UserProfile, AppError> {
    let daily_usage = JobService::daily_usage(&state.db, user.id).await?;
    Ok(UserProfile {
        id: user.id,
        email: user.email,
        username: user.username,
        is_active: user.is_active,
        is_admin: user.is_admin,
        created_at: user.created_at,
        daily_usage,
        daily_limit: state.config.daily_generation_limit,
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input, email registered or username taken", body = crate::error::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_registration(&payload)?;
    let email = payload.email.trim().to_lowercase();
    let username = payload.username.trim().to_string();

    let email_taken = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(&state.db)
        .await?
        .is_some();
    if email_taken {
        return Err(AppError::BadRequest("Email already registered".to_string()));
    }

    let username_taken = user::Entity::find()
        .filter(user::Column::Username.eq(&username))
        .one(&state.db)
        .await?
        .is_some();
    if username_taken {
        return Err(AppError::BadRequest("Username already taken".to_string()));
    }

    let now = chrono::Utc::now().naive_utc();
    let user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        username: Set(username),
        password: Set(auth_service::hash_password(&payload.password)?),
        is_active: Set(true),
        is_admin: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    let tokens = auth_service::issue_token_pair(&state.db, &user, &state.config).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "registered user");

    let user = profile(&state, user).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = payload.email.trim().to_lowercase();
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            tracing::info!(email = %email, "login for unknown email");
            invalid()
        })?;

    if !auth_service::verify_password(&payload.password, &user.password) {
        tracing::info!(user_id = %user.id, "password verification failed");
        return Err(invalid());
    }
    if !user.is_active {
        tracing::info!(user_id = %user.id, "login for inactive user");
        return Err(invalid());
    }

    let tokens = auth_service::issue_token_pair(&state.db, &user, &state.config).await?;
    tracing::info!(user_id = %user.id, "user logged in");

    let user = profile(&state, user).await?;
    Ok(Json(AuthResponse { user, tokens }))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair; the presented refresh token is revoked", body = TokenPair),
        (status = 401, description = "Invalid, revoked or expired refresh token", body = crate::error::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let token_hash = auth_service::hash_token(&payload.refresh_token);
    let txn = state.db.begin().await?;

    let token = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(&token_hash))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token. Please re-login.".to_string()))?;

    if token.revoked {
        return Err(AppError::Unauthorized("User logged out. Please re-login.".to_string()));
    }
    if token.expires_at < chrono::Utc::now().naive_utc() {
        return Err(AppError::Unauthorized("Refresh token expired. Please re-login.".to_string()));
    }

    let user = user::Entity::find_by_id(token.user_id)
        .one(&txn)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found. Please re-login.".to_string()))?;

    if !auth_service::revoke_refresh_token(&txn, token.id).await? {
        return Err(AppError::Unauthorized("User logged out. Please re-login.".to_string()));
    }

    let tokens = auth_service::issue_token_pair(&txn, &user, &state.config).await?;
    txn.commit().await?;

    tracing::info!(user_id = %user.id, "rotated refresh token");
    Ok(Json(tokens))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Logged out successfully", body = MessageResponse),
        (status = 404, description = "Refresh token not found", body = crate::error::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let token_hash = auth_service::hash_token(&payload.refresh_token);

    let token = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(&token_hash))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Refresh token not found".to_string()))?;

    let user_id = token.user_id;
    let mut active_token: refresh_token::ActiveModel = token.into();
    active_token.revoked = Set(true);
    active_token.update(&state.db).await?;

    tracing::info!(user_id = %user_id, "refresh token revoked");
    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user with today's usage", body = UserProfile),
        (status = 401, description = "Unauthorized - Invalid or missing token", body = crate::error::ErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Authentication"
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<UserProfile>, AppError> {
    let user = user::Entity::find_by_id(auth_user.id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    Ok(Json(profile(&state, user).await?))
}
