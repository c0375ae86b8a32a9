use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::entities::{refresh_token, user};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub exp: usize,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalServerError(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "stored password hash is not a valid PHC string");
            false
        }
    }
}

pub fn issue_access_token(user: &user::Model, config: &Config) -> Result<String, AppError> {
    let exp = chrono::Utc::now() + chrono::Duration::minutes(config.access_token_expire_minutes);
    let claims = Claims {
        sub: user.id.to_string(),
        exp: exp.timestamp() as usize,
        username: user.username.clone(),
        is_admin: user.is_admin,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {e}")))
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected access token");
        AppError::Unauthorized("Could not validate credentials".to_string())
    })
}

pub fn generate_refresh_token() -> String {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill(&mut random_bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Refresh tokens are only ever stored as this digest.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issues an access token and persists a fresh refresh token for `user`.
pub async fn issue_token_pair<C: ConnectionTrait>(
    db: &C,
    user: &user::Model,
    config: &Config,
) -> Result<TokenPair, AppError> {
    let access_token = issue_access_token(user, config)?;
    let refresh_token = generate_refresh_token();
    let now = chrono::Utc::now().naive_utc();

    refresh_token::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        token_hash: Set(hash_token(&refresh_token)),
        expires_at: Set(now + chrono::Duration::days(config.refresh_token_expire_days)),
        created_at: Set(now),
        revoked: Set(false),
    }
    .insert(db)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "bearer".to_string(),
        expires_in: config.access_token_expire_minutes * 60,
    })
}

/// Marks a refresh token revoked. Returns `false` when it already was, so
/// only one caller can ever rotate a given token.
pub async fn revoke_refresh_token<C: ConnectionTrait>(db: &C, token_id: Uuid) -> Result<bool, DbErr> {
    let result = refresh_token::Entity::update_many()
        .col_expr(refresh_token::Column::Revoked, Expr::value(true))
        .filter(refresh_token::Column::Id.eq(token_id))
        .filter(refresh_token::Column::Revoked.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_admin: bool) -> user::Model {
        let now = chrono::Utc::now().naive_utc();
        user::Model {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            password: String::new(),
            is_active: true,
            is_admin,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn access_token_carries_identity() {
        let config = Config::default();
        let user = user(true);
        let token = issue_access_token(&user, &config).unwrap();

        let claims = decode_access_token(&token, &config.jwt_secret).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.username, "ada");
        assert!(claims.is_admin);

        assert!(matches!(
            decode_access_token(&token, "another-secret"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let config = Config {
            access_token_expire_minutes: -10,
            ..Config::default()
        };
        let token = issue_access_token(&user(false), &config).unwrap();
        assert!(decode_access_token(&token, &config.jwt_secret).is_err());
    }

    #[test]
    fn refresh_tokens_are_random_and_hashed() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_eq!(hash_token(&a).len(), 64);
    }

    #[tokio::test]
    async fn refresh_token_can_only_be_revoked_once() {
        let db = crate::test_support::setup_db().await;
        let user = crate::test_support::create_user(&db, "ada", false).await;
        let pair = issue_token_pair(&db, &user, &Config::default()).await.unwrap();
        let stored = refresh_token::Entity::find()
            .filter(refresh_token::Column::TokenHash.eq(hash_token(&pair.refresh_token)))
            .one(&db)
            .await
            .unwrap()
            .unwrap();

        assert!(revoke_refresh_token(&db, stored.id).await.unwrap());
        assert!(!revoke_refresh_token(&db, stored.id).await.unwrap());

        let reloaded = refresh_token::Entity::find_by_id(stored.id).one(&db).await.unwrap().unwrap();
        assert!(reloaded.revoked);
    }
}
