// src/services/tokens.rs
//! Access and refresh token management.
//!
//! Access tokens are stateless signed claims: nothing is stored, so they
//! cannot be revoked before expiry. The short lifetime bounds that window.
//! Refresh tokens are signed with a separate secret AND backed by a database
//! row; revocation flips the row, which is the kill switch for a session.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::{generate_token_id, safe_token_log, ApiError};

/// Lifetime of a stateless access token
pub const ACCESS_TOKEN_MINUTES: i64 = 15;
/// Lifetime of a refresh token
pub const REFRESH_TOKEN_DAYS: i64 = 7;

/// Revoked rows older than this are eligible for deletion by the sweep task
const SWEEP_REVOKED_AFTER_DAYS: i64 = 30;

/// Format matching SQLite's datetime('now') output, so stored expiries
/// compare correctly against it
const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Invalid,

    #[error("Token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => {
                ApiError::Unauthorized("Invalid or expired refresh token".to_string())
            }
            TokenError::Encoding(e) => {
                error!(error = %e, "JWT encoding error");
                ApiError::InternalServer("jwt error".to_string())
            }
            TokenError::Database(e) => ApiError::DatabaseError(e),
        }
    }
}

/// Claims carried by a short-lived access token
#[derive(Serialize, Deserialize, Debug)]
pub struct AccessClaims {
    pub sub: String,
    pub exp: usize,
}

/// Claims carried by a refresh token. `jti` is a random per-issuance
/// identifier so two tokens minted for the same user in the same second
/// still differ.
#[derive(Serialize, Deserialize, Debug)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub exp: usize,
}

#[derive(Debug)]
pub struct TokenService {
    db: SqlitePool,
    jwt_secret: String,
    jwt_refresh_secret: String,
}

impl TokenService {
    pub fn new(db: SqlitePool, jwt_secret: String, jwt_refresh_secret: String) -> Self {
        Self {
            db,
            jwt_secret,
            jwt_refresh_secret,
        }
    }

    /// Issue a short-lived access token for a user
    pub fn issue_access_token(&self, user_id: &str) -> Result<String, TokenError> {
        let exp = (Utc::now() + Duration::minutes(ACCESS_TOKEN_MINUTES)).timestamp() as usize;
        let claims = AccessClaims {
            sub: user_id.to_string(),
            exp,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(TokenError::Encoding)
    }

    /// Decode and validate an access token, returning its claims
    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let decoded = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            debug!(error = %e, "Access token validation failed");
            TokenError::Invalid
        })?;

        Ok(decoded.claims)
    }

    /// Issue a refresh token for a user and record it
    ///
    /// A user may hold any number of outstanding refresh tokens, one per
    /// signed-in device.
    pub async fn issue_refresh_token(&self, user_id: &str) -> Result<String, TokenError> {
        let expires = Utc::now() + Duration::days(REFRESH_TOKEN_DAYS);
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: expires.timestamp() as usize,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_refresh_secret.as_bytes()),
        )
        .map_err(TokenError::Encoding)?;

        let id = generate_token_id();
        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&token)
        .bind(expires.format(SQLITE_DATETIME_FORMAT).to_string())
        .execute(&self.db)
        .await?;

        debug!(user_id = %user_id, token_id = %id, "Refresh token issued");
        Ok(token)
    }

    /// Validate a refresh token and return the user id it belongs to
    ///
    /// Malformed, tampered, expired, revoked, and unknown tokens all fail
    /// with the same error.
    pub async fn validate_refresh_token(&self, token: &str) -> Result<String, TokenError> {
        let decoded = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_refresh_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            debug!(
                error = %e,
                token = %safe_token_log(token),
                "Refresh token signature validation failed"
            );
            TokenError::Invalid
        })?;

        let user_id = decoded.claims.sub;

        // A valid signature is not enough: the backing row must still be
        // active (not revoked, not past its stored expiry)
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM refresh_tokens
            WHERE token = ? AND user_id = ? AND revoked_at IS NULL AND expires_at > datetime('now')
            "#,
        )
        .bind(token)
        .bind(&user_id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(_) => Ok(user_id),
            None => {
                debug!(
                    token = %safe_token_log(token),
                    "Refresh token not usable (revoked, expired, or unknown)"
                );
                Err(TokenError::Invalid)
            }
        }
    }

    /// Revoke a single refresh token
    ///
    /// Idempotent: revoking an already-revoked or unknown token is a no-op
    /// success, and the original revocation timestamp is preserved.
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<(), TokenError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = datetime('now') WHERE token = ? AND revoked_at IS NULL",
        )
        .bind(token)
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            info!(token = %safe_token_log(token), "Refresh token revoked");
        } else {
            debug!(
                token = %safe_token_log(token),
                "Refresh token already revoked or unknown"
            );
        }

        Ok(())
    }

    /// Revoke every active refresh token a user holds (sign out everywhere)
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, TokenError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = datetime('now') WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        let revoked = result.rows_affected();
        if revoked > 0 {
            info!(user_id = %user_id, revoked = revoked, "Revoked all refresh tokens for user");
        }

        Ok(revoked)
    }

    /// Count a user's currently usable refresh tokens
    pub async fn count_active_for_user(&self, user_id: &str) -> Result<i64, TokenError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ? AND revoked_at IS NULL AND expires_at > datetime('now')",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Count all currently usable refresh tokens
    pub async fn count_active(&self) -> Result<i64, TokenError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM refresh_tokens WHERE revoked_at IS NULL AND expires_at > datetime('now')",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Delete rows that can never validate again: expired tokens, and
    /// revoked tokens past the retention window
    pub async fn sweep_expired(&self) -> Result<u64, TokenError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE expires_at <= datetime('now')
               OR (revoked_at IS NOT NULL AND revoked_at <= datetime('now', ?))
            "#,
        )
        .bind(format!("-{} days", SWEEP_REVOKED_AFTER_DAYS))
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Spawn the periodic sweep of unusable refresh token rows
    pub fn start_sweep_task(service: Arc<TokenService>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match service.sweep_expired().await {
                    Ok(removed) if removed > 0 => {
                        info!(removed = removed, "Swept unusable refresh tokens");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Refresh token sweep failed");
                    }
                }
            }
        });
    }
}
