//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User database model
///
/// Deliberately not serializable: API responses go through [`PublicUser`],
/// which cannot carry the password hash or pending token columns.
#[derive(FromRow, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: String,
    pub provider_id: Option<String>,
    pub email_verified_at: Option<String>,
    pub verification_token: Option<String>,
    pub verification_token_expires: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub last_login_at: Option<String>,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// The user shape exposed by the API
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: String,
    pub email_verified: bool,
    pub created_at: Option<String>,
    pub last_login_at: Option<String>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar_url: user.avatar_url.clone(),
            provider: user.provider.clone(),
            email_verified: user.email_verified_at.is_some(),
            created_at: user.created_at.clone(),
            last_login_at: user.last_login_at.clone(),
        }
    }
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

/// POST /api/auth/signup request body
#[derive(Deserialize, Debug)]
pub struct SignupPayload {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// POST /api/auth/signin request body
#[derive(Deserialize, Debug)]
pub struct SigninPayload {
    pub email: String,
    pub password: String,
}

/// Google ID token payload for OAuth
///
/// The field is optional so a missing token gets a specific message
/// instead of a deserialization rejection.
#[derive(Deserialize)]
pub struct GoogleIdTokenPayload {
    pub id_token: Option<String>,
}

/// Body carrying a refresh token (refresh and signout)
#[derive(Deserialize, Debug)]
pub struct RefreshTokenPayload {
    pub refresh_token: Option<String>,
}

/// GET /api/auth/verify-email query string
#[derive(Deserialize, Debug)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

/// POST /api/auth/reset-password request body
#[derive(Deserialize, Debug)]
pub struct EmailPayload {
    pub email: String,
}

/// POST /api/auth/reset-password/confirm request body
#[derive(Deserialize, Debug)]
pub struct ResetConfirmPayload {
    pub token: Option<String>,
    pub new_password: Option<String>,
}

/// POST /api/auth/update-password request body
#[derive(Deserialize, Debug)]
pub struct UpdatePasswordPayload {
    pub new_password: Option<String>,
}

/// Token pair plus the user it belongs to
#[derive(Serialize, Deserialize, Debug)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Envelope returned by signup, signin, and google sign-in
#[derive(Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub session: Session,
}

/// POST /api/auth/refresh response
#[derive(Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Simple acknowledgement body
#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /api/auth/verify-email success response
#[derive(Serialize, Deserialize, Debug)]
pub struct VerifiedResponse {
    pub message: String,
    pub user: PublicUser,
}
