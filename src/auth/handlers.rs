//! Authentication handlers

use axum::extract::{Extension, Json, Query};
use axum::http::StatusCode;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::extractors::AuthedUser;
use super::models::{
    EmailPayload, GoogleIdTokenPayload, MessageResponse, PublicUser, RefreshResponse,
    RefreshTokenPayload, ResetConfirmPayload, Session, SessionResponse, SigninPayload,
    SignupPayload, UpdatePasswordPayload, User, VerifiedResponse, VerifyEmailQuery,
};
use super::validators::{SigninValidator, SignupValidator};
use crate::common::{safe_email_log, ApiError, AppState, Validator};

/// POST /api/auth/signup
/// Creates a local email/password account and signs it in
///
/// # Request Body
/// ```json
/// {
///   "email": "user@example.com",
///   "password": "<min 8 chars>",
///   "full_name": "Optional Name"
/// }
/// ```
///
/// # Response (201)
/// ```json
/// {
///   "session": {
///     "access_token": "<jwt>",
///     "refresh_token": "<jwt>",
///     "user": { ... }
///   }
/// }
/// ```
pub async fn signup(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<SignupPayload>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let state = state_lock.read().await.clone();

    let validation_result = SignupValidator.validate(&payload);
    if !validation_result.is_valid {
        warn!(
            errors = ?validation_result.errors,
            "Sign-up validation failed"
        );
        return Err(ApiError::from(validation_result));
    }

    let (user, verification_token) = state
        .user_store
        .create_local_user(&payload.email, &payload.password, payload.full_name.as_deref())
        .await?;

    // Verification email is best effort; the account exists either way and
    // the token can be resent later
    let email_service = state.email_service.clone();
    let to = user.email.clone();
    let name = user.full_name.clone();
    tokio::spawn(async move {
        if let Err(e) = email_service
            .send_verification_email(&to, name.as_deref(), &verification_token)
            .await
        {
            warn!(
                error = %e,
                email = %safe_email_log(&to),
                "Failed to send verification email after sign-up"
            );
        }
    });

    let session = issue_session(&state, &user).await?;

    info!(
        user_id = %user.id,
        email = %safe_email_log(&user.email),
        "User signed up"
    );

    Ok((StatusCode::CREATED, Json(SessionResponse { session })))
}

/// POST /api/auth/signin
/// Email/password sign-in
///
/// Bad email and bad password produce the same response, so callers cannot
/// probe which emails have accounts.
pub async fn signin(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<SigninPayload>,
) -> Result<Json<SessionResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let validation_result = SigninValidator.validate(&payload);
    if !validation_result.is_valid {
        warn!(
            errors = ?validation_result.errors,
            "Sign-in validation failed"
        );
        return Err(ApiError::from(validation_result));
    }

    let user = match state
        .user_store
        .verify_password(&payload.email, &payload.password)
        .await?
    {
        Some(user) => user,
        None => {
            warn!(
                email = %safe_email_log(&payload.email),
                "Sign-in failed: bad credentials"
            );
            return Err(ApiError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }
    };

    state.user_store.update_last_login(&user.id).await?;

    let session = issue_session(&state, &user).await?;

    info!(
        user_id = %user.id,
        email = %safe_email_log(&user.email),
        "User signed in"
    );

    Ok(Json(SessionResponse { session }))
}

/// POST /api/auth/google
/// Authenticates a user via Google OAuth ID token
///
/// # Request Body
/// ```json
/// {
///   "id_token": "<google id token>"
/// }
/// ```
pub async fn google_auth(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<GoogleIdTokenPayload>,
) -> Result<Json<SessionResponse>, ApiError> {
    info!("🔐 Received Google auth request");
    let state = state_lock.read().await.clone();

    let id_token = match payload.id_token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err(ApiError::ValidationError(
                "Google ID token is required".to_string(),
            ))
        }
    };

    let profile = state.google_service.verify_id_token(&id_token).await?;

    let user = state
        .user_store
        .find_or_create_oauth_user(
            "google",
            &profile.provider_id,
            &profile.email,
            profile.full_name.as_deref(),
            profile.avatar_url.as_deref(),
        )
        .await?;

    state.user_store.update_last_login(&user.id).await?;

    let session = issue_session(&state, &user).await?;

    info!(
        user_id = %user.id,
        email = %safe_email_log(&user.email),
        provider = "google",
        "User authentication successful via Google OAuth"
    );

    Ok(Json(SessionResponse { session }))
}

/// POST /api/auth/refresh
/// Exchanges a live refresh token for a fresh access token
///
/// The refresh token itself is not rotated; it stays valid until it expires
/// or is revoked.
pub async fn refresh(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<RefreshTokenPayload>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let refresh_token = match payload.refresh_token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err(ApiError::ValidationError(
                "Refresh token required".to_string(),
            ))
        }
    };

    let user_id = state
        .token_service
        .validate_refresh_token(&refresh_token)
        .await?;

    let access_token = state.token_service.issue_access_token(&user_id)?;

    Ok(Json(RefreshResponse { access_token }))
}

/// POST /api/auth/signout
/// Revokes the supplied refresh token, if any
///
/// Always succeeds: the client is signing out whether or not the token was
/// known, live, or present at all.
pub async fn signout(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    payload: Option<Json<RefreshTokenPayload>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    if let Some(refresh_token) = payload.and_then(|Json(p)| p.refresh_token) {
        if let Err(e) = state.token_service.revoke_refresh_token(&refresh_token).await {
            error!(error = %e, "Failed to revoke refresh token during sign-out");
        }
    }

    info!("User signed out");

    Ok(Json(MessageResponse {
        message: "Signed out successfully".to_string(),
    }))
}

/// GET /api/auth/verify-email?token=
/// Consumes an email verification token
pub async fn verify_email(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let token = match query.token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err(ApiError::ValidationError(
                "Verification token required".to_string(),
            ))
        }
    };

    let user = match state.user_store.consume_verification_token(&token).await? {
        Some(user) => user,
        None => {
            return Err(ApiError::ValidationError(
                "Invalid or expired verification token".to_string(),
            ))
        }
    };

    Ok(Json(VerifiedResponse {
        message: "Email verified successfully".to_string(),
        user: PublicUser::from(user),
    }))
}

/// POST /api/auth/resend-verification
/// Issues a fresh verification token for the signed-in account
///
/// Unlike sign-up, the email send is awaited: the whole point of the call
/// is the email, so a mailer failure is surfaced.
pub async fn resend_verification(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = match state.user_store.find_by_id(&authed.id).await? {
        Some(user) => user,
        None => return Err(ApiError::NotFound("User not found".to_string())),
    };

    if user.is_verified() {
        return Err(ApiError::AlreadyVerified(
            "Email already verified".to_string(),
        ));
    }

    let token = state.user_store.issue_verification_token(&user.id).await?;

    if let Err(e) = state
        .email_service
        .send_verification_email(&user.email, user.full_name.as_deref(), &token)
        .await
    {
        error!(
            error = %e,
            user_id = %user.id,
            "Failed to send verification email"
        );
        return Err(ApiError::InternalServer(
            "Failed to send verification email".to_string(),
        ));
    }

    info!(user_id = %user.id, "Verification email resent");

    Ok(Json(MessageResponse {
        message: "Verification email sent successfully".to_string(),
    }))
}

/// POST /api/auth/reset-password
/// Starts a password reset
///
/// The response is identical whether or not the email has an account; token
/// issue and email dispatch only happen when it does, on a background task
/// so response timing gives nothing away either.
pub async fn reset_password_request(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<EmailPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let email = payload.email.trim().to_string();
    if !email.is_empty() {
        if let Some((user, token)) = state.user_store.issue_reset_token(&email).await? {
            let email_service = state.email_service.clone();
            tokio::spawn(async move {
                if let Err(e) = email_service
                    .send_password_reset_email(&user.email, user.full_name.as_deref(), &token)
                    .await
                {
                    warn!(
                        error = %e,
                        user_id = %user.id,
                        "Failed to send password reset email"
                    );
                }
            });
        }
    }

    Ok(Json(MessageResponse {
        message: "If an account exists with this email, a password reset link has been sent"
            .to_string(),
    }))
}

/// POST /api/auth/reset-password/confirm
/// Completes a password reset and revokes every live session
pub async fn reset_password_confirm(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<ResetConfirmPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let (token, new_password) = match (payload.token, payload.new_password) {
        (Some(token), Some(new_password)) if !token.is_empty() && !new_password.is_empty() => {
            (token, new_password)
        }
        _ => {
            return Err(ApiError::ValidationError(
                "Token and new password required".to_string(),
            ))
        }
    };

    if new_password.len() < 8 {
        return Err(ApiError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let user = match state
        .user_store
        .consume_reset_token(&token, &new_password)
        .await?
    {
        Some(user) => user,
        None => {
            return Err(ApiError::ValidationError(
                "Invalid or expired reset token".to_string(),
            ))
        }
    };

    let revoked = state.token_service.revoke_all_for_user(&user.id).await?;
    info!(
        user_id = %user.id,
        revoked_sessions = revoked,
        "Password reset; all refresh tokens revoked"
    );

    Ok(Json(MessageResponse {
        message: "Password reset successfully".to_string(),
    }))
}

/// POST /api/auth/update-password
/// Sets a new password for the signed-in account
///
/// Possession of a live access token is the authorization; there is no
/// current-password check, which lets OAuth-linked accounts set their first
/// password here.
pub async fn update_password(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Json(payload): Json<UpdatePasswordPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    let new_password = match payload.new_password {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err(ApiError::ValidationError(
                "New password required".to_string(),
            ))
        }
    };

    if new_password.len() < 8 {
        return Err(ApiError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    state
        .user_store
        .update_password(&authed.id, &new_password)
        .await?;

    let revoked = state.token_service.revoke_all_for_user(&authed.id).await?;
    info!(
        user_id = %authed.id,
        revoked_sessions = revoked,
        "Password updated; all refresh tokens revoked"
    );

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}

/// GET /api/me
/// Returns the current authenticated user's public profile
#[axum::debug_handler]
pub async fn me_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<PublicUser>, ApiError> {
    let state = state_lock.read().await.clone();

    let user = state
        .user_store
        .find_by_id(&authed.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("user not found".to_string()))?;

    Ok(Json(PublicUser::from(user)))
}

// ---- Helper Functions ----

/// Mints the access/refresh pair returned by every sign-in path
async fn issue_session(state: &AppState, user: &User) -> Result<Session, ApiError> {
    let access_token = state.token_service.issue_access_token(&user.id)?;
    let refresh_token = state.token_service.issue_refresh_token(&user.id).await?;

    Ok(Session {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    })
}
