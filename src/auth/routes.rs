//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /api/auth/signup` - Create a local account
/// - `POST /api/auth/signin` - Email/password sign-in
/// - `POST /api/auth/google` - Google OAuth sign-in
/// - `POST /api/auth/refresh` - Mint a fresh access token
/// - `POST /api/auth/signout` - Revoke a refresh token
/// - `GET /api/auth/verify-email` - Consume a verification token
/// - `POST /api/auth/resend-verification` - Resend the verification email
/// - `POST /api/auth/reset-password` - Start a password reset
/// - `POST /api/auth/reset-password/confirm` - Complete a password reset
/// - `POST /api/auth/update-password` - Change the signed-in user's password
/// - `GET /api/me` - Get current user information
pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/signin", post(handlers::signin))
        .route("/api/auth/google", post(handlers::google_auth))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/api/auth/signout", post(handlers::signout))
        .route("/api/auth/verify-email", get(handlers::verify_email))
        .route(
            "/api/auth/resend-verification",
            post(handlers::resend_verification),
        )
        .route("/api/auth/reset-password", post(handlers::reset_password_request))
        .route(
            "/api/auth/reset-password/confirm",
            post(handlers::reset_password_confirm),
        )
        .route("/api/auth/update-password", post(handlers::update_password))
        .route("/api/me", get(handlers::me_handler))
}
