//! Tests for auth module
//!
//! These tests drive the real handlers against an in-memory database and
//! verify the flow-level contracts:
//! - Sign-up/sign-in session issuance
//! - Credential failure responses that leak nothing
//! - Refresh token lifecycle (refresh, sign-out, revoke-all)
//! - Verification and reset token single use
//! - The AuthedUser extractor

#[cfg(test)]
mod tests {
    use super::super::*;

    use axum::body::to_bytes;
    use axum::extract::{Extension, FromRequestParts, Json, Query};
    use axum::http::{header::AUTHORIZATION, Request, StatusCode};
    use axum::response::IntoResponse;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::common::{migrations::run_migrations, ApiError, AppState};
    use crate::services::{
        EmailService, GoogleAuthService, RateLimitService, SettingsService, TokenService,
    };

    async fn test_state() -> Arc<RwLock<AppState>> {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let settings_service = Arc::new(SettingsService::new(pool.clone()));
        let token_service = Arc::new(TokenService::new(
            pool.clone(),
            "test_jwt_secret".to_string(),
            "test_refresh_secret".to_string(),
        ));
        let email_service = Arc::new(EmailService::new(
            settings_service.clone(),
            "http://localhost:3000".to_string(),
        ));
        let http = reqwest::Client::new();
        let google_service = Arc::new(GoogleAuthService::new(http.clone(), None));
        let rate_limit_service = Arc::new(RateLimitService::new());

        let mut admin_emails = HashSet::new();
        admin_emails.insert("admin@test.com".to_string());

        let state = AppState {
            db: pool.clone(),
            http,
            frontend_url: "http://localhost:3000".to_string(),
            admin_emails,
            user_store: Arc::new(UserStore::new(pool)),
            token_service,
            email_service,
            google_service,
            settings_service,
            rate_limit_service,
        };

        Arc::new(RwLock::new(state))
    }

    async fn db(state: &Arc<RwLock<AppState>>) -> SqlitePool {
        state.read().await.db.clone()
    }

    async fn signup_user(
        state: &Arc<RwLock<AppState>>,
        email: &str,
        password: &str,
    ) -> models::Session {
        let (status, Json(body)) = handlers::signup(
            Extension(state.clone()),
            Json(models::SignupPayload {
                email: email.to_string(),
                password: password.to_string(),
                full_name: Some("Test User".to_string()),
            }),
        )
        .await
        .expect("signup should succeed");

        assert_eq!(status, StatusCode::CREATED);
        body.session
    }

    async fn error_response(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_signup_creates_session() {
        let state = test_state().await;

        let session = signup_user(&state, "New@Example.com", "password123").await;

        assert!(!session.access_token.is_empty());
        assert!(!session.refresh_token.is_empty());
        assert_ne!(session.access_token, session.refresh_token);
        assert_eq!(session.user.email, "new@example.com");
        assert!(!session.user.email_verified);
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_email() {
        let state = test_state().await;
        signup_user(&state, "dup@test.com", "password123").await;

        let err = handlers::signup(
            Extension(state.clone()),
            Json(models::SignupPayload {
                email: "DUP@test.com".to_string(),
                password: "password456".to_string(),
                full_name: None,
            }),
        )
        .await
        .err()
        .expect("duplicate signup should fail");

        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "An account with this email already exists");
    }

    #[tokio::test]
    async fn test_signup_rejects_short_password() {
        let state = test_state().await;

        let err = handlers::signup(
            Extension(state.clone()),
            Json(models::SignupPayload {
                email: "short@test.com".to_string(),
                password: "short".to_string(),
                full_name: None,
            }),
        )
        .await
        .err()
        .expect("short password should fail");

        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Password must be at least 8 characters");
    }

    #[tokio::test]
    async fn test_signin_returns_session_and_records_login() {
        let state = test_state().await;
        signup_user(&state, "signin@test.com", "password123").await;

        let Json(body) = handlers::signin(
            Extension(state.clone()),
            Json(models::SigninPayload {
                email: "signin@test.com".to_string(),
                password: "password123".to_string(),
            }),
        )
        .await
        .expect("signin should succeed");

        assert!(!body.session.access_token.is_empty());

        let last_login = sqlx::query_scalar::<_, Option<String>>(
            "SELECT last_login_at FROM users WHERE email = ?",
        )
        .bind("signin@test.com")
        .fetch_one(&db(&state).await)
        .await
        .unwrap();
        assert!(last_login.is_some());
    }

    #[tokio::test]
    async fn test_signin_failures_are_byte_identical() {
        let state = test_state().await;
        signup_user(&state, "registered@test.com", "password123").await;

        let wrong_password = handlers::signin(
            Extension(state.clone()),
            Json(models::SigninPayload {
                email: "registered@test.com".to_string(),
                password: "wrongpassword".to_string(),
            }),
        )
        .await
        .err()
        .unwrap()
        .into_response();

        let unknown_email = handlers::signin(
            Extension(state.clone()),
            Json(models::SigninPayload {
                email: "ghost@test.com".to_string(),
                password: "password123".to_string(),
            }),
        )
        .await
        .err()
        .unwrap()
        .into_response();

        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

        let bytes_a = to_bytes(wrong_password.into_body(), usize::MAX).await.unwrap();
        let bytes_b = to_bytes(unknown_email.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes_a, bytes_b);
    }

    #[tokio::test]
    async fn test_refresh_mints_access_token() {
        let state = test_state().await;
        let session = signup_user(&state, "refresh@test.com", "password123").await;

        let Json(body) = handlers::refresh(
            Extension(state.clone()),
            Json(models::RefreshTokenPayload {
                refresh_token: Some(session.refresh_token),
            }),
        )
        .await
        .expect("refresh should succeed");

        let claims = state
            .read()
            .await
            .token_service
            .decode_access_token(&body.access_token)
            .expect("minted token should be a valid access token");
        assert_eq!(claims.sub, session.user.id);
    }

    #[tokio::test]
    async fn test_refresh_rejects_bad_or_missing_tokens() {
        let state = test_state().await;
        let session = signup_user(&state, "refresh2@test.com", "password123").await;

        // Missing token gets its own message
        let err = handlers::refresh(
            Extension(state.clone()),
            Json(models::RefreshTokenPayload {
                refresh_token: None,
            }),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Refresh token required");

        // Garbage and an access token posing as a refresh token both fail
        // with the same unauthorized response
        for bad_token in ["not-a-token", session.access_token.as_str()] {
            let err = handlers::refresh(
                Extension(state.clone()),
                Json(models::RefreshTokenPayload {
                    refresh_token: Some(bad_token.to_string()),
                }),
            )
            .await
            .err()
            .unwrap();
            let (status, body) = error_response(err).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], "Invalid or expired refresh token");
        }
    }

    #[tokio::test]
    async fn test_signout_revokes_and_always_succeeds() {
        let state = test_state().await;
        let session = signup_user(&state, "signout@test.com", "password123").await;

        let Json(body) = handlers::signout(
            Extension(state.clone()),
            Some(Json(models::RefreshTokenPayload {
                refresh_token: Some(session.refresh_token.clone()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(body.message, "Signed out successfully");

        // The revoked token no longer refreshes
        let err = handlers::refresh(
            Extension(state.clone()),
            Json(models::RefreshTokenPayload {
                refresh_token: Some(session.refresh_token.clone()),
            }),
        )
        .await
        .err()
        .unwrap();
        let (status, _) = error_response(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Signing out again, or with no body at all, still succeeds
        let Json(body) = handlers::signout(
            Extension(state.clone()),
            Some(Json(models::RefreshTokenPayload {
                refresh_token: Some(session.refresh_token),
            })),
        )
        .await
        .unwrap();
        assert_eq!(body.message, "Signed out successfully");

        let Json(body) = handlers::signout(Extension(state.clone()), None).await.unwrap();
        assert_eq!(body.message, "Signed out successfully");
    }

    #[tokio::test]
    async fn test_verify_email_consumes_token_once() {
        let state = test_state().await;
        let session = signup_user(&state, "verify@test.com", "password123").await;

        let token = sqlx::query_scalar::<_, Option<String>>(
            "SELECT verification_token FROM users WHERE email = ?",
        )
        .bind("verify@test.com")
        .fetch_one(&db(&state).await)
        .await
        .unwrap()
        .expect("signup should leave a pending verification token");

        let Json(body) = handlers::verify_email(
            Extension(state.clone()),
            Query(models::VerifyEmailQuery {
                token: Some(token.clone()),
            }),
        )
        .await
        .expect("verification should succeed");
        assert_eq!(body.message, "Email verified successfully");
        assert!(body.user.email_verified);
        assert_eq!(body.user.id, session.user.id);

        // Spent token
        let err = handlers::verify_email(
            Extension(state.clone()),
            Query(models::VerifyEmailQuery { token: Some(token) }),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid or expired verification token");

        // Missing token
        let err = handlers::verify_email(
            Extension(state.clone()),
            Query(models::VerifyEmailQuery { token: None }),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Verification token required");
    }

    #[tokio::test]
    async fn test_resend_verification_surfaces_mailer_failure() {
        let state = test_state().await;
        let session = signup_user(&state, "resend@test.com", "password123").await;

        let authed = AuthedUser {
            id: session.user.id.clone(),
            email: session.user.email.clone(),
            is_admin: false,
        };

        // No mailer is configured in tests, so the awaited send fails and
        // the failure propagates
        let err = handlers::resend_verification(Extension(state.clone()), authed)
            .await
            .err()
            .expect("unconfigured mailer should surface");
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to send verification email");
    }

    #[tokio::test]
    async fn test_resend_verification_rejects_verified_account() {
        let state = test_state().await;
        let session = signup_user(&state, "resend2@test.com", "password123").await;

        sqlx::query("UPDATE users SET email_verified_at = datetime('now') WHERE id = ?")
            .bind(&session.user.id)
            .execute(&db(&state).await)
            .await
            .unwrap();

        let authed = AuthedUser {
            id: session.user.id.clone(),
            email: session.user.email.clone(),
            is_admin: false,
        };

        let err = handlers::resend_verification(Extension(state.clone()), authed)
            .await
            .err()
            .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email already verified");
    }

    #[tokio::test]
    async fn test_reset_password_flow_revokes_sessions() {
        let state = test_state().await;
        let session = signup_user(&state, "reset@test.com", "oldpassword1").await;

        // Known and unknown emails get the same acknowledgement
        let Json(known) = handlers::reset_password_request(
            Extension(state.clone()),
            Json(models::EmailPayload {
                email: "reset@test.com".to_string(),
            }),
        )
        .await
        .unwrap();
        let Json(unknown) = handlers::reset_password_request(
            Extension(state.clone()),
            Json(models::EmailPayload {
                email: "ghost@test.com".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(known.message, unknown.message);
        assert_eq!(
            known.message,
            "If an account exists with this email, a password reset link has been sent"
        );

        let token = sqlx::query_scalar::<_, Option<String>>(
            "SELECT reset_token FROM users WHERE email = ?",
        )
        .bind("reset@test.com")
        .fetch_one(&db(&state).await)
        .await
        .unwrap()
        .expect("reset request should set a token");

        let Json(body) = handlers::reset_password_confirm(
            Extension(state.clone()),
            Json(models::ResetConfirmPayload {
                token: Some(token.clone()),
                new_password: Some("newpassword1".to_string()),
            }),
        )
        .await
        .expect("reset confirm should succeed");
        assert_eq!(body.message, "Password reset successfully");

        // Every pre-reset session is gone
        let err = handlers::refresh(
            Extension(state.clone()),
            Json(models::RefreshTokenPayload {
                refresh_token: Some(session.refresh_token),
            }),
        )
        .await
        .err()
        .expect("old refresh token should be revoked");
        let (status, _) = error_response(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // The new password signs in; the token is spent
        handlers::signin(
            Extension(state.clone()),
            Json(models::SigninPayload {
                email: "reset@test.com".to_string(),
                password: "newpassword1".to_string(),
            }),
        )
        .await
        .expect("new password should work");

        let err = handlers::reset_password_confirm(
            Extension(state.clone()),
            Json(models::ResetConfirmPayload {
                token: Some(token),
                new_password: Some("thirdpassword1".to_string()),
            }),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid or expired reset token");
    }

    #[tokio::test]
    async fn test_reset_confirm_requires_token_and_password() {
        let state = test_state().await;

        let err = handlers::reset_password_confirm(
            Extension(state.clone()),
            Json(models::ResetConfirmPayload {
                token: Some("some-token".to_string()),
                new_password: None,
            }),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Token and new password required");
    }

    #[tokio::test]
    async fn test_update_password_revokes_sessions() {
        let state = test_state().await;
        let session = signup_user(&state, "update@test.com", "oldpassword1").await;
        let authed = AuthedUser {
            id: session.user.id.clone(),
            email: session.user.email.clone(),
            is_admin: false,
        };

        let err = handlers::update_password(
            Extension(state.clone()),
            AuthedUser {
                id: authed.id.clone(),
                email: authed.email.clone(),
                is_admin: false,
            },
            Json(models::UpdatePasswordPayload { new_password: None }),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "New password required");

        let Json(body) = handlers::update_password(
            Extension(state.clone()),
            authed,
            Json(models::UpdatePasswordPayload {
                new_password: Some("brandnewpass1".to_string()),
            }),
        )
        .await
        .expect("update should succeed");
        assert_eq!(body.message, "Password updated successfully");

        let err = handlers::refresh(
            Extension(state.clone()),
            Json(models::RefreshTokenPayload {
                refresh_token: Some(session.refresh_token),
            }),
        )
        .await
        .err()
        .expect("old refresh token should be revoked");
        let (status, _) = error_response(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        handlers::signin(
            Extension(state.clone()),
            Json(models::SigninPayload {
                email: "update@test.com".to_string(),
                password: "brandnewpass1".to_string(),
            }),
        )
        .await
        .expect("new password should work");
    }

    #[tokio::test]
    async fn test_google_auth_requires_id_token() {
        let state = test_state().await;

        let err = handlers::google_auth(
            Extension(state.clone()),
            Json(models::GoogleIdTokenPayload { id_token: None }),
        )
        .await
        .err()
        .unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Google ID token is required");
    }

    #[tokio::test]
    async fn test_me_returns_public_projection() {
        let state = test_state().await;
        let session = signup_user(&state, "me@test.com", "password123").await;

        let Json(user) = handlers::me_handler(
            Extension(state.clone()),
            AuthedUser {
                id: session.user.id.clone(),
                email: session.user.email.clone(),
                is_admin: false,
            },
        )
        .await
        .unwrap();

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["id"], session.user.id);
        assert_eq!(value["email"], "me@test.com");
        assert!(value.get("password_hash").is_none());
        assert!(value.get("verification_token").is_none());
        assert!(value.get("reset_token").is_none());
    }

    async fn extract_authed(
        state: &Arc<RwLock<AppState>>,
        auth_header: Option<String>,
    ) -> Result<AuthedUser, ApiError> {
        let mut builder = Request::builder().uri("/api/me");
        if let Some(value) = auth_header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        parts.extensions.insert(state.clone());

        AuthedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extractor_accepts_access_token_only() {
        let state = test_state().await;
        let session = signup_user(&state, "extract@test.com", "password123").await;

        let authed = extract_authed(&state, Some(format!("Bearer {}", session.access_token)))
            .await
            .expect("access token should authenticate");
        assert_eq!(authed.id, session.user.id);
        assert!(!authed.is_admin);

        // A refresh token is not an access token
        let err = extract_authed(&state, Some(format!("Bearer {}", session.refresh_token)))
            .await
            .err()
            .expect("refresh token must not authenticate");
        let (status, _) = error_response(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let err = extract_authed(&state, None).await.err().unwrap();
        let (status, body) = error_response(err).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing auth");
    }

    #[tokio::test]
    async fn test_extractor_flags_admins_from_allowlist() {
        let state = test_state().await;
        let session = signup_user(&state, "admin@test.com", "password123").await;

        let authed = extract_authed(&state, Some(format!("Bearer {}", session.access_token)))
            .await
            .unwrap();
        assert!(authed.is_admin);
    }
}
