// src/services/google.rs
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::common::{safe_email_log, ApiError};
use chrono::Utc;

#[derive(Debug, Error)]
pub enum GoogleAuthError {
    #[error("Invalid Google ID token: {0}")]
    InvalidToken(String),

    #[error("Google token validation service unavailable: {0}")]
    Unavailable(String),
}

impl From<GoogleAuthError> for ApiError {
    fn from(err: GoogleAuthError) -> Self {
        match err {
            GoogleAuthError::InvalidToken(_) => {
                ApiError::Unauthorized("Invalid Google ID token".to_string())
            }
            GoogleAuthError::Unavailable(_) => ApiError::InternalServer(
                "google token validation service unavailable".to_string(),
            ),
        }
    }
}

/// Identity asserted by a validated Google ID token
#[derive(Debug, Clone)]
pub struct GoogleProfile {
    pub provider_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Validates Google ID tokens against the tokeninfo endpoint.
///
/// Docs: https://developers.google.com/identity/sign-in/web/backend-auth
#[derive(Debug, Clone)]
pub struct GoogleAuthService {
    http: Client,
    client_id: Option<String>,
}

impl GoogleAuthService {
    pub fn new(http: Client, client_id: Option<String>) -> Self {
        Self { http, client_id }
    }

    /// Verify a Google ID token and extract the profile it asserts
    ///
    /// Every rejection (tampered, expired, wrong audience, unverified email)
    /// surfaces as `InvalidToken`; only transport failures reaching Google
    /// are reported separately.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<GoogleProfile, GoogleAuthError> {
        let tokeninfo_url = format!(
            "https://oauth2.googleapis.com/tokeninfo?id_token={}",
            id_token
        );

        debug!("Initiating Google token validation with tokeninfo endpoint");

        let resp = self.http.get(&tokeninfo_url).send().await.map_err(|e| {
            error!(
                error = %e,
                endpoint = "https://oauth2.googleapis.com/tokeninfo",
                "HTTP error contacting Google tokeninfo endpoint"
            );
            GoogleAuthError::Unavailable(e.to_string())
        })?;

        let status = resp.status();
        debug!(http_status = %status, "Received response from Google tokeninfo endpoint");

        if !status.is_success() {
            warn!(
                http_status = %status,
                "Google tokeninfo rejected the token"
            );
            return Err(GoogleAuthError::InvalidToken(format!(
                "tokeninfo returned {}",
                status
            )));
        }

        let body = resp.json::<serde_json::Value>().await.map_err(|e| {
            error!(
                error = %e,
                "Failed to parse Google tokeninfo JSON response - malformed token"
            );
            GoogleAuthError::InvalidToken("malformed tokeninfo response".to_string())
        })?;

        self.profile_from_payload(&body)
    }

    /// Apply the claim checks to a decoded tokeninfo payload
    fn profile_from_payload(
        &self,
        body: &serde_json::Value,
    ) -> Result<GoogleProfile, GoogleAuthError> {
        let email = body
            .get("email")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let sub = body.get("sub").and_then(|v| v.as_str()).map(str::to_string);
        let name = body
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let picture = body
            .get("picture")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let (email, sub) = match (email, sub) {
            (Some(email), Some(sub)) => (email, sub),
            (email, sub) => {
                warn!(
                    has_email = email.is_some(),
                    has_sub = sub.is_some(),
                    "Google token missing required fields (email/sub)"
                );
                return Err(GoogleAuthError::InvalidToken(
                    "token missing required fields".to_string(),
                ));
            }
        };

        // tokeninfo serializes booleans as strings, so accept either form.
        // An account stays linked only to addresses Google has verified.
        let email_verified = body
            .get("email_verified")
            .map(|v| v.as_bool().unwrap_or_else(|| v.as_str() == Some("true")))
            .unwrap_or(false);

        if !email_verified {
            warn!(
                email = %safe_email_log(&email),
                "Google token carries an unverified email address - rejecting"
            );
            return Err(GoogleAuthError::InvalidToken(
                "email not verified by Google".to_string(),
            ));
        }

        // exp arrives as a string for the same reason
        if let Some(exp) = body.get("exp").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse::<i64>().ok()))
        }) {
            let current_time = Utc::now().timestamp();
            if exp < current_time {
                warn!(
                    token_exp = exp,
                    current_time = current_time,
                    "Google token has expired"
                );
                return Err(GoogleAuthError::InvalidToken(
                    "token has expired".to_string(),
                ));
            }
        }

        // Validate audience (client id) when configured
        if let Some(client_id) = &self.client_id {
            match body.get("aud").and_then(|v| v.as_str()) {
                Some(aud_val) if aud_val == client_id => {
                    debug!(
                        token_audience = %aud_val,
                        "Google token audience validation successful"
                    );
                }
                Some(aud_val) => {
                    warn!(
                        token_audience = %aud_val,
                        expected_client_id = %client_id,
                        "Google token audience validation failed - rejecting token"
                    );
                    return Err(GoogleAuthError::InvalidToken(
                        "token audience mismatch".to_string(),
                    ));
                }
                None => {
                    warn!(
                        expected_client_id = %client_id,
                        "Google token missing audience field - rejecting token"
                    );
                    return Err(GoogleAuthError::InvalidToken(
                        "token missing audience".to_string(),
                    ));
                }
            }
        }

        debug!(
            email = %safe_email_log(&email),
            provider = "google",
            provider_id = %sub,
            "Google token validation successful"
        );

        Ok(GoogleProfile {
            provider_id: sub,
            email,
            full_name: name,
            avatar_url: picture,
        })
    }
}
