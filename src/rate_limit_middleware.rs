// rate_limit_middleware.rs
use crate::common::AppState;
use crate::services::rate_limit::RateLimitResult;
use crate::services::tokens::TokenService;
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Serialize)]
struct RateLimitErrorResponse {
    error: String,
    code: String,
    retry_after: u32,
}

/// Extract IP address from request
fn extract_ip_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    // Try X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // Take the first IP in the chain
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    // Try X-Real-IP header
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    // Fall back to connection info
    connect_info.map(|info| info.0.ip().to_string())
}

/// Resolve the caller's user id from a Bearer access token.
///
/// Decoding verifies the signature, so a forged or expired token gets the
/// anonymous limit rather than the authenticated one.
fn extract_user_id(headers: &HeaderMap, token_service: &TokenService) -> Option<String> {
    let header = headers.get("authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header);
    token_service
        .decode_access_token(token)
        .ok()
        .map(|claims| claims.sub)
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let state = state_lock.read().await.clone();
    let rate_limit_service = state.rate_limit_service.clone();

    let headers = request.headers().clone();

    // Extract IP address
    let ip_address = extract_ip_address(&headers, connect_info.as_ref());

    // Identify the caller; signed-in users are keyed by user id
    let user_id = extract_user_id(&headers, &state.token_service);
    let is_authenticated = user_id.is_some();

    let identifier = user_id
        .map(|id| format!("user:{}", id))
        .or_else(|| ip_address.clone().map(|ip| format!("anon:{}", ip)))
        .unwrap_or_else(|| "unknown".to_string());

    // Get request path for logging
    let path = request.uri().path().to_string();

    match rate_limit_service
        .check_rate_limit(&identifier, ip_address.as_deref(), is_authenticated)
        .await
    {
        RateLimitResult::Allowed => {
            debug!(
                identifier = %identifier,
                ip = ?ip_address,
                path = %path,
                "Request allowed by rate limiter"
            );
            Ok(next.run(request).await)
        }
        RateLimitResult::Limited { retry_after } => {
            warn!(
                identifier = %identifier,
                ip = ?ip_address,
                path = %path,
                retry_after = retry_after,
                "Request blocked by rate limiter"
            );

            // Log the violation
            rate_limit_service
                .log_violation(&identifier, ip_address.as_deref(), &path)
                .await;

            // Return 429 Too Many Requests with retry-after header
            let error_response = RateLimitErrorResponse {
                error: "Rate limit exceeded. Please try again later.".to_string(),
                code: "RATE_LIMIT_EXCEEDED".to_string(),
                retry_after,
            };

            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, Json(error_response)).into_response();

            // Add Retry-After header
            if let Ok(retry_header) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("retry-after", retry_header);
            }

            // Advertise the limit that tripped for this class of caller
            let config = rate_limit_service.config();
            let limit = if is_authenticated {
                config.authenticated_limit
            } else {
                config.anonymous_limit
            };
            if let Ok(limit_header) = HeaderValue::from_str(&limit.to_string()) {
                response
                    .headers_mut()
                    .insert("x-ratelimit-limit", limit_header);
            }

            Err(response)
        }
    }
}
