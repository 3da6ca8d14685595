// src/app/routes.rs

use axum::{routing::get, Router};

use super::handlers;

/// Public app routes:
/// - GET /health - liveness probe
/// - GET /api/app/version - version gate for mobile clients
pub fn app_routes() -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/app/version", get(handlers::get_version))
}
