// src/admin/routes.rs

use axum::{routing::get, Router};

use super::handlers;

pub fn admin_routes() -> Router {
    Router::new()
        // Dashboard endpoints
        .route(
            "/api/admin/dashboard/metrics",
            get(handlers::dashboard::get_dashboard_metrics),
        )
        // User management endpoints
        .route("/api/admin/users", get(handlers::users::get_users))
        .route(
            "/api/admin/users/:id",
            get(handlers::users::get_user_details).delete(handlers::users::delete_user),
        )
        // App version settings endpoints
        .route(
            "/api/admin/settings",
            get(handlers::settings::get_version_settings)
                .put(handlers::settings::update_version_settings),
        )
}
