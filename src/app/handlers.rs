// src/app/handlers.rs

use axum::{extract::Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::common::{ApiError, AppState};

/// Version gate payload consumed by mobile clients on launch.
#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub min_version: String,
    pub latest_version: String,
    pub store_url_android: String,
    pub store_url_ios: String,
    pub force_update: bool,
}

/// GET /health - Liveness probe with a database ping
pub async fn health_check(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// GET /api/app/version - App version gate for mobile clients
///
/// Values come from system settings where configured; the fallbacks keep the
/// endpoint usable on a fresh install before any admin has touched settings.
pub async fn get_version(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Result<Json<VersionInfo>, ApiError> {
    let state = state_lock.read().await.clone();
    let settings = &state.settings_service;

    let min_version = settings
        .get_setting("min_version")
        .await?
        .unwrap_or_else(|| "1.0.0".to_string());
    let latest_version = settings
        .get_setting("latest_version")
        .await?
        .unwrap_or_else(|| "1.0.1".to_string());
    let store_url_android = settings
        .get_setting("store_url_android")
        .await?
        .unwrap_or_else(|| {
            "https://play.google.com/store/apps/details?id=com.example.app".to_string()
        });
    let store_url_ios = settings
        .get_setting("store_url_ios")
        .await?
        .unwrap_or_else(|| "https://apps.apple.com/app/id123456789".to_string());
    let force_update = settings
        .get_setting("force_update")
        .await?
        .map(|v| v == "true")
        .unwrap_or(false);

    debug!(
        min_version = %min_version,
        latest_version = %latest_version,
        "App version info served"
    );

    Ok(Json(VersionInfo {
        min_version,
        latest_version,
        store_url_android,
        store_url_ios,
        force_update,
    }))
}
