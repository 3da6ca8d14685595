// src/admin/handlers/settings.rs

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::admin::models::{UpdateVersionSettingsRequest, VersionSettings};
use crate::auth::AuthedUser;
use crate::common::{ApiError, AppState};

/// GET /api/admin/settings - App version settings as stored
pub async fn get_version_settings(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<VersionSettings>, ApiError> {
    let state = state_lock.read().await.clone();

    if !authed.is_admin {
        warn!(
            user_id = %authed.id,
            "Version settings access denied: admin privileges required"
        );
        return Err(ApiError::Forbidden("Admin privileges required".to_string()));
    }

    let settings = load_version_settings(&state).await?;

    Ok(Json(settings))
}

/// PUT /api/admin/settings - Update any subset of the version settings
pub async fn update_version_settings(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Json(request): Json<UpdateVersionSettingsRequest>,
) -> Result<Json<VersionSettings>, ApiError> {
    let state = state_lock.read().await.clone();

    if !authed.is_admin {
        warn!(
            user_id = %authed.id,
            "Version settings update denied: admin privileges required"
        );
        return Err(ApiError::Forbidden("Admin privileges required".to_string()));
    }

    let mut updated_count = 0;

    let text_updates = [
        ("min_version", &request.min_version),
        ("latest_version", &request.latest_version),
        ("store_url_android", &request.store_url_android),
        ("store_url_ios", &request.store_url_ios),
    ];

    for (key, value) in text_updates {
        if let Some(value) = value {
            state
                .settings_service
                .set_setting(key, value, Some(&authed.id))
                .await?;
            updated_count += 1;
        }
    }

    if let Some(force_update) = request.force_update {
        let value = if force_update { "true" } else { "false" };
        state
            .settings_service
            .set_setting("force_update", value, Some(&authed.id))
            .await?;
        updated_count += 1;
    }

    info!(
        admin_user_id = %authed.id,
        updated_count = updated_count,
        "Version settings updated"
    );

    let settings = load_version_settings(&state).await?;

    Ok(Json(settings))
}

/// Reads the five version keys, falling back to unconfigured defaults
async fn load_version_settings(state: &AppState) -> Result<VersionSettings, ApiError> {
    let settings = &state.settings_service;

    let min_version = settings
        .get_setting("min_version")
        .await?
        .unwrap_or_else(|| "1.0.0".to_string());
    let latest_version = settings
        .get_setting("latest_version")
        .await?
        .unwrap_or_else(|| "1.0.0".to_string());
    let store_url_android = settings
        .get_setting("store_url_android")
        .await?
        .unwrap_or_default();
    let store_url_ios = settings
        .get_setting("store_url_ios")
        .await?
        .unwrap_or_default();
    let force_update = settings
        .get_setting("force_update")
        .await?
        .map(|v| v == "true")
        .unwrap_or(false);

    Ok(VersionSettings {
        min_version,
        latest_version,
        store_url_android,
        store_url_ios,
        force_update,
    })
}
