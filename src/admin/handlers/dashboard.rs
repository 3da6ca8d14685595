// src/admin/handlers/dashboard.rs

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::admin::models::DashboardMetrics;
use crate::auth::models::PublicUser;
use crate::auth::AuthedUser;
use crate::common::{ApiError, AppState};

/// Number of newest accounts shown on the dashboard
const RECENT_USERS_LIMIT: i64 = 10;

/// GET /api/admin/dashboard/metrics - Account and session counters
pub async fn get_dashboard_metrics(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<DashboardMetrics>, ApiError> {
    let state = state_lock.read().await.clone();

    if !authed.is_admin {
        warn!(
            user_id = %authed.id,
            "Dashboard metrics access denied: admin privileges required"
        );
        return Err(ApiError::Forbidden("Admin privileges required".to_string()));
    }

    info!(
        admin_user_id = %authed.id,
        "Fetching dashboard metrics"
    );

    let total_users = state.user_store.count_users().await?;
    let verified_users = state.user_store.count_verified_users().await?;
    let oauth_users = state.user_store.count_oauth_users().await?;
    let active_sessions = state.token_service.count_active().await?;

    let recent_users = state
        .user_store
        .list_users(RECENT_USERS_LIMIT, 0)
        .await?
        .iter()
        .map(PublicUser::from)
        .collect();

    let metrics = DashboardMetrics {
        total_users,
        verified_users,
        oauth_users,
        active_sessions,
        recent_users,
        last_updated: chrono::Utc::now().to_rfc3339(),
    };

    info!(
        admin_user_id = %authed.id,
        total_users = total_users,
        active_sessions = active_sessions,
        "Dashboard metrics fetched successfully"
    );

    Ok(Json(metrics))
}
