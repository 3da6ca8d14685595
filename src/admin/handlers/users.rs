// src/admin/handlers/users.rs

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::admin::models::{UserDetailsResponse, UsersListQuery, UsersListResponse};
use crate::auth::models::PublicUser;
use crate::auth::AuthedUser;
use crate::common::{ApiError, AppState};

const PAGE_SIZE: i64 = 50;

/// GET /api/admin/users?page= - Paginated user list, newest first
pub async fn get_users(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Query(query): Query<UsersListQuery>,
) -> Result<Json<UsersListResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    if !authed.is_admin {
        warn!(
            user_id = %authed.id,
            "Admin users list access denied: admin privileges required"
        );
        return Err(ApiError::Forbidden("Admin privileges required".to_string()));
    }

    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * PAGE_SIZE;

    let users = state.user_store.list_users(PAGE_SIZE, offset).await?;
    let total = state.user_store.count_users().await?;
    let total_pages = (total + PAGE_SIZE - 1) / PAGE_SIZE;

    info!(
        admin_user_id = %authed.id,
        page = page,
        user_count = users.len(),
        "Admin users list fetched"
    );

    Ok(Json(UsersListResponse {
        users: users.iter().map(PublicUser::from).collect(),
        total,
        page,
        total_pages,
    }))
}

/// GET /api/admin/users/:id - Single user with live session count
pub async fn get_user_details(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserDetailsResponse>, ApiError> {
    let state = state_lock.read().await.clone();

    if !authed.is_admin {
        warn!(
            user_id = %authed.id,
            "Admin user details access denied: admin privileges required"
        );
        return Err(ApiError::Forbidden("Admin privileges required".to_string()));
    }

    let user = match state.user_store.find_by_id(&user_id).await? {
        Some(user) => user,
        None => {
            warn!(
                admin_user_id = %authed.id,
                target_user_id = %user_id,
                "Admin user details lookup failed: user not found"
            );
            return Err(ApiError::NotFound("User not found".to_string()));
        }
    };

    let active_sessions = state
        .token_service
        .count_active_for_user(&user.id)
        .await?;

    Ok(Json(UserDetailsResponse {
        user: PublicUser::from(user),
        active_sessions,
    }))
}

/// DELETE /api/admin/users/:id - Remove a user and their refresh tokens
pub async fn delete_user(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let state = state_lock.read().await.clone();

    if !authed.is_admin {
        warn!(
            user_id = %authed.id,
            "Admin user deletion access denied: admin privileges required"
        );
        return Err(ApiError::Forbidden("Admin privileges required".to_string()));
    }

    let deleted = state.user_store.delete_user(&user_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    info!(
        admin_user_id = %authed.id,
        target_user_id = %user_id,
        "User deleted by admin"
    );

    Ok(StatusCode::NO_CONTENT)
}
