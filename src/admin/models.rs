// src/admin/models.rs

use serde::{Deserialize, Serialize};

use crate::auth::models::PublicUser;

// Dashboard models
#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub total_users: i64,
    pub verified_users: i64,
    pub oauth_users: i64,
    pub active_sessions: i64,
    pub recent_users: Vec<PublicUser>,
    pub last_updated: String,
}

// User management models
#[derive(Debug, Deserialize)]
pub struct UsersListQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UsersListResponse {
    pub users: Vec<PublicUser>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct UserDetailsResponse {
    pub user: PublicUser,
    pub active_sessions: i64,
}

// Settings models
#[derive(Debug, Serialize)]
pub struct VersionSettings {
    pub min_version: String,
    pub latest_version: String,
    pub store_url_android: String,
    pub store_url_ios: String,
    pub force_update: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVersionSettingsRequest {
    pub min_version: Option<String>,
    pub latest_version: Option<String>,
    pub store_url_android: Option<String>,
    pub store_url_ios: Option<String>,
    pub force_update: Option<bool>,
}
