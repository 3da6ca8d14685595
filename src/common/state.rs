// Application state shared across all modules

use reqwest::Client;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::store::UserStore;
use crate::services::{
    EmailService, GoogleAuthService, RateLimitService, SettingsService, TokenService,
};

/// Application state containing database pool, services, and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub http: Client,
    pub frontend_url: String,
    pub admin_emails: HashSet<String>,
    pub user_store: Arc<UserStore>,
    pub token_service: Arc<TokenService>,
    pub email_service: Arc<EmailService>,
    pub google_service: Arc<GoogleAuthService>,
    pub settings_service: Arc<SettingsService>,
    pub rate_limit_service: Arc<RateLimitService>,
}
