//! User credential store
//!
//! Owns every read and write against the `users` table: local account
//! creation, password verification, identity-provider linking, and the
//! single-use verification/reset token columns. Handlers never touch the
//! table directly.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::User;
use super::password::{self, hash_password, PasswordError};
use crate::common::{generate_user_id, safe_email_log, ApiError};

/// Lifetime of an email verification token
pub const VERIFICATION_TOKEN_HOURS: i64 = 24;
/// Lifetime of a password reset token
pub const RESET_TOKEN_HOURS: i64 = 1;

/// Format matching SQLite's datetime('now') output
const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Password hashing task failed")]
    HashTask,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailTaken => {
                ApiError::Conflict("An account with this email already exists".to_string())
            }
            StoreError::Password(_) | StoreError::HashTask => {
                ApiError::InternalServer("password processing failed".to_string())
            }
            StoreError::Database(e) => ApiError::DatabaseError(e),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

fn future_timestamp(hours: i64) -> String {
    (Utc::now() + Duration::hours(hours))
        .format(SQLITE_DATETIME_FORMAT)
        .to_string()
}

#[derive(Debug)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a local email/password account with a pending verification token
    ///
    /// Emails are stored lowercase, so duplicates collide regardless of case.
    /// The duplicate check is the UNIQUE constraint itself; two concurrent
    /// sign-ups race to a single row.
    pub async fn create_local_user(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<(User, String), StoreError> {
        let email = email.trim().to_lowercase();

        let password = password.to_string();
        let password_hash = task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|_| StoreError::HashTask)??;

        let id = generate_user_id();
        let verification_token = Uuid::new_v4().to_string();
        let token_expires = future_timestamp(VERIFICATION_TOKEN_HOURS);

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, full_name, provider, verification_token, verification_token_expires)
            VALUES (?, ?, ?, ?, 'email', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(&password_hash)
        .bind(full_name)
        .bind(&verification_token)
        .bind(&token_expires)
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            if is_unique_violation(&e) {
                debug!(
                    email = %safe_email_log(&email),
                    "Sign-up rejected: email already registered"
                );
                return Err(StoreError::EmailTaken);
            }
            return Err(StoreError::Database(e));
        }

        let user = self.fetch_by_id(&id).await?;
        info!(
            user_id = %user.id,
            email = %safe_email_log(&user.email),
            "Local account created"
        );

        Ok((user, verification_token))
    }

    /// Check an email/password pair
    ///
    /// Unknown email, wrong password, and OAuth-only accounts (no hash) are
    /// indistinguishable to the caller: all return `None`.
    pub async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = match self.find_by_email(email).await? {
            Some(user) => user,
            None => return Ok(None),
        };

        let hash = match &user.password_hash {
            Some(hash) => hash.clone(),
            None => {
                debug!(
                    user_id = %user.id,
                    "Password sign-in attempted on an account without a password"
                );
                return Ok(None);
            }
        };

        let password = password.to_string();
        let valid = task::spawn_blocking(move || password::verify_password(&password, &hash))
            .await
            .map_err(|_| StoreError::HashTask)??;

        Ok(valid.then_some(user))
    }

    /// Find or create the account behind a verified identity-provider profile
    ///
    /// Three tiers, in order: by (provider, provider_id), then by email
    /// (linking the provider onto an existing local account without touching
    /// its password hash), then a fresh already-verified row. The ordering
    /// guarantees an email never ends up with two accounts.
    pub async fn find_or_create_oauth_user(
        &self,
        provider: &str,
        provider_id: &str,
        email: &str,
        full_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();

        if let Some(user) = self.find_by_provider(provider, provider_id).await? {
            return Ok(user);
        }

        if let Some(existing) = self.find_by_email(&email).await? {
            sqlx::query(
                r#"
                UPDATE users
                SET provider = ?,
                    provider_id = ?,
                    avatar_url = COALESCE(?, avatar_url),
                    email_verified_at = COALESCE(email_verified_at, datetime('now')),
                    updated_at = datetime('now')
                WHERE id = ?
                "#,
            )
            .bind(provider)
            .bind(provider_id)
            .bind(avatar_url)
            .bind(&existing.id)
            .execute(&self.db)
            .await?;

            info!(
                user_id = %existing.id,
                provider = %provider,
                "Linked identity provider to existing account"
            );
            return self.fetch_by_id(&existing.id).await;
        }

        let id = generate_user_id();
        let insert = sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, avatar_url, provider, provider_id, email_verified_at)
            VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(full_name)
        .bind(avatar_url)
        .bind(provider)
        .bind(provider_id)
        .execute(&self.db)
        .await;

        match insert {
            Ok(_) => {
                info!(
                    user_id = %id,
                    provider = %provider,
                    email = %safe_email_log(&email),
                    "Account created from identity provider"
                );
                self.fetch_by_id(&id).await
            }
            Err(e) if is_unique_violation(&e) => {
                // A concurrent sign-in with the same assertion landed first;
                // its row is the account
                if let Some(user) = self.find_by_provider(provider, provider_id).await? {
                    return Ok(user);
                }
                self.find_by_email(&email)
                    .await?
                    .ok_or(StoreError::Database(e))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    async fn find_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE provider = ? AND provider_id = ?")
                .bind(provider)
                .bind(provider_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(user)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<User, StoreError> {
        self.find_by_id(id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// Issue a fresh verification token, replacing any pending one
    pub async fn issue_verification_token(&self, user_id: &str) -> Result<String, StoreError> {
        let token = Uuid::new_v4().to_string();
        let token_expires = future_timestamp(VERIFICATION_TOKEN_HOURS);

        sqlx::query(
            r#"
            UPDATE users
            SET verification_token = ?, verification_token_expires = ?, updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(&token)
        .bind(&token_expires)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    /// Consume a verification token and mark the account verified
    ///
    /// One conditional UPDATE does the matching, the expiry check, and the
    /// clearing of both token columns, so a token can only ever be spent
    /// once. Zero rows means invalid, expired, or already used; callers
    /// cannot tell which.
    pub async fn consume_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email_verified_at = datetime('now'),
                verification_token = NULL,
                verification_token_expires = NULL,
                updated_at = datetime('now')
            WHERE verification_token = ? AND verification_token_expires > datetime('now')
            RETURNING *
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        if let Some(user) = &user {
            info!(
                user_id = %user.id,
                email = %safe_email_log(&user.email),
                "Email address verified"
            );
        }

        Ok(user)
    }

    /// Issue a password reset token for an email, if an account exists
    ///
    /// `None` is not an error: callers stay generic about whether the email
    /// has an account.
    pub async fn issue_reset_token(&self, email: &str) -> Result<Option<(User, String)>, StoreError> {
        let email = email.trim().to_lowercase();
        let token = Uuid::new_v4().to_string();
        let token_expires = future_timestamp(RESET_TOKEN_HOURS);

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET reset_token = ?, reset_token_expires = ?, updated_at = datetime('now')
            WHERE email = ?
            RETURNING *
            "#,
        )
        .bind(&token)
        .bind(&token_expires)
        .bind(&email)
        .fetch_optional(&self.db)
        .await?;

        Ok(user.map(|user| (user, token)))
    }

    /// Consume a reset token, storing the new password hash
    ///
    /// Same atomic single-use contract as verification consumption.
    pub async fn consume_reset_token(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<Option<User>, StoreError> {
        let new_password = new_password.to_string();
        let password_hash = task::spawn_blocking(move || hash_password(&new_password))
            .await
            .map_err(|_| StoreError::HashTask)??;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = ?,
                reset_token = NULL,
                reset_token_expires = NULL,
                updated_at = datetime('now')
            WHERE reset_token = ? AND reset_token_expires > datetime('now')
            RETURNING *
            "#,
        )
        .bind(&password_hash)
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        if let Some(user) = &user {
            info!(user_id = %user.id, "Password reset completed");
        }

        Ok(user)
    }

    /// Set a new password for an account
    pub async fn update_password(
        &self,
        user_id: &str,
        new_password: &str,
    ) -> Result<(), StoreError> {
        let new_password = new_password.to_string();
        let password_hash = task::spawn_blocking(move || hash_password(&new_password))
            .await
            .map_err(|_| StoreError::HashTask)??;

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(&password_hash)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn update_last_login(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = datetime('now') WHERE id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Newest-first page of users
    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, StoreError> {
        let users =
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC LIMIT ? OFFSET ?")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?;

        Ok(users)
    }

    pub async fn count_users(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    pub async fn count_verified_users(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE email_verified_at IS NOT NULL",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    pub async fn count_oauth_users(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE provider != 'email'")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    /// Delete a user; refresh tokens go with the row via the FK cascade
    pub async fn delete_user(&self, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(user_id = %user_id, "User deleted");
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_store() -> UserStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();
        UserStore::new(pool)
    }

    #[tokio::test]
    async fn test_create_local_user_and_find() {
        let store = create_test_store().await;

        let (user, token) = store
            .create_local_user("Ada@Example.COM", "password123", Some("Ada Lovelace"))
            .await
            .unwrap();

        assert!(user.id.starts_with("U_"));
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(user.provider, "email");
        assert!(!user.is_verified());
        assert!(!token.is_empty());

        // Lookup is case-insensitive because storage is lowercased
        let found = store.find_by_email("ADA@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts_and_creates_no_row() {
        let store = create_test_store().await;

        store
            .create_local_user("dup@test.com", "password123", None)
            .await
            .unwrap();

        let result = store
            .create_local_user("DUP@test.com", "otherpassword", None)
            .await;
        assert!(matches!(result, Err(StoreError::EmailTaken)));

        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_verify_password_outcomes_are_uniform() {
        let store = create_test_store().await;

        store
            .create_local_user("user@test.com", "password123", None)
            .await
            .unwrap();

        let correct = store
            .verify_password("user@test.com", "password123")
            .await
            .unwrap();
        assert!(correct.is_some());

        let wrong_password = store
            .verify_password("user@test.com", "wrongpassword")
            .await
            .unwrap();
        assert!(wrong_password.is_none());

        let unknown_email = store
            .verify_password("nobody@test.com", "password123")
            .await
            .unwrap();
        assert!(unknown_email.is_none());
    }

    #[tokio::test]
    async fn test_oauth_only_account_rejects_password_signin() {
        let store = create_test_store().await;

        store
            .find_or_create_oauth_user("google", "g-123", "oauth@test.com", None, None)
            .await
            .unwrap();

        let result = store
            .verify_password("oauth@test.com", "anything12")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_verification_token_is_single_use() {
        let store = create_test_store().await;

        let (user, token) = store
            .create_local_user("verify@test.com", "password123", None)
            .await
            .unwrap();

        let verified = store
            .consume_verification_token(&token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verified.id, user.id);
        assert!(verified.is_verified());
        assert!(verified.verification_token.is_none());
        assert!(verified.verification_token_expires.is_none());

        // Second consumption of the same token finds nothing
        let again = store.consume_verification_token(&token).await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_expired_verification_token_rejected() {
        let store = create_test_store().await;

        let (user, token) = store
            .create_local_user("expired@test.com", "password123", None)
            .await
            .unwrap();

        sqlx::query(
            "UPDATE users SET verification_token_expires = datetime('now', '-1 hour') WHERE id = ?",
        )
        .bind(&user.id)
        .execute(&store.db)
        .await
        .unwrap();

        let result = store.consume_verification_token(&token).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_reissued_verification_token_invalidates_previous() {
        let store = create_test_store().await;

        let (user, old_token) = store
            .create_local_user("reissue@test.com", "password123", None)
            .await
            .unwrap();

        let new_token = store.issue_verification_token(&user.id).await.unwrap();
        assert_ne!(old_token, new_token);

        assert!(store
            .consume_verification_token(&old_token)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .consume_verification_token(&new_token)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_reset_token_flow() {
        let store = create_test_store().await;

        store
            .create_local_user("reset@test.com", "oldpassword1", None)
            .await
            .unwrap();

        // Unknown email issues nothing
        assert!(store
            .issue_reset_token("nobody@test.com")
            .await
            .unwrap()
            .is_none());

        let (_, token) = store
            .issue_reset_token("reset@test.com")
            .await
            .unwrap()
            .unwrap();

        let user = store
            .consume_reset_token(&token, "newpassword1")
            .await
            .unwrap()
            .unwrap();
        assert!(user.reset_token.is_none());
        assert!(user.reset_token_expires.is_none());

        // The stored hash actually changed
        assert!(store
            .verify_password("reset@test.com", "newpassword1")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .verify_password("reset@test.com", "oldpassword1")
            .await
            .unwrap()
            .is_none());

        // Single use
        assert!(store
            .consume_reset_token(&token, "thirdpassword1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_or_create_oauth_is_idempotent() {
        let store = create_test_store().await;

        let first = store
            .find_or_create_oauth_user(
                "google",
                "g-42",
                "oauth2@test.com",
                Some("OAuth User"),
                Some("https://example.com/pic.jpg"),
            )
            .await
            .unwrap();
        assert!(first.is_verified());
        assert!(first.password_hash.is_none());

        let second = store
            .find_or_create_oauth_user("google", "g-42", "oauth2@test.com", None, None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oauth_link_preserves_password_and_marks_verified() {
        let store = create_test_store().await;

        let (local, _) = store
            .create_local_user("linked@test.com", "password123", Some("Local Name"))
            .await
            .unwrap();
        assert!(!local.is_verified());

        let linked = store
            .find_or_create_oauth_user(
                "google",
                "g-77",
                "linked@test.com",
                Some("Google Name"),
                Some("https://example.com/a.jpg"),
            )
            .await
            .unwrap();

        // Same account, now provider-linked and verified, password intact
        assert_eq!(linked.id, local.id);
        assert_eq!(linked.provider, "google");
        assert_eq!(linked.provider_id.as_deref(), Some("g-77"));
        assert!(linked.is_verified());
        assert!(linked.password_hash.is_some());
        assert_eq!(store.count_users().await.unwrap(), 1);

        // Password sign-in still works after linking
        assert!(store
            .verify_password("linked@test.com", "password123")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_update_password_and_last_login() {
        let store = create_test_store().await;

        let (user, _) = store
            .create_local_user("update@test.com", "password123", None)
            .await
            .unwrap();
        assert!(user.last_login_at.is_none());

        store
            .update_password(&user.id, "replacement1")
            .await
            .unwrap();
        assert!(store
            .verify_password("update@test.com", "replacement1")
            .await
            .unwrap()
            .is_some());

        store.update_last_login(&user.id).await.unwrap();
        let reloaded = store.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(reloaded.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_admin_counts_and_delete() {
        let store = create_test_store().await;

        let (user, token) = store
            .create_local_user("one@test.com", "password123", None)
            .await
            .unwrap();
        store
            .find_or_create_oauth_user("google", "g-1", "two@test.com", None, None)
            .await
            .unwrap();
        store.consume_verification_token(&token).await.unwrap();

        assert_eq!(store.count_users().await.unwrap(), 2);
        assert_eq!(store.count_verified_users().await.unwrap(), 2);
        assert_eq!(store.count_oauth_users().await.unwrap(), 1);

        let page = store.list_users(50, 0).await.unwrap();
        assert_eq!(page.len(), 2);

        assert!(store.delete_user(&user.id).await.unwrap());
        assert!(!store.delete_user(&user.id).await.unwrap());
        assert_eq!(store.count_users().await.unwrap(), 1);
    }
}
