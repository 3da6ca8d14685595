// src/services/rate_limit.rs
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_limit: u32,
    pub anonymous_limit: u32,
    pub per_ip_limit: u32,
    pub window_seconds: u32,
    pub whitelist_ips: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_limit: 100, // 100 requests per minute for authenticated users
            anonymous_limit: 20,      // 20 requests per minute for anonymous users
            per_ip_limit: 50,         // 50 requests per minute per IP
            window_seconds: 60,       // 60 second window
            whitelist_ips: vec!["127.0.0.1".to_string(), "::1".to_string()],
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // RATE_LIMIT_ENABLED - set to "false" to disable rate limiting
        if let Ok(enabled) = env::var("RATE_LIMIT_ENABLED") {
            config.enabled = enabled.to_lowercase() != "false";
        }

        // RATE_LIMIT_AUTHENTICATED - requests per window for authenticated users
        if let Ok(limit) = env::var("RATE_LIMIT_AUTHENTICATED") {
            if let Ok(val) = limit.parse::<u32>() {
                config.authenticated_limit = val;
            }
        }

        // RATE_LIMIT_ANONYMOUS - requests per window for anonymous users
        if let Ok(limit) = env::var("RATE_LIMIT_ANONYMOUS") {
            if let Ok(val) = limit.parse::<u32>() {
                config.anonymous_limit = val;
            }
        }

        // RATE_LIMIT_PER_IP - requests per window per IP address
        if let Ok(limit) = env::var("RATE_LIMIT_PER_IP") {
            if let Ok(val) = limit.parse::<u32>() {
                config.per_ip_limit = val;
            }
        }

        // RATE_LIMIT_WINDOW_SECONDS - time window in seconds
        if let Ok(window) = env::var("RATE_LIMIT_WINDOW_SECONDS") {
            if let Ok(val) = window.parse::<u32>() {
                config.window_seconds = val;
            }
        }

        // RATE_LIMIT_WHITELIST_IPS - comma-separated list of whitelisted IPs
        if let Ok(whitelist) = env::var("RATE_LIMIT_WHITELIST_IPS") {
            config.whitelist_ips = whitelist
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config
    }
}

#[derive(Debug, Clone)]
struct RateLimitState {
    count: u32,
    window_start: Instant,
}

impl RateLimitState {
    // Starts at zero; the admitting request increments it, so a window
    // admits exactly `limit` requests per key
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }

    fn increment(&mut self) {
        self.count += 1;
    }

    fn reset(&mut self) {
        self.count = 1;
        self.window_start = Instant::now();
    }

    fn is_expired(&self, window_duration: Duration) -> bool {
        self.window_start.elapsed() > window_duration
    }
}

#[derive(Debug)]
pub enum RateLimitResult {
    Allowed,
    Limited { retry_after: u32 },
}

/// In-memory fixed-window rate limiter keyed by caller identity and IP.
///
/// Configuration is resolved from the environment once at startup.
#[derive(Debug, Clone)]
pub struct RateLimitService {
    config: RateLimitConfig,
    rate_limiter: Arc<RwLock<HashMap<String, RateLimitState>>>,
}

impl RateLimitService {
    pub fn new() -> Self {
        let config = RateLimitConfig::from_env();
        info!(
            enabled = config.enabled,
            authenticated_limit = config.authenticated_limit,
            anonymous_limit = config.anonymous_limit,
            per_ip_limit = config.per_ip_limit,
            window_seconds = config.window_seconds,
            whitelist_ips = ?config.whitelist_ips,
            "Initializing RateLimitService"
        );
        Self::with_config(config)
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check if an IP is whitelisted
    fn is_whitelisted(&self, ip: &str) -> bool {
        self.config
            .whitelist_ips
            .iter()
            .any(|whitelisted_ip| whitelisted_ip == ip)
    }

    /// Check rate limit for a given identifier
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        ip_address: Option<&str>,
        is_authenticated: bool,
    ) -> RateLimitResult {
        // If rate limiting is disabled, allow all requests
        if !self.config.enabled {
            return RateLimitResult::Allowed;
        }

        if let Some(ip) = ip_address {
            if self.is_whitelisted(ip) {
                return RateLimitResult::Allowed;
            }
        }

        // Determine the rate limit based on authentication status
        let limit = if is_authenticated {
            self.config.authenticated_limit
        } else {
            self.config.anonymous_limit
        };

        let window_duration = Duration::from_secs(self.config.window_seconds as u64);

        // Check user/identifier rate limit
        let user_result = self
            .check_limit_for_key(identifier, limit, window_duration)
            .await;

        if let RateLimitResult::Limited { retry_after } = user_result {
            return RateLimitResult::Limited { retry_after };
        }

        // Check per-IP rate limit if IP is provided
        if let Some(ip) = ip_address {
            let ip_key = format!("ip:{}", ip);
            let ip_result = self
                .check_limit_for_key(&ip_key, self.config.per_ip_limit, window_duration)
                .await;

            if let RateLimitResult::Limited { retry_after } = ip_result {
                return RateLimitResult::Limited { retry_after };
            }
        }

        RateLimitResult::Allowed
    }

    /// Internal method to check rate limit for a specific key
    async fn check_limit_for_key(
        &self,
        key: &str,
        limit: u32,
        window_duration: Duration,
    ) -> RateLimitResult {
        let mut limiter = self.rate_limiter.write().await;

        let state = limiter
            .entry(key.to_string())
            .or_insert_with(RateLimitState::new);

        // Check if the window has expired
        if state.is_expired(window_duration) {
            state.reset();
            return RateLimitResult::Allowed;
        }

        // Check if limit is exceeded
        if state.count >= limit {
            let elapsed = state.window_start.elapsed().as_secs() as u32;
            let retry_after = window_duration.as_secs() as u32 - elapsed;
            return RateLimitResult::Limited { retry_after };
        }

        // Increment the counter
        state.increment();
        RateLimitResult::Allowed
    }

    /// Log a rate limit violation
    pub async fn log_violation(&self, identifier: &str, ip_address: Option<&str>, endpoint: &str) {
        warn!(
            identifier = %identifier,
            ip_address = ?ip_address,
            endpoint = %endpoint,
            "Rate limit violation detected"
        );
    }

    /// Clean up expired entries
    pub async fn cleanup_expired(&self) {
        let window_duration = Duration::from_secs(self.config.window_seconds as u64);
        let mut limiter = self.rate_limiter.write().await;
        let before = limiter.len();
        limiter.retain(|_, state| !state.is_expired(window_duration));
        let removed = before - limiter.len();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired rate limit entries");
        }
    }

    /// Spawn the periodic cleanup of stale counter entries
    pub fn start_cleanup_task(service: Arc<RateLimitService>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                service.cleanup_expired().await;
            }
        });
    }
}

impl Default for RateLimitService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> RateLimitService {
        RateLimitService::with_config(RateLimitConfig {
            enabled: true,
            authenticated_limit: 5,
            anonymous_limit: 2,
            per_ip_limit: 8,
            window_seconds: 60,
            whitelist_ips: vec!["127.0.0.1".to_string()],
        })
    }

    #[tokio::test]
    async fn test_rate_limit_allows_within_limit() {
        let service = create_test_service();

        let result = service
            .check_rate_limit("user123", Some("192.168.1.1"), true)
            .await;
        assert!(matches!(result, RateLimitResult::Allowed));
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_when_exceeded() {
        let service = create_test_service();

        // The first request creates the entry at count 1, so the limit
        // admits `authenticated_limit` requests in total
        for _ in 0..5 {
            let result = service
                .check_rate_limit("user123", Some("192.168.1.1"), true)
                .await;
            assert!(matches!(result, RateLimitResult::Allowed));
        }

        let result = service
            .check_rate_limit("user123", Some("192.168.1.1"), true)
            .await;
        assert!(matches!(result, RateLimitResult::Limited { .. }));
    }

    #[tokio::test]
    async fn test_anonymous_limit_is_lower() {
        let service = create_test_service();

        for _ in 0..2 {
            let result = service
                .check_rate_limit("anon:192.168.1.1", None, false)
                .await;
            assert!(matches!(result, RateLimitResult::Allowed));
        }

        let result = service
            .check_rate_limit("anon:192.168.1.1", None, false)
            .await;
        assert!(matches!(result, RateLimitResult::Limited { .. }));
    }

    #[tokio::test]
    async fn test_whitelist_bypasses_rate_limit() {
        let service = create_test_service();

        for _ in 0..20 {
            let result = service
                .check_rate_limit("user123", Some("127.0.0.1"), true)
                .await;
            assert!(matches!(result, RateLimitResult::Allowed));
        }
    }

    #[tokio::test]
    async fn test_different_users_have_separate_limits() {
        let service = create_test_service();

        for _ in 0..5 {
            service
                .check_rate_limit("user1", Some("192.168.1.1"), true)
                .await;
        }

        let result = service
            .check_rate_limit("user2", Some("192.168.1.2"), true)
            .await;
        assert!(matches!(result, RateLimitResult::Allowed));
    }

    #[tokio::test]
    async fn test_per_ip_limit_spans_users() {
        let service = create_test_service();

        // Different user keys, same IP: the IP counter is the one that trips
        for i in 0..8 {
            let user = format!("user{}", i);
            let result = service
                .check_rate_limit(&user, Some("10.0.0.1"), true)
                .await;
            assert!(matches!(result, RateLimitResult::Allowed));
        }

        let result = service
            .check_rate_limit("user_final", Some("10.0.0.1"), true)
            .await;
        assert!(matches!(result, RateLimitResult::Limited { .. }));
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let service = RateLimitService::with_config(RateLimitConfig {
            enabled: false,
            authenticated_limit: 1,
            anonymous_limit: 1,
            per_ip_limit: 1,
            window_seconds: 60,
            whitelist_ips: vec![],
        });

        for _ in 0..10 {
            let result = service
                .check_rate_limit("user123", Some("192.168.1.1"), false)
                .await;
            assert!(matches!(result, RateLimitResult::Allowed));
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_entries() {
        let service = RateLimitService::with_config(RateLimitConfig {
            enabled: true,
            authenticated_limit: 5,
            anonymous_limit: 2,
            per_ip_limit: 8,
            window_seconds: 0,
            whitelist_ips: vec![],
        });

        service
            .check_rate_limit("user123", Some("192.168.1.1"), true)
            .await;
        assert!(!service.rate_limiter.read().await.is_empty());

        // With a zero-length window every entry is already expired
        service.cleanup_expired().await;
        assert!(service.rate_limiter.read().await.is_empty());
    }
}
