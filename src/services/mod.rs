// src/services/mod.rs
//
// Shared services module containing business logic services
// that can be used across different domain modules

pub mod email;
pub mod google;
pub mod rate_limit;
pub mod settings;
pub mod tokens;

// Re-export commonly used types for convenience
pub use email::EmailService;
pub use google::GoogleAuthService;
pub use rate_limit::RateLimitService;
pub use settings::SettingsService;
pub use tokens::TokenService;
