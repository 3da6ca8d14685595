//! # Auth Module
//!
//! This module handles all account and session functionality including:
//! - Local email/password sign-up and sign-in
//! - Google OAuth sign-in
//! - Access/refresh token issuance and revocation
//! - Email verification and password reset flows
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod password;
pub mod routes;
pub mod store;
pub mod validators;

#[cfg(test)]
mod tests;

pub use extractors::AuthedUser;
pub use models::User;
pub use routes::auth_routes;
pub use store::UserStore;
