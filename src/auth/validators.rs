// src/auth/validators.rs

use super::models::{SigninPayload, SignupPayload};
use crate::common::{ValidationResult, Validator};
use regex::Regex;

// ============================================================================
// Sign-up Validator
// ============================================================================

pub struct SignupValidator;

impl Validator<SignupPayload> for SignupValidator {
    fn validate(&self, data: &SignupPayload) -> ValidationResult {
        let mut result = ValidationResult::new();

        // Validate email
        if data.email.trim().is_empty() {
            result.add_error("email", "Valid email is required");
        } else if !is_valid_email(data.email.trim()) {
            result.add_error("email", "Valid email is required");
        }

        // Validate password
        if data.password.len() < 8 {
            result.add_error("password", "Password must be at least 8 characters");
        } else if data.password.len() > 128 {
            result.add_error("password", "Password must be less than 128 characters");
        }

        // Validate full_name if provided
        if let Some(full_name) = &data.full_name {
            if full_name.len() > 255 {
                result.add_error("full_name", "Full name must be less than 255 characters");
            }
        }

        result
    }
}

// ============================================================================
// Sign-in Validator
// ============================================================================

pub struct SigninValidator;

impl Validator<SigninPayload> for SigninValidator {
    fn validate(&self, data: &SigninPayload) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.email.trim().is_empty() || !is_valid_email(data.email.trim()) {
            result.add_error("email", "Valid email is required");
        }

        if data.password.is_empty() {
            result.add_error("password", "Password is required");
        }

        result
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Simplified RFC 5322 shape; deliverability is proven by the verification
/// email, not the pattern
fn is_valid_email(email: &str) -> bool {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$")
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}
