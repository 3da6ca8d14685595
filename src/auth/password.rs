//! Password hashing helpers
//!
//! Passwords are Argon2id-hashed with a per-password random salt. OAuth-only
//! accounts carry no hash at all.

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password")]
    HashFailed,

    #[error("Stored password hash is malformed")]
    MalformedHash,
}

/// Hash a password with Argon2id and a fresh random salt
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::HashFailed)?;

    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2id hash
///
/// A mismatch is `Ok(false)`; only an unparseable stored hash is an error.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::MalformedHash)?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();

        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("incorrect horse", &hash).unwrap());
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let first = hash_password("hunter22").unwrap();
        let second = hash_password("hunter22").unwrap();

        // Random salts mean the encoded hashes never collide
        assert_ne!(first, second);
        assert!(verify_password("hunter22", &first).unwrap());
        assert!(verify_password("hunter22", &second).unwrap());
    }

    #[test]
    fn test_malformed_stored_hash_is_an_error() {
        let result = verify_password("whatever", "not-a-phc-string");
        assert!(matches!(result, Err(PasswordError::MalformedHash)));
    }

    #[test]
    fn test_hash_is_phc_formatted() {
        let hash = hash_password("pw123456").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }
}
