pub mod seed;
pub mod session;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

// ── Password helpers ──────────────────────────────────────────

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt    = SaltString::generate(&mut OsRng);
    let argon2  = Argon2::default();
    let hash    = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<()> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid hash: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthorized)
}

/// Login miss for an unknown username. Spends the same argon2 work as a real
/// verification so response time does not reveal which usernames exist.
pub fn reject_unknown_user(password: &str) -> AppError {
    let _ = hash_password(password);
    AppError::Unauthorized
}

// ── Token helper ──────────────────────────────────────────────

/// Generate a 64-char hex token from two UUIDs (256 bits of entropy).
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

// ── Password validation ───────────────────────────────────────

/// Only enforced outside `development`; see the register handler.
pub fn validate_password_strength(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        return Err(AppError::BadRequest("Password must be at least 8 characters".into()));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(AppError::BadRequest(
            "Password must contain at least one uppercase letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(
            "Password must contain at least one number".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("Challenge1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Challenge1", &hash).is_ok());
        assert!(matches!(
            verify_password("challenge1", &hash),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn unknown_user_is_unauthorized() {
        assert!(matches!(reject_unknown_user("Challenge1"), AppError::Unauthorized));
    }

    #[test]
    fn garbage_hash_is_internal_error() {
        assert!(matches!(
            verify_password("whatever", "not-a-phc-string"),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn password_strength_rules() {
        assert!(validate_password_strength("short1A").is_err());
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
        assert!(validate_password_strength("Str0ngEnough").is_ok());
    }
}
