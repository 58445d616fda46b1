//! Account passwords: the strength policy and Argon2id hashing.
//!
//! Stored hashes are PHC strings, so verification reads the parameters from
//! the hash itself and older hashes keep working after a parameter bump.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    /// The password breaks the policy. The message is shown to the user.
    #[error("{0}")]
    TooWeak(&'static str),

    #[error("Stored password hash is malformed")]
    MalformedHash,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 64;

// 19 MiB, 2 passes, 1 lane
const ARGON2_PARAMS: (u32, u32, u32) = (19 * 1024, 2, 1);

fn argon2() -> Result<Argon2<'static>, PasswordError> {
    let (memory_kib, passes, lanes) = ARGON2_PARAMS;
    let params = Params::new(memory_kib, passes, lanes, Some(32))
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// 6-64 characters with at least one letter and one digit.
pub fn check_password_strength(password: &str) -> Result<(), PasswordError> {
    let rules: [(fn(&str) -> bool, &'static str); 4] = [
        (
            |p| p.chars().count() >= MIN_PASSWORD_LEN,
            "Password must be at least 6 characters",
        ),
        (
            |p| p.chars().count() <= MAX_PASSWORD_LEN,
            "Password must be at most 64 characters",
        ),
        (
            |p| p.chars().any(char::is_alphabetic),
            "Password must contain at least one letter",
        ),
        (
            |p| p.chars().any(|c| c.is_ascii_digit()),
            "Password must contain at least one digit",
        ),
    ];

    match rules.iter().find(|(holds, _)| !holds(password)) {
        Some((_, message)) => Err(PasswordError::TooWeak(message)),
        None => Ok(()),
    }
}

/// Hash with a fresh random salt.
///
/// ```
/// use shared::password::hash_password;
///
/// let hash = hash_password("offtimes42").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Compare `password` with a stored hash. A mismatch is `Ok(false)`.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|_| PasswordError::MalformedHash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Hashing(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_uses_configured_params() {
        let hash = hash_password("offtimes42").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=19456,t=2,p=1$"));
        assert_ne!(hash, hash_password("offtimes42").unwrap());
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("学习time2024").unwrap();
        assert!(verify_password("学习time2024", &hash).unwrap());
        assert!(!verify_password("学习time2025", &hash).unwrap());
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(PasswordError::MalformedHash)
        ));
    }

    #[test]
    fn test_strength_policy() {
        assert!(check_password_strength("abc123").is_ok());
        assert!(check_password_strength("学习time2024").is_ok());

        let cases = [
            ("a1", "at least 6"),
            ("12345678", "letter"),
            ("abcdefgh", "digit"),
        ];
        for (password, expected) in cases {
            let err = check_password_strength(password).unwrap_err();
            assert!(err.to_string().contains(expected), "{}: {}", password, err);
        }
        assert!(check_password_strength(&format!("a1{}", "x".repeat(63))).is_err());
    }
}
