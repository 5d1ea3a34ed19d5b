//! Password digests, API key generation and secret comparison.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use subtle::ConstantTimeEq;

const API_KEY_BYTES: usize = 32;

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing API keys, password digests, and other sensitive values
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Check a password against a stored hash.
///
/// Anything that is not a PHC string is treated as a plain SHA-256 hex
/// digest, the format of user files written before Argon2 was adopted.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with('$') {
        return match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        };
    }
    constant_time_compare(&hex::encode(Sha256::digest(password.as_bytes())), stored)
}

/// Hash to verify against when no account exists, so an unknown email costs
/// the same single Argon2 verification as a wrong password.
pub fn dummy_password_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("").unwrap_or_default())
}

/// Generate a URL-safe random secret (43 characters for 32 bytes).
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret123", "secret123"));
        assert!(!constant_time_compare("secret123", "secret124"));
        assert!(!constant_time_compare("secret123", "secret12"));
        assert!(!constant_time_compare("", "secret"));
    }

    // ==================== Password Tests ====================

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("pw123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("pw123", &hash));
        assert!(!verify_password("pw124", &hash));
        assert!(!hash.contains("pw123"));
    }

    #[test]
    fn test_hash_password_is_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_verify_unsalted_digest() {
        // sha256("password")
        let legacy = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        assert!(verify_password("password", legacy));
        assert!(!verify_password("Password", legacy));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("pw", "$argon2id$garbage"));
        assert!(!verify_password("pw", "not-a-digest"));
        assert!(!verify_password("pw", ""));
    }

    #[test]
    fn test_dummy_hash_is_stable_argon2() {
        let dummy = dummy_password_hash();
        assert!(dummy.starts_with("$argon2id$"));
        assert_eq!(dummy, dummy_password_hash());
        assert!(!verify_password("pw", dummy));
    }

    // ==================== API Key Tests ====================

    #[test]
    fn test_generate_api_key_shape() {
        let key = generate_api_key();
        assert_eq!(key.len(), 43);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generate_api_key_unique() {
        assert_ne!(generate_api_key(), generate_api_key());
    }
}
