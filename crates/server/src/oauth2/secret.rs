//! Client secret hashing and random credential generation.
//!
//! Secrets are hashed with Argon2id; tokens, codes and generated secrets are
//! URL-safe base64 over OS randomness.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use thiserror::Error;

/// 256 bits, used for authorization codes, device codes and generated secrets.
pub const CODE_BYTES: usize = 32;
/// Access and refresh tokens are 384 bits (64 base64url characters).
pub const TOKEN_BYTES: usize = 48;
/// Minimum length of a caller-supplied client secret.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to hash secret: {0}")]
    Hash(String),
    #[error("OS random source unavailable: {0}")]
    Random(getrandom::Error),
}

/// Hashes and verifies client secrets. Implementations must compare in
/// constant time.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, SecretError>;

    /// A malformed stored hash verifies as `false`.
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// Argon2id with a random per-secret salt.
#[derive(Clone)]
pub struct Argon2SecretHasher {
    argon2: Argon2<'static>,
}

impl Argon2SecretHasher {
    pub fn new() -> Self {
        Self::with_params(Params::default())
    }

    /// Custom cost parameters; tests use the minimum to stay fast.
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2SecretHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretHasher for Argon2SecretHasher {
    fn hash(&self, secret: &str) -> Result<String, SecretError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| SecretError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(secret.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// `len` random bytes, URL-safe base64 without padding.
pub fn random_token(len: usize) -> Result<String, SecretError> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).map_err(SecretError::Random)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Fill a fixed buffer from the OS random source.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], SecretError> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes).map_err(SecretError::Random)?;
    Ok(bytes)
}

/// Caller-supplied secrets need at least 32 characters drawn from two or
/// more of: lowercase, uppercase, digits, symbols.
pub fn is_strong_secret(secret: &str) -> bool {
    if secret.chars().count() < MIN_SECRET_LEN {
        return false;
    }
    let classes = [
        secret.chars().any(|c| c.is_ascii_lowercase()),
        secret.chars().any(|c| c.is_ascii_uppercase()),
        secret.chars().any(|c| c.is_ascii_digit()),
        secret.chars().any(|c| !c.is_ascii_alphanumeric()),
    ];
    classes.iter().filter(|present| **present).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> Argon2SecretHasher {
        Argon2SecretHasher::with_params(Params::new(8, 1, 1, None).unwrap())
    }

    #[test]
    fn test_hash_and_verify_secret() {
        let hasher = fast_hasher();
        let secret = "a-very-long-client-secret-0123456789";
        let hash = hasher.hash(secret).expect("Failed to hash secret");

        assert!(hash.starts_with("$argon2id"));
        assert!(hasher.verify(secret, &hash));
        assert!(!hasher.verify("wrong-secret", &hash));
    }

    #[test]
    fn test_hash_produces_different_salts() {
        let hasher = fast_hasher();
        let hash1 = hasher.hash("same-secret").unwrap();
        let hash2 = hasher.hash("same-secret").unwrap();
        assert_ne!(hash1, hash2);
        assert!(hasher.verify("same-secret", &hash1));
        assert!(hasher.verify("same-secret", &hash2));
    }

    #[test]
    fn test_verify_invalid_hash_format() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("secret", "not-a-valid-hash"));
        assert!(!hasher.verify("secret", ""));
    }

    #[test]
    fn test_random_token_sizes() {
        let access = random_token(TOKEN_BYTES).unwrap();
        let code = random_token(CODE_BYTES).unwrap();
        assert_eq!(access.len(), 64);
        assert_eq!(code.len(), 43);
        assert!(!access.contains(['+', '/', '=']));
        assert_ne!(code, random_token(CODE_BYTES).unwrap());
    }

    #[test]
    fn test_secret_strength() {
        assert!(!is_strong_secret("short"));
        assert!(!is_strong_secret(&"a".repeat(40)));
        assert!(is_strong_secret(&format!("{}1", "a".repeat(31))));
        assert!(is_strong_secret("ABCDEFGHIJKLMNOPQRSTUVWXYZ-_-_-_-"));
    }
}
