//! API-key generation and hashing.
//!
//! A key's plaintext secret exists only at generation time and in the
//! caller's hands afterward - only an Argon2 hash of it is ever persisted.
//! The first 12 characters of the full key are also stored, unhashed, as a
//! lookup prefix so the verify path doesn't need to hash against every row
//! in the table.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use karto_errors::{AppError, AppResult};
use rand::RngCore;

const PREFIX_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// The full secret, shown to the caller exactly once.
    pub secret: String,
    /// The first [`PREFIX_LEN`] characters, used as a lookup index.
    pub lookup_prefix: String,
}

/// Generates a new key of the form `"{prefix}{url_safe(random bytes)}"`.
pub fn generate_api_key(prefix: &str, entropy_bytes: usize) -> GeneratedApiKey {
    let mut bytes = vec![0u8; entropy_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    let secret = format!("{prefix}{encoded}");
    let lookup_prefix = secret.chars().take(PREFIX_LEN).collect();
    GeneratedApiKey {
        secret,
        lookup_prefix,
    }
}

/// An Argon2 hash of an API-key secret, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyHash(String);

impl ApiKeyHash {
    pub fn hash(secret: &str) -> AppResult<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| AppError::internal(format!("api key hashing failed: {e}")))?
            .to_string();
        Ok(Self(hash))
    }

    pub fn from_stored(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verifies `candidate` against this hash. Any failure to parse the
    /// stored hash or to verify is treated as a non-match - this never
    /// propagates an error, matching the rest of the credential path where
    /// "I couldn't tell" and "it's wrong" are indistinguishable to a caller.
    pub fn verify(&self, candidate: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_carries_prefix_and_matching_lookup_prefix() {
        let key = generate_api_key("karto_", 32);
        assert!(key.secret.starts_with("karto_"));
        assert_eq!(key.lookup_prefix.len(), PREFIX_LEN);
        assert!(key.secret.starts_with(&key.lookup_prefix));
    }

    #[test]
    fn hash_verifies_correct_secret_and_rejects_wrong_one() {
        let key = generate_api_key("karto_", 32);
        let hash = ApiKeyHash::hash(&key.secret).unwrap();
        assert!(hash.verify(&key.secret));
        assert!(!hash.verify("karto_wrongsecret"));
    }

    #[test]
    fn verify_never_panics_on_garbage_stored_hash() {
        let hash = ApiKeyHash::from_stored("not-a-real-hash".to_string());
        assert!(!hash.verify("anything"));
    }

    #[test]
    fn two_generations_never_collide() {
        let a = generate_api_key("karto_", 32);
        let b = generate_api_key("karto_", 32);
        assert_ne!(a.secret, b.secret);
    }
}
