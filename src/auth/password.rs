//! Password hashing and verification.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Argon2id hasher producing self-describing PHC strings.
///
/// Salt and cost parameters are stored in the hash itself, so raising the cost
/// only affects new hashes; existing ones keep verifying with the parameters
/// they were created with.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(config.hash_memory_kib, config.hash_iterations, config.hash_parallelism)
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, plain: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    /// Verify a password against a stored hash.
    ///
    /// The digest comparison is constant-time. Unparseable hashes verify as false.
    pub fn verify(&self, plain: &str, hashed: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hashed) {
            Ok(h) => h,
            Err(e) => {
                warn!("Stored password hash could not be parsed: {}", e);
                return false;
            }
        };
        self.argon2.verify_password(plain.as_bytes(), &parsed_hash).is_ok()
    }
}
