//! Salted password hashing with argon2id.
//!
//! Hashes and salts are stored base64-encoded. Comparison runs in constant time.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::random::RandomSource;

/// Salt length used when the caller does not ask for one.
pub const DEFAULT_SALT_LENGTH: usize = 32;

/// Longest salt accepted from configuration.
pub const MAX_SALT_LENGTH: usize = 1024;

/// Derived key length in bytes.
const HASH_LENGTH: usize = 32;

/// Cost parameters for the key derivation.
#[derive(Debug, Clone, Copy)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt_length: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
            salt_length: DEFAULT_SALT_LENGTH,
        }
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid key derivation parameters: {0}")]
    Params(argon2::Error),
    #[error("key derivation failed: {0}")]
    Kdf(argon2::Error),
    #[error("stored salt is not valid base64: {0}")]
    SaltEncoding(#[source] base64::DecodeError),
    #[error("stored hash is not valid base64: {0}")]
    HashEncoding(#[source] base64::DecodeError),
}

#[derive(Clone)]
pub struct CredentialVerifier {
    params: Params,
    salt_length: usize,
    random: Arc<dyn RandomSource>,
}

impl CredentialVerifier {
    pub fn new(config: HashConfig, random: Arc<dyn RandomSource>) -> Result<Self, PasswordError> {
        if config.salt_length < argon2::MIN_SALT_LEN {
            return Err(PasswordError::Params(argon2::Error::SaltTooShort));
        }
        if config.salt_length > MAX_SALT_LENGTH {
            return Err(PasswordError::Params(argon2::Error::SaltTooLong));
        }

        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(HASH_LENGTH),
        )
        .map_err(PasswordError::Params)?;

        Ok(Self {
            params,
            salt_length: config.salt_length,
            random,
        })
    }

    /// Random salt of `length` bytes, or the configured default.
    pub fn salt(&self, length: Option<usize>) -> Vec<u8> {
        let mut salt = vec![0u8; length.unwrap_or(self.salt_length)];
        self.random.fill_bytes(&mut salt);
        salt
    }

    /// Derive the base64 hash of `password` under `salt`.
    pub fn hash_with_salt(&self, password: &str, salt: &[u8]) -> Result<String, PasswordError> {
        let raw = self.derive(password, salt)?;
        Ok(STANDARD.encode(raw))
    }

    /// Recompute the hash with the stored salt and compare in constant time.
    pub fn compare_passwords(
        &self,
        stored_hash: &str,
        password: &str,
        stored_salt: &str,
    ) -> Result<bool, PasswordError> {
        let salt = STANDARD
            .decode(stored_salt)
            .map_err(PasswordError::SaltEncoding)?;
        let expected = STANDARD
            .decode(stored_hash)
            .map_err(PasswordError::HashEncoding)?;

        let computed = self.derive(password, &salt)?;
        Ok(computed[..].ct_eq(&expected[..]).into())
    }

    /// Base64 form of a salt, as stored alongside the hash.
    pub fn encode_salt(salt: &[u8]) -> String {
        STANDARD.encode(salt)
    }

    fn derive(&self, password: &str, salt: &[u8]) -> Result<[u8; HASH_LENGTH], PasswordError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let mut out = [0u8; HASH_LENGTH];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut out)
            .map_err(PasswordError::Kdf)?;
        Ok(out)
    }
}
