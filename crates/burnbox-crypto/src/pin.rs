//! Argon2id pin hashing
//!
//! Pins are short and low-entropy, so the stored hash is memory-hard and
//! salted per message. Hashes use the PHC string format, which carries its
//! own parameters; changing [`Argon2Params`] never invalidates existing
//! records.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use burnbox_core::{BoxError, PinHasher};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::{CryptoError, Result};

/// Salt length in bytes
pub const SALT_SIZE: usize = 16;

/// Argon2id cost parameters
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `m_cost`  | 19 456  | Memory usage in KiB (19 MiB) |
/// | `t_cost`  | 2       | Number of iterations |
/// | `p_cost`  | 1       | Degree of parallelism |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Time cost (number of passes)
    pub t_cost: u32,
    /// Parallelism degree
    pub p_cost: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// Salted Argon2id pin hasher
#[derive(Clone)]
pub struct Argon2PinHasher {
    argon2: Argon2<'static>,
}

impl Argon2PinHasher {
    /// Create a hasher, rejecting parameters Argon2 would refuse
    pub fn new(params: Argon2Params) -> Result<Self> {
        let params = Params::new(params.m_cost, params.t_cost, params.p_cost, None)?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a pin into a PHC string
    pub fn hash(&self, pin: &str) -> Result<String> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| CryptoError::Hash(format!("salt generation failed: {e}")))?;
        let salt = SaltString::encode_b64(&salt)?;

        let hash = self.argon2.hash_password(pin.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Check a pin against a stored PHC string.
    ///
    /// Unparseable hashes never verify.
    pub fn verify(&self, hash: &str, pin: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Unparseable pin hash: {}", e);
                return false;
            }
        };
        self.argon2.verify_password(pin.as_bytes(), &parsed).is_ok()
    }
}

impl PinHasher for Argon2PinHasher {
    fn hash(&self, pin: &str) -> std::result::Result<String, BoxError> {
        Ok(Argon2PinHasher::hash(self, pin)?)
    }

    fn verify(&self, hash: &str, pin: &str) -> bool {
        Argon2PinHasher::verify(self, hash, pin)
    }
}
