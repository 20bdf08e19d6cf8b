//! Encryption and pin hashing interfaces consumed by the processor

use crate::error::BoxError;

/// Symmetric encryption keyed by server secret and pin
#[cfg_attr(test, mockall::automock)]
pub trait Crypter: Send + Sync {
    /// Encrypt `data` under a key derived from `pin`
    fn encrypt(&self, data: &[u8], pin: &str) -> Result<Vec<u8>, BoxError>;

    /// Decrypt `data` under a key derived from `pin`.
    ///
    /// Wrong key and corrupted input must be indistinguishable.
    fn decrypt(&self, data: &[u8], pin: &str) -> Result<Vec<u8>, BoxError>;
}

/// One-way salted pin hashing
#[cfg_attr(test, mockall::automock)]
pub trait PinHasher: Send + Sync {
    /// Hash a pin for storage
    fn hash(&self, pin: &str) -> Result<String, BoxError>;

    /// Check a pin against a stored hash in constant time
    fn verify(&self, hash: &str, pin: &str) -> bool;
}
