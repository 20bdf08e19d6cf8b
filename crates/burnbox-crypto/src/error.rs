//! Error types for cryptographic operations

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Sign key and pin do not add up to a full key
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Wrong key, tampered input or truncated input
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Pin hashing failed
    #[error("Hash error: {0}")]
    Hash(String),

    /// Argon2 parameters rejected
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

impl From<chacha20poly1305::Error> for CryptoError {
    fn from(_: chacha20poly1305::Error) -> Self {
        CryptoError::DecryptionFailed
    }
}

impl From<argon2::password_hash::Error> for CryptoError {
    fn from(err: argon2::password_hash::Error) -> Self {
        CryptoError::Hash(err.to_string())
    }
}

impl From<argon2::Error> for CryptoError {
    fn from(err: argon2::Error) -> Self {
        CryptoError::InvalidParams(err.to_string())
    }
}
