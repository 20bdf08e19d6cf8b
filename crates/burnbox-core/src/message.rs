//! Persisted message record and key generation

use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length of a generated message key
pub const KEY_LEN: usize = 12;

const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

// Largest multiple of 62 that fits in a byte; anything at or above it is
// rejected to keep the alphabet uniform.
const REJECT_FROM: u8 = 248;

/// Externally visible message identifier
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKey(String);

impl MessageKey {
    /// Wrap an existing key, e.g. one taken from a request path
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generate a fresh random base62 key from the OS RNG
    pub fn generate() -> Result<Self, rand::Error> {
        let mut key = String::with_capacity(KEY_LEN);
        let mut buf = [0u8; 32];

        while key.len() < KEY_LEN {
            OsRng.try_fill_bytes(&mut buf)?;
            for &b in buf.iter().filter(|&&b| b < REJECT_FROM) {
                if key.len() == KEY_LEN {
                    break;
                }
                key.push(BASE62[usize::from(b % 62)] as char);
            }
        }

        Ok(Self(key))
    }

    /// Key as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageKey({})", self.0)
    }
}

impl From<&str> for MessageKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Stored secret with expiry and pin verification data
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message key
    pub key: MessageKey,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
    /// Encrypted payload, or the caller's opaque blob
    pub data: Vec<u8>,
    /// Hash of the pin
    pub pin_hash: String,
    /// Failed pin attempts so far
    pub errors: u32,
    /// Payload was encrypted by the caller
    pub client_encrypted: bool,
}

impl Message {
    /// Check expiry against the given instant
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Payload and pin hash stay out of logs.
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("key", &self.key)
            .field("expires_at", &self.expires_at)
            .field("data_len", &self.data.len())
            .field("errors", &self.errors)
            .field("client_encrypted", &self.client_encrypted)
            .finish_non_exhaustive()
    }
}
