//! # Burnbox Crypto
//!
//! Encryption and pin hashing behind the [`burnbox_core::Crypter`] and
//! [`burnbox_core::PinHasher`] interfaces.
//!
//! - [`cipher`]: XChaCha20-Poly1305 keyed by server sign key and pin
//! - [`pin`]: Argon2id pin hashes in PHC format

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cipher;
pub mod error;
pub mod pin;

pub use cipher::{derive_sign_key, SecretCipher};
pub use error::{CryptoError, Result};
pub use pin::{Argon2Params, Argon2PinHasher};
