//! # Burnbox Core
//!
//! Core types, traits, and message processing for Burnbox, a store of
//! burn-after-read secrets.
//!
//! This crate provides:
//! - The persisted [`Message`] record and random [`MessageKey`] generation
//! - The [`MessageStore`] contract implemented by storage engines
//! - The [`Crypter`] and [`PinHasher`] contracts implemented by `burnbox-crypto`
//! - File message framing
//! - The [`MessageProcessor`] that drives create, reveal, and destruction

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod clock;
pub mod crypt;
pub mod error;
pub mod file;
pub mod message;
pub mod processor;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crypt::{Crypter, PinHasher};
pub use error::{BoxError, Error, Result, StoreError};
pub use message::{Message, MessageKey};
pub use processor::{FileRequest, MessageProcessor, MessageRequest, ProcessorParams, Revealed, Secret};
pub use storage::{MessageStore, StoreResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::crypt::{Crypter, PinHasher};
    pub use crate::error::{Error, Result, StoreError};
    pub use crate::message::{Message, MessageKey};
    pub use crate::processor::{FileRequest, MessageProcessor, MessageRequest, Revealed, Secret};
    pub use crate::storage::{MessageStore, StoreResult};
}
