//! Storage interface for message engines
//!
//! The processor owns this contract; backends in `burnbox-store` implement it.
//! Engines act as dumb storage: they never decrypt and never check pins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::message::{Message, MessageKey};

/// Storage result alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Keyed store of encrypted messages with expiry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a new message
    async fn save(&self, msg: &Message) -> StoreResult<()>;

    /// Load a message by key.
    ///
    /// Records past their expiry may still be returned until swept, callers
    /// must check [`Message::is_expired`].
    async fn load(&self, key: &MessageKey) -> StoreResult<Message>;

    /// Atomically increment the failed-attempt counter, returning the new value
    async fn increment_errors(&self, key: &MessageKey) -> StoreResult<u32>;

    /// Delete a message, returning whether a record was actually removed.
    ///
    /// Absent keys are not an error.
    async fn remove(&self, key: &MessageKey) -> StoreResult<bool>;

    /// Delete every message expired at `now`, returning the count removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    /// Stop background work and release resources
    async fn close(&self) -> StoreResult<()>;
}
