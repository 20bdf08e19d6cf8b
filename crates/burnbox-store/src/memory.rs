//! In-memory message store

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use burnbox_core::{Message, MessageKey, MessageStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::sweeper::{SweepOptions, Sweeper};

/// Volatile store backed by a sharded map. Contents are lost on drop.
pub struct MemoryStore {
    messages: Arc<DashMap<MessageKey, Message>>,
    sweeper: Sweeper,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store without a background sweep
    pub fn new() -> Self {
        info!("Memory store created");
        Self {
            messages: Arc::new(DashMap::new()),
            sweeper: Sweeper::disabled(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create an empty store that sweeps expired messages in the background
    pub fn with_sweeper(options: &SweepOptions) -> StoreResult<Self> {
        let messages: Arc<DashMap<MessageKey, Message>> = Arc::new(DashMap::new());

        let target = Arc::clone(&messages);
        let sweeper = Sweeper::spawn("memory", options, move |now| {
            let removed = purge(&target, now);
            async move { Ok(removed) }
        })?;

        info!("Memory store created");
        Ok(Self {
            messages,
            sweeper,
            closed: AtomicBool::new(false),
        })
    }

    /// Number of stored messages, expired or not
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn purge(messages: &DashMap<MessageKey, Message>, now: DateTime<Utc>) -> usize {
    let mut removed = 0;
    messages.retain(|_, msg| {
        let keep = !msg.is_expired(now);
        if !keep {
            removed += 1;
        }
        keep
    });
    removed
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save(&self, msg: &Message) -> StoreResult<()> {
        self.ensure_open()?;

        match self.messages.entry(msg.key.clone()) {
            Entry::Occupied(_) => Err(StoreError::SaveRejected(format!(
                "duplicate key {}",
                msg.key
            ))),
            Entry::Vacant(slot) => {
                slot.insert(msg.clone());
                debug!("Saved {}, expires at {}", msg.key, msg.expires_at);
                Ok(())
            }
        }
    }

    async fn load(&self, key: &MessageKey) -> StoreResult<Message> {
        self.ensure_open()?;

        self.messages
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::LoadRejected)
    }

    async fn increment_errors(&self, key: &MessageKey) -> StoreResult<u32> {
        self.ensure_open()?;

        let mut entry = self.messages.get_mut(key).ok_or(StoreError::LoadRejected)?;
        entry.errors += 1;
        Ok(entry.errors)
    }

    async fn remove(&self, key: &MessageKey) -> StoreResult<bool> {
        self.ensure_open()?;

        let removed = self.messages.remove(key).is_some();
        if removed {
            debug!("Removed {}", key);
        }
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.ensure_open()?;
        Ok(purge(&self.messages, now))
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.sweeper.stop().await;
        info!("Memory store closed");
        Ok(())
    }
}
