//! Sled-backed persistent message store
//!
//! Two trees share one database:
//! - `messages`: message key -> bincode record
//! - `expiry`: big-endian expiry millis ++ message key -> empty
//!
//! The expiry index keeps sweeps proportional to the number of expired
//! records. Every write touching both trees runs in one transaction.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use burnbox_core::{Message, MessageKey, MessageStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionResult, Transactional,
};
use sled::{Db, Tree};
use tracing::{debug, info, warn};

use crate::error::backend;
use crate::sweeper::{SweepOptions, Sweeper};

const MESSAGES_TREE: &str = "messages";
const EXPIRY_TREE: &str = "expiry";
const STAMP_LEN: usize = 8;

fn expiry_stamp(at: DateTime<Utc>) -> [u8; STAMP_LEN] {
    u64::try_from(at.timestamp_millis())
        .unwrap_or(0)
        .to_be_bytes()
}

fn expiry_key(at: DateTime<Utc>, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(STAMP_LEN + key.len());
    out.extend_from_slice(&expiry_stamp(at));
    out.extend_from_slice(key);
    out
}

fn abort<T>(err: StoreError) -> Result<T, ConflictableTransactionError<StoreError>> {
    Err(ConflictableTransactionError::Abort(err))
}

fn finish<T>(result: TransactionResult<T, StoreError>) -> StoreResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(backend(e)),
    }
}

#[derive(Clone)]
struct Trees {
    messages: Tree,
    expiry: Tree,
}

impl Trees {
    fn open(db: &Db) -> StoreResult<Self> {
        Ok(Self {
            messages: db.open_tree(MESSAGES_TREE).map_err(backend)?,
            expiry: db.open_tree(EXPIRY_TREE).map_err(backend)?,
        })
    }

    fn purge(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let upper = u64::try_from(now.timestamp_millis())
            .unwrap_or(0)
            .saturating_add(1)
            .to_be_bytes();

        let mut removed = 0;
        for entry in self.expiry.range(..upper) {
            let (index_key, _) = entry.map_err(backend)?;
            let key = index_key[STAMP_LEN..].to_vec();

            let purged = (&self.messages, &self.expiry).transaction(|(messages, expiry)| {
                let Some(bytes) = messages.get(&key)? else {
                    // stale index entry
                    expiry.remove(index_key.clone())?;
                    return Ok(false);
                };

                let msg: Message = match bincode::deserialize(&bytes) {
                    Ok(msg) => msg,
                    Err(e) => return abort(backend(e)),
                };
                if !msg.is_expired(now) {
                    return Ok(false);
                }

                messages.remove(key.as_slice())?;
                expiry.remove(index_key.clone())?;
                Ok(true)
            });

            if finish(purged)? {
                removed += 1;
            }
        }

        Ok(removed)
    }
}

// Sled calls block, so sweeps stay off the async workers.
async fn purge_blocking(trees: Trees, now: DateTime<Utc>) -> StoreResult<usize> {
    tokio::task::spawn_blocking(move || trees.purge(now))
        .await
        .map_err(backend)?
}

/// Persistent store on an embedded sled database
pub struct SledStore {
    db: Db,
    trees: Trees,
    sweeper: Sweeper,
    closed: AtomicBool,
}

impl SledStore {
    /// Open or create a database at `path`
    pub fn open(path: impl AsRef<Path>, sweep: Option<&SweepOptions>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(backend)?;
        info!("Sled store opened at {}", path.display());
        Self::from_db(db, sweep)
    }

    /// Open a throwaway database removed on drop
    pub fn temporary(sweep: Option<&SweepOptions>) -> StoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(backend)?;
        info!("Temporary sled store opened");
        Self::from_db(db, sweep)
    }

    fn from_db(db: Db, sweep: Option<&SweepOptions>) -> StoreResult<Self> {
        let trees = Trees::open(&db)?;

        let sweeper = match sweep {
            Some(options) => {
                let target = trees.clone();
                Sweeper::spawn("sled", options, move |now| purge_blocking(target.clone(), now))?
            }
            None => Sweeper::disabled(),
        };

        Ok(Self {
            db,
            trees,
            sweeper,
            closed: AtomicBool::new(false),
        })
    }

    /// Number of stored messages, expired or not
    pub fn len(&self) -> usize {
        self.trees.messages.len()
    }

    /// Whether the store holds no messages
    pub fn is_empty(&self) -> bool {
        self.trees.messages.is_empty()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SledStore {
    async fn save(&self, msg: &Message) -> StoreResult<()> {
        self.ensure_open()?;

        let record =
            bincode::serialize(msg).map_err(|e| StoreError::SaveRejected(e.to_string()))?;
        let key = msg.key.as_str().as_bytes();
        let index_key = expiry_key(msg.expires_at, key);

        let saved = (&self.trees.messages, &self.trees.expiry).transaction(|(messages, expiry)| {
            if messages.get(key)?.is_some() {
                return abort(StoreError::SaveRejected(format!("duplicate key {}", msg.key)));
            }
            messages.insert(key, record.as_slice())?;
            expiry.insert(index_key.as_slice(), Vec::<u8>::new())?;
            Ok(())
        });

        match saved {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => {
                warn!("Failed to save {}: {}", msg.key, e);
                return Err(StoreError::SaveRejected(e.to_string()));
            }
        }

        debug!("Saved {}, expires at {}", msg.key, msg.expires_at);
        Ok(())
    }

    async fn load(&self, key: &MessageKey) -> StoreResult<Message> {
        self.ensure_open()?;

        let bytes = self
            .trees
            .messages
            .get(key.as_str())
            .map_err(backend)?
            .ok_or(StoreError::LoadRejected)?;
        bincode::deserialize(&bytes).map_err(backend)
    }

    async fn increment_errors(&self, key: &MessageKey) -> StoreResult<u32> {
        self.ensure_open()?;

        let key = key.as_str().as_bytes();
        finish(self.trees.messages.transaction(|messages| {
            let Some(bytes) = messages.get(key)? else {
                return abort(StoreError::LoadRejected);
            };

            let mut msg: Message = match bincode::deserialize(&bytes) {
                Ok(msg) => msg,
                Err(e) => return abort(backend(e)),
            };
            msg.errors += 1;

            let record = match bincode::serialize(&msg) {
                Ok(record) => record,
                Err(e) => return abort(backend(e)),
            };
            messages.insert(key, record)?;
            Ok(msg.errors)
        }))
    }

    async fn remove(&self, key: &MessageKey) -> StoreResult<bool> {
        self.ensure_open()?;

        let raw = key.as_str().as_bytes();
        let removed = finish((&self.trees.messages, &self.trees.expiry).transaction(
            |(messages, expiry)| {
                let Some(bytes) = messages.remove(raw)? else {
                    return Ok(false);
                };
                // the record's expiry locates its index entry
                if let Ok(msg) = bincode::deserialize::<Message>(&bytes) {
                    expiry.remove(expiry_key(msg.expires_at, raw))?;
                }
                Ok(true)
            },
        ))?;

        if removed {
            debug!("Removed {}", key);
        }
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.ensure_open()?;
        purge_blocking(self.trees.clone(), now).await
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.sweeper.stop().await;
        self.db.flush_async().await.map_err(backend)?;
        info!("Sled store closed");
        Ok(())
    }
}
