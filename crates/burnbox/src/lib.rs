//! # Burnbox
//!
//! PIN-protected, burn-after-read secrets. A sender stores a short text or
//! small file under a random key; the recipient gets it back exactly once by
//! presenting the pin, after which it is gone. Messages also vanish on expiry
//! or after too many wrong pins.
//!
//! This crate wires the pieces together from a [`BurnboxConfig`]:
//!
//! ```no_run
//! use std::time::Duration;
//! use burnbox::{Burnbox, BurnboxConfig, MessageRequest};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let burnbox = Burnbox::open(&BurnboxConfig::with_sign_key("change-me"))?;
//! let msg = burnbox
//!     .processor()
//!     .create(MessageRequest::text(Duration::from_secs(30), "12345", "abc"))
//!     .await?;
//! let revealed = burnbox.processor().reveal(&msg.key, "12345").await?;
//! # let _ = revealed;
//! burnbox.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use burnbox_core::{Clock, MessageStore, SystemClock};
use burnbox_crypto::{derive_sign_key, Argon2PinHasher, SecretCipher};
use burnbox_store::{MemoryStore, SledStore, SqliteStore, SweepOptions};
use tracing::info;

pub use burnbox_core::{
    Error, FileRequest, Message, MessageKey, MessageProcessor, MessageRequest, Result, Revealed,
    Secret, StoreError,
};
pub use config::{BurnboxConfig, Engine, HasherConfig, LimitsConfig, LogConfig, StorageConfig};
pub use telemetry::init_tracing;

/// A configured message processor together with its storage engine
pub struct Burnbox {
    processor: MessageProcessor,
    store: Arc<dyn MessageStore>,
}

impl Burnbox {
    /// Build everything on the wall clock.
    ///
    /// Must be called inside a tokio runtime; the storage engine starts its
    /// expiry sweeper immediately.
    pub fn open(config: &BurnboxConfig) -> anyhow::Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Build everything on the given clock, shared by the processor and the sweeper
    pub fn open_with_clock(config: &BurnboxConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        let sign_key = derive_sign_key(&config.sign_key, config.pin_size)
            .context("failed to derive sign key")?;
        let crypter = Arc::new(SecretCipher::new(sign_key));
        let hasher = Arc::new(
            Argon2PinHasher::new((&config.hasher).into()).context("invalid hasher settings")?,
        );

        let sweep = SweepOptions::new(config.storage.cleanup_interval()).with_clock(Arc::clone(&clock));
        let store = open_store(config, &sweep)?;

        let processor = MessageProcessor::new(
            Arc::clone(&store),
            crypter,
            hasher,
            config.limits.to_params(),
        )
        .with_clock(clock);

        info!(
            "Burnbox ready: engine={}, pin_size={}",
            config.storage.engine, config.pin_size
        );
        Ok(Self { processor, store })
    }

    /// The message processor
    pub fn processor(&self) -> &MessageProcessor {
        &self.processor
    }

    /// The storage engine
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Stop the sweeper and release the engine
    pub async fn close(&self) -> anyhow::Result<()> {
        self.store.close().await.context("failed to close store")?;
        info!("Burnbox closed");
        Ok(())
    }
}

fn open_store(config: &BurnboxConfig, sweep: &SweepOptions) -> anyhow::Result<Arc<dyn MessageStore>> {
    let storage = &config.storage;

    let store: Arc<dyn MessageStore> = match (storage.engine, storage.in_memory, &storage.path) {
        (Engine::Memory, _, _) => Arc::new(
            MemoryStore::with_sweeper(sweep).context("failed to create memory store")?,
        ),
        (Engine::Sled, true, _) => Arc::new(
            SledStore::temporary(Some(sweep)).context("failed to open temporary sled store")?,
        ),
        (Engine::Sled, false, Some(path)) => Arc::new(
            SledStore::open(path, Some(sweep))
                .with_context(|| format!("failed to open sled store at {}", path.display()))?,
        ),
        (Engine::Sqlite, true, _) => Arc::new(
            SqliteStore::in_memory(Some(sweep)).context("failed to open in-memory sqlite store")?,
        ),
        (Engine::Sqlite, false, Some(path)) => Arc::new(
            SqliteStore::open(path, Some(sweep))
                .with_context(|| format!("failed to open sqlite store at {}", path.display()))?,
        ),
        (engine, false, None) => {
            anyhow::bail!("storage.path is required for the {} engine", engine)
        }
    };

    Ok(store)
}
