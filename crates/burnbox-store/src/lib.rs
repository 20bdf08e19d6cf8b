//! # Burnbox Store
//!
//! Storage engines implementing [`burnbox_core::MessageStore`]:
//!
//! - [`MemoryStore`]: volatile sharded map, for tests and single-node setups
//! - [`SledStore`]: embedded sled database with an expiry index
//! - [`SqliteStore`]: SQLite file or private in-memory database
//!
//! Engines never decrypt and never check pins. Each can run a [`Sweeper`]
//! that periodically deletes expired records; `close` stops it and waits.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod memory;
pub mod sled_store;
pub mod sqlite;
pub mod sweeper;

pub use error::BackendError;
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use sqlite::SqliteStore;
pub use sweeper::{SweepOptions, Sweeper};
