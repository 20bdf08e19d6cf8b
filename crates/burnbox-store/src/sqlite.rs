//! SQLite-backed message store
//!
//! All access goes through one connection guarded by a mutex, which matches
//! SQLite's single-writer model and lets in-memory databases be shared by the
//! store and its sweeper. Queries run on the blocking thread pool.
//!
//! Expiry is stored as unix nanoseconds so the database compares deadlines at
//! the same precision as the processor. Databases from before `user_version`
//! 1 hold unix seconds and are converted on open.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use burnbox_core::{Message, MessageKey, MessageStore, StoreError, StoreResult};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::backend;
use crate::sweeper::{SweepOptions, Sweeper};

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        exp INTEGER NOT NULL,
        data BLOB NOT NULL,
        pin_hash TEXT NOT NULL,
        errors INTEGER DEFAULT 0,
        client_enc INTEGER NOT NULL DEFAULT 0
    );
";

/// Current `PRAGMA user_version`: expiry in nanoseconds
const SCHEMA_VERSION: i64 = 1;

const INDEXES: &str = "CREATE INDEX IF NOT EXISTS idx_messages_exp ON messages(exp);";

type SharedConnection = Arc<Mutex<Connection>>;

async fn blocking<T, F>(conn: &SharedConnection, f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || f(&*conn.lock()))
        .await
        .map_err(backend)?
}

// Instants past the nanosecond range clamp to the ends of i64.
fn clamped_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .unwrap_or(if at.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

fn purge(conn: &Connection, now: DateTime<Utc>) -> StoreResult<usize> {
    conn.execute(
        "DELETE FROM messages WHERE exp <= ?1",
        params![clamped_nanos(now)],
    )
    .map_err(backend)
}

fn migrate_client_enc(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(messages)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if !columns.iter().any(|name| name == "client_enc") {
        info!("Migrating database: adding client_enc column");
        conn.execute(
            "ALTER TABLE messages ADD COLUMN client_enc INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn migrate_expiry_nanos(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    let converted = tx.execute(
        "UPDATE messages SET exp = CASE \
             WHEN exp > 9223372036 THEN 9223372036854775807 \
             ELSE exp * 1000000000 END",
        [],
    )?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    if converted > 0 {
        info!("Migrating database: {} expiry stamps converted to nanoseconds", converted);
    }
    Ok(())
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;
    migrate_client_enc(conn)?;
    migrate_expiry_nanos(conn)?;
    conn.execute_batch(INDEXES)
}

/// Persistent store on a SQLite database
pub struct SqliteStore {
    conn: SharedConnection,
    sweeper: Sweeper,
    closed: AtomicBool,
}

impl SqliteStore {
    /// Open or create a database file, tuned for concurrent access
    pub fn open(path: impl AsRef<Path>, sweep: Option<&SweepOptions>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(backend)?;

        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(backend)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(backend)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;

        info!("SQLite store opened at {} (journal_mode={})", path.display(), mode);
        Self::from_connection(conn, sweep)
    }

    /// Create a private in-memory database.
    ///
    /// The store and its sweeper share one connection, so both see the same
    /// data for the lifetime of the store.
    pub fn in_memory(sweep: Option<&SweepOptions>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        info!("In-memory SQLite store created");
        Self::from_connection(conn, sweep)
    }

    fn from_connection(conn: Connection, sweep: Option<&SweepOptions>) -> StoreResult<Self> {
        init_schema(&conn).map_err(backend)?;
        let conn = Arc::new(Mutex::new(conn));

        let sweeper = match sweep {
            Some(options) => {
                let target = Arc::clone(&conn);
                Sweeper::spawn("sqlite", options, move |now| {
                    let target = Arc::clone(&target);
                    async move { blocking(&target, move |conn| purge(conn, now)).await }
                })?
            }
            None => Sweeper::disabled(),
        };

        Ok(Self {
            conn,
            sweeper,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn save(&self, msg: &Message) -> StoreResult<()> {
        self.ensure_open()?;

        let exp = msg.expires_at.timestamp_nanos_opt().ok_or_else(|| {
            warn!("Failed to save {}: expiry {} out of range", msg.key, msg.expires_at);
            StoreError::SaveRejected(format!("expiry {} out of range", msg.expires_at))
        })?;

        let msg = msg.clone();
        blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO messages (id, exp, data, pin_hash, errors, client_enc) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    msg.key.as_str(),
                    exp,
                    msg.data,
                    msg.pin_hash,
                    msg.errors,
                    msg.client_encrypted,
                ],
            )
            .map_err(|e| {
                warn!("Failed to save {}: {}", msg.key, e);
                StoreError::SaveRejected(e.to_string())
            })?;

            debug!("Saved {}, expires at {}", msg.key, msg.expires_at);
            Ok(())
        })
        .await
    }

    async fn load(&self, key: &MessageKey) -> StoreResult<Message> {
        self.ensure_open()?;

        let key = key.clone();
        blocking(&self.conn, move |conn| {
            let row = conn
                .query_row(
                    "SELECT exp, data, pin_hash, errors, client_enc FROM messages WHERE id = ?1",
                    params![key.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, u32>(3)?,
                            row.get::<_, bool>(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(backend)?;

            let Some((exp, data, pin_hash, errors, client_encrypted)) = row else {
                debug!("Not found {}", key);
                return Err(StoreError::LoadRejected);
            };

            Ok(Message {
                key,
                expires_at: Utc.timestamp_nanos(exp),
                data,
                pin_hash,
                errors,
                client_encrypted,
            })
        })
        .await
    }

    async fn increment_errors(&self, key: &MessageKey) -> StoreResult<u32> {
        self.ensure_open()?;

        let key = key.clone();
        blocking(&self.conn, move |conn| {
            conn.query_row(
                "UPDATE messages SET errors = errors + 1 WHERE id = ?1 RETURNING errors",
                params![key.as_str()],
                |row| row.get::<_, u32>(0),
            )
            .optional()
            .map_err(backend)?
            .ok_or(StoreError::LoadRejected)
        })
        .await
    }

    async fn remove(&self, key: &MessageKey) -> StoreResult<bool> {
        self.ensure_open()?;

        let key = key.clone();
        blocking(&self.conn, move |conn| {
            let removed = conn
                .execute("DELETE FROM messages WHERE id = ?1", params![key.as_str()])
                .map_err(backend)?
                > 0;
            if removed {
                debug!("Removed {}", key);
            }
            Ok(removed)
        })
        .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.ensure_open()?;
        blocking(&self.conn, move |conn| purge(conn, now)).await
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.sweeper.stop().await;
        info!("SQLite store closed");
        Ok(())
    }
}
