pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use models::MessageRow;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}

/// The durable message store consumed by the event router. Calls block, so
/// async callers wrap them in `spawn_blocking`. A trait rather than the
/// concrete `Database` so router tests can inject failures.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a new message with `is_delivered` already set. The store
    /// assigns the id and timestamp.
    fn create_message(&self, content: &str, sender_id: i64) -> Result<MessageRow>;

    /// Flip `is_read` on a stored message. Idempotent; an unknown id is not
    /// an error.
    fn mark_read(&self, message_id: i64) -> Result<()>;
}

impl MessageStore for Database {
    fn create_message(&self, content: &str, sender_id: i64) -> Result<MessageRow> {
        Database::create_message(self, content, sender_id)
    }

    fn mark_read(&self, message_id: i64) -> Result<()> {
        Database::mark_read(self, message_id)
    }
}
