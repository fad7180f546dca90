use anyhow::Result;
use parley_types::models::SYSTEM_USERNAME;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            content         TEXT NOT NULL,
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            is_delivered    INTEGER NOT NULL DEFAULT 0,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at, id);
        ",
    )?;

    // Seed the reserved relay user. The password sentinel is not a valid
    // argon2 hash, so this account can never authenticate.
    conn.execute(
        "INSERT OR IGNORE INTO users (username, password) VALUES (?1, '!')",
        [SYSTEM_USERNAME],
    )?;

    info!("Database migrations complete");
    Ok(())
}
