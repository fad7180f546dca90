use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub content: String,
    pub sender_id: i64,
    pub sender_username: String,
    pub is_delivered: bool,
    pub is_read: bool,
    pub created_at: String,
}

impl MessageRow {
    /// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
    /// Parse as naive UTC and convert; RFC 3339 values pass through.
    pub fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| ndt.and_utc())
            })
            .unwrap_or_else(|e| {
                warn!(
                    "Corrupt created_at '{}' on message {}: {}",
                    self.created_at, self.id, e
                );
                DateTime::default()
            })
    }
}
