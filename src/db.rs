//! Local persistence
//!
//! Remembers the current conversation id per application id so a restart
//! reopens the conversation the user was in.

mod schema;

pub use schema::*;

use crate::registry::is_new_conversation;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Cannot persist uncommitted conversation id {0}")]
    Uncommitted(String),
    #[error("Database lock poisoned")]
    Poisoned,
    #[error("Cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn get_current_conversation(&self, app_id: &str) -> DbResult<Option<CurrentConversation>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT app_id, conversation_id, updated_at FROM current_conversations WHERE app_id = ?1",
                params![app_id],
                |row| {
                    Ok(CurrentConversation {
                        app_id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        updated_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Store the current conversation. The `"-1"` placeholder is never persisted.
    pub fn set_current_conversation(&self, app_id: &str, conversation_id: &str) -> DbResult<()> {
        if is_new_conversation(conversation_id) || conversation_id.is_empty() {
            return Err(DbError::Uncommitted(conversation_id.to_string()));
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO current_conversations (app_id, conversation_id, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(app_id) DO UPDATE SET conversation_id = excluded.conversation_id,
                                               updated_at = excluded.updated_at",
            params![app_id, conversation_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn clear_current_conversation(&self, app_id: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM current_conversations WHERE app_id = ?1",
            params![app_id],
        )?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
