//! Database schema and types

use chrono::{DateTime, Utc};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS current_conversations (
    app_id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Last conversation the user had open for an app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentConversation {
    pub app_id: String,
    pub conversation_id: String,
    pub updated_at: DateTime<Utc>,
}
