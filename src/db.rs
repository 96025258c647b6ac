use crate::chat::ChatReply;
use crate::types::{Role, Session, StoredMessage};
use sqlx::{sqlite::SqlitePool, sqlite::SqlitePoolOptions, Row};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Message stored in place of a reply that never arrived.
pub const FAILED_TURN_NOTICE: &str = "The agent could not complete this reply. Please try again.";

/// Local transcript of chat sessions.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // An in-memory database exists per connection, so keep a single one.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(database_url)
                .await?
        } else {
            SqlitePool::connect(database_url).await?
        };
        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        let schema = [
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                sequence_index INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_messages_seq ON messages(session_id, sequence_index)",
        ];

        for statement in schema {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database initialized");
        Ok(())
    }

    pub async fn upsert_session(&self, session: &Session) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, agent_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.agent_id)
        .bind(&session.created_at)
        .bind(&session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<i64, sqlx::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        let count_row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        let sequence_index = count_row.0;

        sqlx::query(
            "INSERT INTO messages (session_id, sequence_index, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(sequence_index)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(sequence_index)
    }

    pub async fn load_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT session_id, sequence_index, role, content, created_at FROM messages
             WHERE session_id = ? ORDER BY sequence_index ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .filter_map(|row| {
                let role: String = row.get("role");
                let Some(role) = Role::parse(&role) else {
                    warn!("Skipping message with unknown role: {}", role);
                    return None;
                };
                Some(StoredMessage {
                    session_id: row.get("session_id"),
                    sequence_index: row.get("sequence_index"),
                    role,
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                })
            })
            .collect();

        Ok(messages)
    }

    /// Stores the user message and whatever the agent replied with. A reply
    /// carrying agent errors also gets the failure notice.
    pub async fn record_turn(
        &self,
        session_id: &str,
        user_text: &str,
        reply: &ChatReply,
    ) -> Result<(), sqlx::Error> {
        if reply.is_failed() {
            warn!(session_id, errors = ?reply.agent_errors, "agent failed the turn");
            return self.record_failed_turn(session_id, user_text, &reply.text).await;
        }

        self.append_message(session_id, Role::User, user_text).await?;
        if !reply.text.is_empty() {
            self.append_message(session_id, Role::Assistant, &reply.text).await?;
        }
        if !reply.completed_normally() {
            warn!(session_id, completion = ?reply.completion, "reply ended without [DONE]");
        }
        Ok(())
    }

    /// Stores the user message, any text the agent got out before failing,
    /// and a system notice.
    pub async fn record_failed_turn(
        &self,
        session_id: &str,
        user_text: &str,
        partial_reply: &str,
    ) -> Result<(), sqlx::Error> {
        self.append_message(session_id, Role::User, user_text).await?;
        if !partial_reply.is_empty() {
            self.append_message(session_id, Role::Assistant, partial_reply).await?;
        }
        self.append_message(session_id, Role::System, FAILED_TURN_NOTICE).await?;
        Ok(())
    }
}
