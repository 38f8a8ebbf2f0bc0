//! SQLite backend for the conversation store.
//!
//! Uses a single SQLite database file with four tables:
//! - `chats`: per-chat settings
//! - `messages`: the conversation log (JSON-encoded message data, soft delete)
//! - `translation_cache`: append-only `(content_hash, model_id) → text`
//! - `action_storage`: scoped key/value rows owned by actions
//!
//! Every statement is parameterized.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parley_core::chat::Chat;
use parley_core::error::StoreError;
use parley_core::message::{Message, MessageData};
use parley_core::store::{ConversationStore, KeyValueStore, StorageScope, TranslationCache};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A production SQLite conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Fixed-precision RFC 3339 so text ordering matches time ordering.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

impl SqliteStore {
    /// Open a SQLite store from a file path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database lives per connection, so keep exactly one.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations: creates tables and indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 6] = [
            (
                "chats table",
                r#"
                CREATE TABLE IF NOT EXISTS chats (
                    chat_id            TEXT PRIMARY KEY,
                    is_enabled         INTEGER NOT NULL DEFAULT 1,
                    system_prompt      TEXT,
                    model              TEXT,
                    respond_on_any     INTEGER NOT NULL DEFAULT 0,
                    respond_on_mention INTEGER NOT NULL DEFAULT 1,
                    respond_on_reply   INTEGER NOT NULL DEFAULT 0,
                    debug_until        TEXT,
                    content_models     TEXT NOT NULL DEFAULT '{}',
                    created_at         TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                    id           TEXT UNIQUE NOT NULL,
                    chat_id      TEXT NOT NULL REFERENCES chats(chat_id),
                    sender_ids   TEXT NOT NULL DEFAULT '[]',
                    message_data TEXT NOT NULL,
                    timestamp    TEXT NOT NULL,
                    cleared_at   TEXT
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, timestamp DESC)",
            ),
            (
                "translation cache table",
                r#"
                CREATE TABLE IF NOT EXISTS translation_cache (
                    content_hash TEXT NOT NULL,
                    model_id     TEXT NOT NULL,
                    translation  TEXT NOT NULL,
                    created_at   TEXT NOT NULL,
                    PRIMARY KEY (content_hash, model_id)
                )
                "#,
            ),
            (
                "action storage table",
                r#"
                CREATE TABLE IF NOT EXISTS action_storage (
                    scope      TEXT NOT NULL,
                    key        TEXT NOT NULL,
                    value      TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (scope, key)
                )
                "#,
            ),
            (
                "cleared index",
                "CREATE INDEX IF NOT EXISTS idx_messages_cleared ON messages(chat_id, cleared_at)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Result<Chat, StoreError> {
        let get_err = |col: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{col} column: {e}"));

        let content_models_json: String = row
            .try_get("content_models")
            .map_err(|e| get_err("content_models", e))?;
        let debug_until: Option<String> = row
            .try_get("debug_until")
            .map_err(|e| get_err("debug_until", e))?;

        Ok(Chat {
            chat_id: row.try_get("chat_id").map_err(|e| get_err("chat_id", e))?,
            is_enabled: row.try_get("is_enabled").map_err(|e| get_err("is_enabled", e))?,
            system_prompt: row
                .try_get("system_prompt")
                .map_err(|e| get_err("system_prompt", e))?,
            model: row.try_get("model").map_err(|e| get_err("model", e))?,
            respond_on_any: row
                .try_get("respond_on_any")
                .map_err(|e| get_err("respond_on_any", e))?,
            respond_on_mention: row
                .try_get("respond_on_mention")
                .map_err(|e| get_err("respond_on_mention", e))?,
            respond_on_reply: row
                .try_get("respond_on_reply")
                .map_err(|e| get_err("respond_on_reply", e))?,
            debug_until: debug_until.as_deref().map(parse_ts).transpose()?,
            content_models: serde_json::from_str(&content_models_json)
                .map_err(|e| StoreError::QueryFailed(format!("content_models json: {e}")))?,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let get_err = |col: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{col} column: {e}"));

        let sender_json: String = row.try_get("sender_ids").map_err(|e| get_err("sender_ids", e))?;
        let data_json: String = row
            .try_get("message_data")
            .map_err(|e| get_err("message_data", e))?;
        let timestamp: String = row.try_get("timestamp").map_err(|e| get_err("timestamp", e))?;
        let cleared_at: Option<String> =
            row.try_get("cleared_at").map_err(|e| get_err("cleared_at", e))?;

        Ok(Message {
            id: row.try_get("id").map_err(|e| get_err("id", e))?,
            chat_id: row.try_get("chat_id").map_err(|e| get_err("chat_id", e))?,
            sender_ids: serde_json::from_str(&sender_json)
                .map_err(|e| StoreError::QueryFailed(format!("sender_ids json: {e}")))?,
            data: serde_json::from_str(&data_json)
                .map_err(|e| StoreError::QueryFailed(format!("message_data json: {e}")))?,
            timestamp: parse_ts(&timestamp)?,
            cleared_at: cleared_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        let row = sqlx::query("SELECT * FROM chats WHERE chat_id = ?1")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get_chat: {e}")))?;

        row.as_ref().map(Self::row_to_chat).transpose()
    }

    async fn create_chat(&self, chat_id: &str) -> Result<Chat, StoreError> {
        let defaults = Chat::new(chat_id);
        sqlx::query(
            r#"
            INSERT INTO chats (chat_id, is_enabled, respond_on_any, respond_on_mention,
                               respond_on_reply, content_models, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, '{}', ?6)
            ON CONFLICT(chat_id) DO NOTHING
            "#,
        )
        .bind(chat_id)
        .bind(defaults.is_enabled)
        .bind(defaults.respond_on_any)
        .bind(defaults.respond_on_mention)
        .bind(defaults.respond_on_reply)
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("create_chat: {e}")))?;

        self.get_chat(chat_id)
            .await?
            .ok_or_else(|| StoreError::ChatNotFound(chat_id.to_string()))
    }

    async fn update_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        let content_models = serde_json::to_string(&chat.content_models)
            .map_err(|e| StoreError::Storage(format!("content_models serialization: {e}")))?;

        let result = sqlx::query(
            r#"
            UPDATE chats SET
                is_enabled = ?2,
                system_prompt = ?3,
                model = ?4,
                respond_on_any = ?5,
                respond_on_mention = ?6,
                respond_on_reply = ?7,
                debug_until = ?8,
                content_models = ?9
            WHERE chat_id = ?1
            "#,
        )
        .bind(&chat.chat_id)
        .bind(chat.is_enabled)
        .bind(&chat.system_prompt)
        .bind(&chat.model)
        .bind(chat.respond_on_any)
        .bind(chat.respond_on_mention)
        .bind(chat.respond_on_reply)
        .bind(chat.debug_until.as_ref().map(ts))
        .bind(&content_models)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("update_chat: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ChatNotFound(chat.chat_id.clone()));
        }
        Ok(())
    }

    async fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE chat_id = ?1 AND cleared_at IS NULL
            ORDER BY timestamp DESC, iid DESC
            LIMIT ?2
            "#,
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get_messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn add_message(
        &self,
        chat_id: &str,
        data: MessageData,
        sender_ids: &[String],
    ) -> Result<Message, StoreError> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_ids: sender_ids.to_vec(),
            data,
            timestamp: Utc::now(),
            cleared_at: None,
        };

        let sender_json = serde_json::to_string(&message.sender_ids)
            .map_err(|e| StoreError::Storage(format!("sender_ids serialization: {e}")))?;
        let data_json = serde_json::to_string(&message.data)
            .map_err(|e| StoreError::Storage(format!("message_data serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, sender_ids, message_data, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&message.id)
        .bind(chat_id)
        .bind(&sender_json)
        .bind(&data_json)
        .bind(ts(&message.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.message().contains("FOREIGN KEY") => {
                StoreError::ChatNotFound(chat_id.to_string())
            }
            other => StoreError::Storage(format!("add_message: {other}")),
        })?;

        debug!(chat_id, message_id = %message.id, role = message.role().as_str(), "Stored message");
        Ok(message)
    }

    async fn clear_messages(&self, chat_id: &str) -> Result<usize, StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET cleared_at = ?2 WHERE chat_id = ?1 AND cleared_at IS NULL",
        )
        .bind(chat_id)
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("clear_messages: {e}")))?;

        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl TranslationCache for SqliteStore {
    async fn get_translation(&self, content_hash: &str, model_id: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT translation FROM translation_cache WHERE content_hash = ?1 AND model_id = ?2",
        )
        .bind(content_hash)
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get_translation: {e}")))?;

        row.map(|r| r.try_get::<String, _>("translation"))
            .transpose()
            .map_err(|e| StoreError::QueryFailed(format!("translation column: {e}")))
    }

    async fn put_translation(&self, content_hash: &str, model_id: &str, text: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO translation_cache (content_hash, model_id, translation, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(content_hash, model_id) DO NOTHING
            "#,
        )
        .bind(content_hash)
        .bind(model_id)
        .bind(text)
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("put_translation: {e}")))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn kv_get(&self, scope: &StorageScope, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM action_storage WHERE scope = ?1 AND key = ?2")
            .bind(scope.key())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("kv_get: {e}")))?;

        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(|e| StoreError::QueryFailed(format!("value column: {e}")))
    }

    async fn kv_set(&self, scope: &StorageScope, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO action_storage (scope, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(scope, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(scope.key())
        .bind(key)
        .bind(value)
        .bind(ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("kv_set: {e}")))?;
        Ok(())
    }

    async fn kv_delete(&self, scope: &StorageScope, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM action_storage WHERE scope = ?1 AND key = ?2")
            .bind(scope.key())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("kv_delete: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn kv_keys(&self, scope: &StorageScope) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT key FROM action_storage WHERE scope = ?1 ORDER BY key")
            .bind(scope.key())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("kv_keys: {e}")))?;

        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("key")
                    .map_err(|e| StoreError::QueryFailed(format!("key column: {e}")))
            })
            .collect()
    }
}
