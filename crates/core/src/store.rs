//! Storage traits: the Conversation Store collaborator contract.
//!
//! Three concerns share one backing store:
//! - chats and messages (the durable, replayable conversation)
//! - the append-only content translation cache
//! - key/value rows owned by actions, partitioned by [`StorageScope`]
//!
//! Implementations: SQLite and in-memory (for testing), in `parley-store`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chat::Chat;
use crate::error::StoreError;
use crate::message::{Message, MessageData};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError>;

    /// Create a chat with default settings. Idempotent: an existing row is
    /// returned unchanged.
    async fn create_chat(&self, chat_id: &str) -> Result<Chat, StoreError>;

    /// Persist changed chat settings. Fails with `ChatNotFound` for unknown chats.
    async fn update_chat(&self, chat: &Chat) -> Result<(), StoreError>;

    /// Active (non-cleared) messages, newest first.
    async fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Append a message stamped with the current time.
    async fn add_message(
        &self,
        chat_id: &str,
        data: MessageData,
        sender_ids: &[String],
    ) -> Result<Message, StoreError>;

    /// Soft-delete all active messages of a chat. Returns how many were cleared.
    async fn clear_messages(&self, chat_id: &str) -> Result<usize, StoreError>;
}

/// The `(content_hash, model_id) → text` translation cache.
#[async_trait]
pub trait TranslationCache: Send + Sync {
    async fn get_translation(&self, content_hash: &str, model_id: &str) -> Result<Option<String>, StoreError>;

    /// Store a translation. The first write for a pair wins; returns whether
    /// this call inserted the row.
    async fn put_translation(&self, content_hash: &str, model_id: &str, text: &str) -> Result<bool, StoreError>;
}

/// Which partition of action storage a handle reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageScope {
    /// Private to one action within one chat
    Chat { chat_id: String, action: String },
    /// Process-wide
    Root,
}

impl StorageScope {
    pub fn chat(chat_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Chat {
            chat_id: chat_id.into(),
            action: action.into(),
        }
    }

    /// Stable, unambiguous string form used as the storage partition key.
    pub fn key(&self) -> String {
        match self {
            Self::Root => "root".into(),
            Self::Chat { chat_id, action } => {
                // JSON-encode the pair so ids containing separators cannot collide.
                let pair = serde_json::json!([chat_id, action]);
                format!("chat:{pair}")
            }
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn kv_get(&self, scope: &StorageScope, key: &str) -> Result<Option<String>, StoreError>;
    async fn kv_set(&self, scope: &StorageScope, key: &str, value: &str) -> Result<(), StoreError>;
    async fn kv_delete(&self, scope: &StorageScope, key: &str) -> Result<bool, StoreError>;
    /// Keys of a scope in ascending order.
    async fn kv_keys(&self, scope: &StorageScope) -> Result<Vec<String>, StoreError>;
}

/// Everything the agent needs from persistence.
pub trait Storage: ConversationStore + TranslationCache + KeyValueStore {}

impl<T: ConversationStore + TranslationCache + KeyValueStore> Storage for T {}

/// A key/value handle bound to one scope.
#[derive(Clone)]
pub struct ScopedStorage {
    backend: Arc<dyn KeyValueStore>,
    scope: StorageScope,
}

impl ScopedStorage {
    pub fn new(backend: Arc<dyn KeyValueStore>, scope: StorageScope) -> Self {
        Self { backend, scope }
    }

    pub fn scope(&self) -> &StorageScope {
        &self.scope
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backend.kv_get(&self.scope, key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.backend.kv_set(&self.scope, key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.backend.kv_delete(&self.scope, key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.backend.kv_keys(&self.scope).await
    }
}

impl std::fmt::Debug for ScopedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStorage").field("scope", &self.scope).finish()
    }
}
