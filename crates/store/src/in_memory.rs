//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use parley_core::chat::Chat;
use parley_core::error::StoreError;
use parley_core::message::{Message, MessageData};
use parley_core::store::{ConversationStore, KeyValueStore, StorageScope, TranslationCache};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A store that keeps everything in process memory.
/// Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    chats: Arc<RwLock<HashMap<String, Chat>>>,
    messages: Arc<RwLock<Vec<Message>>>,
    translations: Arc<RwLock<HashMap<(String, String), String>>>,
    kv: Arc<RwLock<BTreeMap<(String, String), String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages, cleared ones included.
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Number of cached translations.
    pub async fn translation_count(&self) -> usize {
        self.translations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError> {
        Ok(self.chats.read().await.get(chat_id).cloned())
    }

    async fn create_chat(&self, chat_id: &str) -> Result<Chat, StoreError> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .entry(chat_id.to_string())
            .or_insert_with(|| Chat::new(chat_id));
        Ok(chat.clone())
    }

    async fn update_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        let mut chats = self.chats.write().await;
        match chats.get_mut(&chat.chat_id) {
            Some(existing) => {
                *existing = chat.clone();
                Ok(())
            }
            None => Err(StoreError::ChatNotFound(chat.chat_id.clone())),
        }
    }

    async fn get_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().await;
        let mut rows: Vec<(usize, &Message)> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.chat_id == chat_id && !m.is_cleared())
            .collect();

        rows.sort_by(|(ia, a), (ib, b)| b.timestamp.cmp(&a.timestamp).then(ib.cmp(ia)));

        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn add_message(
        &self,
        chat_id: &str,
        data: MessageData,
        sender_ids: &[String],
    ) -> Result<Message, StoreError> {
        if !self.chats.read().await.contains_key(chat_id) {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_ids: sender_ids.to_vec(),
            data,
            timestamp: Utc::now(),
            cleared_at: None,
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn clear_messages(&self, chat_id: &str) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut cleared = 0;
        for message in self.messages.write().await.iter_mut() {
            if message.chat_id == chat_id && message.cleared_at.is_none() {
                message.cleared_at = Some(now);
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

#[async_trait]
impl TranslationCache for InMemoryStore {
    async fn get_translation(&self, content_hash: &str, model_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .translations
            .read()
            .await
            .get(&(content_hash.to_string(), model_id.to_string()))
            .cloned())
    }

    async fn put_translation(&self, content_hash: &str, model_id: &str, text: &str) -> Result<bool, StoreError> {
        let mut translations = self.translations.write().await;
        let key = (content_hash.to_string(), model_id.to_string());
        if translations.contains_key(&key) {
            return Ok(false);
        }
        translations.insert(key, text.to_string());
        Ok(true)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn kv_get(&self, scope: &StorageScope, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv.read().await.get(&(scope.key(), key.to_string())).cloned())
    }

    async fn kv_set(&self, scope: &StorageScope, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv
            .write()
            .await
            .insert((scope.key(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn kv_delete(&self, scope: &StorageScope, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .kv
            .write()
            .await
            .remove(&(scope.key(), key.to_string()))
            .is_some())
    }

    async fn kv_keys(&self, scope: &StorageScope) -> Result<Vec<String>, StoreError> {
        let scope_key = scope.key();
        Ok(self
            .kv
            .read()
            .await
            .keys()
            .filter(|(s, _)| *s == scope_key)
            .map(|(_, k)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::store::ScopedStorage;

    #[tokio::test]
    async fn create_then_get_chat() {
        let store = InMemoryStore::new();
        assert!(store.get_chat("c").await.unwrap().is_none());
        let chat = store.create_chat("c").await.unwrap();
        assert_eq!(chat.chat_id, "c");
        assert!(store.get_chat("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn messages_newest_first_and_clear() {
        let store = InMemoryStore::new();
        store.create_chat("c").await.unwrap();
        store.create_chat("other").await.unwrap();
        store.add_message("c", MessageData::user_text("a"), &[]).await.unwrap();
        store.add_message("c", MessageData::assistant_text("b"), &[]).await.unwrap();
        store.add_message("other", MessageData::user_text("x"), &[]).await.unwrap();

        let rows = store.get_messages("c", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].data.content()[0].as_text(), Some("b"));
        assert_eq!(rows[1].data.content()[0].as_text(), Some("a"));

        assert_eq!(store.clear_messages("c").await.unwrap(), 2);
        assert!(store.get_messages("c", 10).await.unwrap().is_empty());
        assert_eq!(store.get_messages("other", 10).await.unwrap().len(), 1);
        assert_eq!(store.message_count().await, 3);
    }

    #[tokio::test]
    async fn add_message_to_unknown_chat_fails() {
        let store = InMemoryStore::new();
        let err = store
            .add_message("nope", MessageData::user_text("hi"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ChatNotFound(_)));
    }

    #[tokio::test]
    async fn translation_cache_keeps_first_value() {
        let store = InMemoryStore::new();
        assert!(store.put_translation("h", "m", "first").await.unwrap());
        assert!(!store.put_translation("h", "m", "second").await.unwrap());
        assert_eq!(store.get_translation("h", "m").await.unwrap().as_deref(), Some("first"));
        assert_eq!(store.translation_count().await, 1);
    }

    #[tokio::test]
    async fn scoped_storage_cannot_see_other_scopes() {
        let store = Arc::new(InMemoryStore::new());
        let notes = ScopedStorage::new(store.clone(), StorageScope::chat("c1", "save_note"));
        let other_chat = ScopedStorage::new(store.clone(), StorageScope::chat("c2", "save_note"));
        let root = ScopedStorage::new(store.clone(), StorageScope::Root);

        notes.set("k", "v").await.unwrap();
        assert_eq!(notes.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(other_chat.get("k").await.unwrap().is_none());
        assert!(root.get("k").await.unwrap().is_none());
        assert_eq!(notes.keys().await.unwrap(), vec!["k"]);
        assert!(other_chat.keys().await.unwrap().is_empty());
    }
}
