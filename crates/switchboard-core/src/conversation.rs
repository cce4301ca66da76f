//! Conversation store: in-memory conversations keyed by id

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{Conversation, Message, Role};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("message {0} does not have a conversation_id")]
    MissingConversationId(String),
}

/// Shared conversation store. All methods take `&self`; mutation is
/// serialized behind an async `RwLock`.
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new conversation. Blank names become "Conversation N".
    pub async fn create_conversation(&self, name: Option<&str>) -> Conversation {
        let mut conversations = self.conversations.write().await;
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => default_name(conversations.len()),
        };
        let conversation = Conversation::new(uuid::Uuid::new_v4().to_string(), name);
        conversations.insert(conversation.id.clone(), conversation.clone());
        info!("Created conversation '{}' ({})", conversation.name, conversation.id);
        conversation
    }

    pub async fn get_conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations.read().await.get(id).cloned()
    }

    /// All conversations, oldest first
    pub async fn list_conversations(&self) -> Vec<Conversation> {
        let conversations = self.conversations.read().await;
        let mut list: Vec<Conversation> = conversations.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    pub async fn delete_conversation(&self, id: &str) -> bool {
        let removed = self.conversations.write().await.remove(id).is_some();
        if removed {
            info!("Deleted conversation {}", id);
        }
        removed
    }

    /// Build a single-text message for a conversation, creating the
    /// conversation on demand. The message is not appended.
    pub async fn create_message(&self, conversation_id: &str, role: Role, text: &str) -> Message {
        self.ensure_conversation(conversation_id).await;
        let mut message = Message::new(role, Some(conversation_id.to_string()));
        message.add_text(text);
        message
    }

    /// Append a message to its conversation, creating the conversation on
    /// demand.
    pub async fn append_message(&self, message: Message) -> Result<(), StoreError> {
        let Some(conversation_id) = message.conversation_id.clone() else {
            return Err(StoreError::MissingConversationId(message.id));
        };
        let mut conversations = self.conversations.write().await;
        let next_name = default_name(conversations.len());
        let conversation = conversations
            .entry(conversation_id.clone())
            .or_insert_with(|| Conversation::new(conversation_id.clone(), next_name));
        conversation.messages.push(message);
        debug!(
            "Conversation {} now has {} messages",
            conversation_id,
            conversation.messages.len()
        );
        Ok(())
    }

    /// Messages of a conversation in append order; empty if unknown
    pub async fn list_messages(&self, conversation_id: &str) -> Vec<Message> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    pub async fn count(&self) -> usize {
        self.conversations.read().await.len()
    }

    async fn ensure_conversation(&self, id: &str) {
        let mut conversations = self.conversations.write().await;
        if !conversations.contains_key(id) {
            let name = default_name(conversations.len());
            conversations.insert(id.to_string(), Conversation::new(id, name));
            debug!("Created conversation {} on demand", id);
        }
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn default_name(existing: usize) -> String {
    format!("Conversation {}", existing + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_conversation_default_name() {
        let store = ConversationStore::new();
        let first = store.create_conversation(None).await;
        let second = store.create_conversation(Some("  ")).await;
        assert_eq!(first.name, "Conversation 1");
        assert_eq!(second.name, "Conversation 2");
        assert!(first.is_active);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_create_conversation_named() {
        let store = ConversationStore::new();
        let conv = store.create_conversation(Some("Research")).await;
        assert_eq!(conv.name, "Research");
        assert!(store.get_conversation(&conv.id).await.is_some());
        assert!(store.get_conversation("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_create_message_creates_conversation() {
        let store = ConversationStore::new();
        let msg = store.create_message("c-42", Role::User, "hello").await;
        assert_eq!(msg.conversation_id.as_deref(), Some("c-42"));
        assert_eq!(msg.text(), "hello");
        assert!(store.get_conversation("c-42").await.is_some());
        assert!(store.list_messages("c-42").await.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_list_messages_in_order() {
        let store = ConversationStore::new();
        store.append_message(Message::user("c1", "first")).await.unwrap();
        store.append_message(Message::user("c1", "second")).await.unwrap();

        let messages = store.list_messages("c1").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "first");
        assert_eq!(messages[1].text(), "second");
        assert!(store.list_messages("unknown").await.is_empty());
    }

    #[tokio::test]
    async fn test_append_without_conversation_id_fails() {
        let store = ConversationStore::new();
        let msg = Message::new(Role::User, None);
        let err = store.append_message(msg).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingConversationId(_)));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let store = ConversationStore::new();
        let conv = store.create_conversation(None).await;
        assert!(store.delete_conversation(&conv.id).await);
        assert!(!store.delete_conversation(&conv.id).await);
    }

    #[tokio::test]
    async fn test_list_conversations_oldest_first() {
        let store = ConversationStore::new();
        let a = store.create_conversation(Some("A")).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let b = store.create_conversation(Some("B")).await;
        let list = store.list_conversations().await;
        assert_eq!(list[0].id, a.id);
        assert_eq!(list[1].id, b.id);
    }
}
