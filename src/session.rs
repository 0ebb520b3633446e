//! Per-chat conversation history and per-chat serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::errors::StoreError;
use crate::store::Store;

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// A role-tagged message, serialized in the completion service's wire format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Conversation history per chat, bounded to the most recent `history_limit` messages
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn Store>,
    history_limit: Option<usize>,
}

impl SessionStore {
    /// `history_limit` of `None` keeps every message
    pub fn new(store: Arc<dyn Store>, history_limit: Option<usize>) -> Self {
        Self {
            store,
            history_limit,
        }
    }

    pub fn history_limit(&self) -> Option<usize> {
        self.history_limit
    }

    /// History for a chat; a chat seen for the first time has an empty one
    pub async fn get_or_create(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>, StoreError> {
        self.store.load_history(chat_id).await
    }

    pub async fn append(&self, chat_id: ChatId, message: ChatMessage) -> Result<(), StoreError> {
        self.store
            .append_messages(chat_id, &[message], self.history_limit)
            .await
    }

    /// Store a completed turn: the triggering message, if any, then the reply
    pub async fn append_turn(
        &self,
        chat_id: ChatId,
        trigger: Option<ChatMessage>,
        reply: ChatMessage,
    ) -> Result<(), StoreError> {
        let messages: Vec<ChatMessage> = trigger.into_iter().chain([reply]).collect();
        self.store
            .append_messages(chat_id, &messages, self.history_limit)
            .await
    }
}

/// One async mutex per chat id.
///
/// Conversation turns and payment notifications for the same chat take the
/// chat's lock, so their read-modify-write sequences never interleave while
/// different chats proceed in parallel.
#[derive(Clone, Default)]
pub struct ChatLocks {
    locks: Arc<Mutex<HashMap<ChatId, Arc<AsyncMutex<()>>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the chat's lock. Locks nobody holds or waits for are dropped
    /// from the map on the way, so it only tracks chats with work in flight.
    pub async fn acquire(&self, chat_id: ChatId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(chat_id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
