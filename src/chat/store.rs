//! In-memory chat mapping with optional persistence.
//!
//! The store keeps every chat of the session keyed by [`ChatId`] plus the
//! id of the active chat. When history is enabled, `persist` writes the whole
//! mapping under [`CHATS_KEY`] and the active id under [`CURRENT_CHAT_KEY`];
//! when disabled, neither reads nor writes touch storage.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ids::ChatId;
use crate::storage::{self, CHATS_BACKUP_KEY, CHATS_KEY, CURRENT_CHAT_KEY, KeyValueStore, StorageResult};

use super::message::Chat;

/// Sidebar entry for one chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSummary {
    /// Chat identifier.
    pub id: ChatId,
    /// Display title.
    pub title: String,
    /// Creation time in milliseconds.
    pub created_at: i64,
    /// Whether this is the active chat.
    pub active: bool,
}

/// Result of a successful [`ChatStore::delete`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// The chat that was removed.
    pub removed: ChatId,
    /// New active chat when the removed one was active.
    pub switched_to: Option<ChatId>,
    /// Set when the set became empty and a fresh chat was created.
    pub created: bool,
}

/// All chats of the session.
pub struct ChatStore {
    chats: HashMap<ChatId, Chat>,
    active: Option<ChatId>,
    storage: Arc<dyn KeyValueStore>,
    history_enabled: bool,
}

impl ChatStore {
    /// Empty store over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>, history_enabled: bool) -> Self {
        Self {
            chats: HashMap::new(),
            active: None,
            storage,
            history_enabled,
        }
    }

    /// Toggle persistence for subsequent reads and writes.
    pub fn set_history_enabled(&mut self, enabled: bool) {
        self.history_enabled = enabled;
    }

    /// Number of chats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chats.len()
    }

    /// Whether the store holds no chats.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Look up a chat.
    #[must_use]
    pub fn get(&self, id: &ChatId) -> Option<&Chat> {
        self.chats.get(id)
    }

    /// Look up a chat mutably.
    pub fn get_mut(&mut self, id: &ChatId) -> Option<&mut Chat> {
        self.chats.get_mut(id)
    }

    /// Id of the active chat.
    #[must_use]
    pub const fn active_id(&self) -> Option<&ChatId> {
        self.active.as_ref()
    }

    /// The active chat.
    #[must_use]
    pub fn active(&self) -> Option<&Chat> {
        self.active.as_ref().and_then(|id| self.chats.get(id))
    }

    /// The active chat, mutably.
    pub fn active_mut(&mut self) -> Option<&mut Chat> {
        let id = self.active.as_ref()?;
        self.chats.get_mut(id)
    }

    /// Insert a new empty chat and make it active.
    pub fn create(&mut self, title: impl Into<String>, now_ms: i64) -> ChatId {
        let id = ChatId::generate(now_ms);
        self.chats
            .insert(id.clone(), Chat::new(id.clone(), title, now_ms));
        self.active = Some(id.clone());
        tracing::debug!(chat = %id, "Chat created");
        id
    }

    /// Make `id` active. Returns `false` if unknown or already active.
    pub fn switch_to(&mut self, id: &ChatId) -> bool {
        if self.active.as_ref() == Some(id) || !self.chats.contains_key(id) {
            return false;
        }
        self.active = Some(id.clone());
        true
    }

    /// Remove `id`, keeping at least one chat in the set.
    ///
    /// When the removed chat was active, the most recently created remaining
    /// chat becomes active; if none remains, a fresh chat titled
    /// `fallback_title` is created.
    pub fn delete(&mut self, id: &ChatId, fallback_title: &str, now_ms: i64) -> Option<DeleteOutcome> {
        self.chats.remove(id)?;
        tracing::debug!(chat = %id, "Chat deleted");

        let mut outcome = DeleteOutcome {
            removed: id.clone(),
            switched_to: None,
            created: false,
        };
        if self.active.as_ref() == Some(id) || self.active.is_none() {
            self.active = None;
            match self.most_recent() {
                Some(next) => {
                    self.active = Some(next.clone());
                    outcome.switched_to = Some(next);
                }
                None => {
                    outcome.switched_to = Some(self.create(fallback_title, now_ms));
                    outcome.created = true;
                }
            }
        }
        Some(outcome)
    }

    /// Set the title of `id`. Returns `false` when the trimmed title is
    /// empty, unchanged, or the chat is unknown.
    pub fn rename(&mut self, id: &ChatId, title: &str) -> bool {
        let title = title.trim();
        match self.chats.get_mut(id) {
            Some(chat) if !title.is_empty() && chat.title != title => {
                chat.title = title.to_string();
                true
            }
            _ => false,
        }
    }

    /// Most recently created chat.
    #[must_use]
    pub fn most_recent(&self) -> Option<ChatId> {
        self.chats
            .values()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|chat| chat.id.clone())
    }

    /// Chats sorted newest first.
    #[must_use]
    pub fn list(&self) -> Vec<ChatSummary> {
        let mut list: Vec<ChatSummary> = self
            .chats
            .values()
            .map(|chat| ChatSummary {
                id: chat.id.clone(),
                title: chat.title.clone(),
                created_at: chat.created_at,
                active: self.active.as_ref() == Some(&chat.id),
            })
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        list
    }

    /// Write all chats and the active id, if history is enabled.
    ///
    /// # Errors
    /// Returns an error if encoding or storage access fails.
    pub async fn persist(&self) -> StorageResult<()> {
        if !self.history_enabled {
            return Ok(());
        }
        storage::set_json(self.storage.as_ref(), CHATS_KEY, &self.chats).await?;
        match &self.active {
            Some(id) => {
                self.storage
                    .set(CURRENT_CHAT_KEY, id.as_str().to_string())
                    .await?;
            }
            None => self.storage.remove(CURRENT_CHAT_KEY).await?,
        }
        tracing::debug!(chats = self.chats.len(), "Chats persisted");
        Ok(())
    }

    /// Replace the in-memory state with the stored one, if history is enabled.
    ///
    /// A malformed record is copied to [`CHATS_BACKUP_KEY`] and treated as
    /// absent. A stored active id that no longer exists falls back to the
    /// most recent chat. On error, persistence stays off for this store so
    /// the stored record is never overwritten.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn restore(&mut self) -> StorageResult<()> {
        if !self.history_enabled {
            return Ok(());
        }
        if let Err(err) = self.load_stored().await {
            self.history_enabled = false;
            tracing::error!("Chat history disabled for this session: {err}");
            return Err(err);
        }
        tracing::info!(chats = self.chats.len(), "Chats restored");
        Ok(())
    }

    async fn load_stored(&mut self) -> StorageResult<()> {
        let chats = match self.storage.get(CHATS_KEY).await? {
            None => HashMap::new(),
            Some(raw) => match serde_json::from_str::<HashMap<ChatId, Chat>>(&raw) {
                Ok(chats) => chats,
                Err(err) => {
                    tracing::warn!("Stored chats are malformed, keeping a copy under {CHATS_BACKUP_KEY}: {err}");
                    self.storage.set(CHATS_BACKUP_KEY, raw).await?;
                    HashMap::new()
                }
            },
        };
        self.chats = chats;

        let stored_active = self.storage.get(CURRENT_CHAT_KEY).await?.map(ChatId::from_raw);
        self.active = match stored_active {
            Some(id) if self.chats.contains_key(&id) => Some(id),
            _ => self.most_recent(),
        };
        Ok(())
    }
}
