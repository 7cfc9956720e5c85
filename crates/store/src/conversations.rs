//! Gateway-owned conversation index.
//!
//! Persists conversation state in `conversations.json` under the configured
//! state path. Each conversation ID maps to a [`ConversationEntry`] tracking
//! creation and last-activity timestamps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use tiller_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single conversation tracked by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversation index backed by a JSON file, with an in-memory
/// write-through map.
pub struct ConversationStore {
    index_path: PathBuf,
    conversations: RwLock<HashMap<String, ConversationEntry>>,
}

impl ConversationStore {
    /// Load or create the store at `state_path/conversations.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;

        let index_path = state_path.join("conversations.json");
        let conversations = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            conversations = conversations.len(),
            path = %index_path.display(),
            "conversation store loaded"
        );

        Ok(Self {
            index_path,
            conversations: RwLock::new(conversations),
        })
    }

    /// Look up a conversation by ID.
    pub fn get(&self, conversation_id: &str) -> Option<ConversationEntry> {
        self.conversations.read().get(conversation_id).cloned()
    }

    /// Resolve or create a conversation. Returns `(entry, is_new)`.
    ///
    /// `None` generates a fresh conversation ID; `Some(id)` reuses the
    /// existing entry or creates one under that ID.
    pub fn resolve_or_create(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<(ConversationEntry, bool)> {
        if let Some(id) = conversation_id {
            let conversations = self.conversations.read();
            if let Some(entry) = conversations.get(id) {
                return Ok((entry.clone(), false));
            }
        }

        let now = Utc::now();
        let id = conversation_id
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let entry = ConversationEntry {
            conversation_id: id.clone(),
            created_at: now,
            updated_at: now,
        };

        {
            let mut conversations = self.conversations.write();
            conversations.insert(id, entry.clone());
        }
        self.persist()?;

        Ok((entry, true))
    }

    /// Update a conversation's activity timestamp.
    pub fn touch(&self, conversation_id: &str) -> Result<()> {
        {
            let mut conversations = self.conversations.write();
            match conversations.get_mut(conversation_id) {
                Some(entry) => entry.updated_at = Utc::now(),
                None => {
                    return Err(Error::Store(format!(
                        "unknown conversation: {conversation_id}"
                    )))
                }
            }
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self.conversations.read().clone();
        let raw = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.index_path, raw).map_err(Error::Io)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_resolve_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();

        let (entry, is_new) = store.resolve_or_create(None).unwrap();
        assert!(is_new);

        let (again, is_new) = store
            .resolve_or_create(Some(&entry.conversation_id))
            .unwrap();
        assert!(!is_new);
        assert_eq!(again.conversation_id, entry.conversation_id);
    }

    #[test]
    fn touch_advances_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();

        let (entry, _) = store.resolve_or_create(None).unwrap();
        store.touch(&entry.conversation_id).unwrap();

        let after = store.get(&entry.conversation_id).unwrap();
        assert!(after.updated_at >= entry.updated_at);
    }

    #[test]
    fn touch_unknown_conversation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        assert!(store.touch("nope").is_err());
    }

    #[test]
    fn index_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = ConversationStore::new(dir.path()).unwrap();
            store.resolve_or_create(None).unwrap().0.conversation_id
        };

        let reloaded = ConversationStore::new(dir.path()).unwrap();
        assert!(reloaded.get(&id).is_some());
    }
}
