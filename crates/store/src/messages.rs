//! Append-only JSONL message logs.
//!
//! Each conversation gets a `<conversationId>.jsonl` file under the messages
//! directory. Every persisted message is appended as a single JSON line.
//!
//! Includes an in-memory write-through cache so reads never hit disk after
//! the first load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use tiller_domain::error::{Error, Result};

/// A single persisted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Creation timestamp as Unix epoch milliseconds (the wire format).
    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}

/// Writes append-only JSONL message logs with an in-memory write-through
/// cache.
pub struct MessageLog {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<MessageRecord>>>,
}

impl MessageLog {
    pub fn new(state_path: &Path) -> Result<Self> {
        let base_dir = state_path.join("messages");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;

        Ok(Self {
            base_dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Append one message to a conversation's log, generating its ID and
    /// timestamp. Writes to disk first; an already-loaded cache entry is
    /// extended only if I/O succeeds.
    pub fn create_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Result<MessageRecord> {
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            role: role.to_owned(),
            content: content.to_owned(),
            created_at: Utc::now(),
        };

        let path = self.log_path(conversation_id);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).map_err(Error::Io)?;

        {
            // Only extend an entry that already holds the full on-disk log.
            // Seeding a fresh entry here would shadow prior records written
            // before this process started; read() lazy-loads those from disk,
            // including the line just appended.
            let mut cache = self.cache.write();
            if let Some(records) = cache.get_mut(conversation_id) {
                records.push(record.clone());
            }
        }

        Ok(record)
    }

    /// Read back a conversation's messages in append order. Returns cached
    /// records if available, otherwise loads from disk and populates the cache.
    pub fn read(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        {
            let cache = self.cache.read();
            if let Some(records) = cache.get(conversation_id) {
                return Ok(records.clone());
            }
        }

        let records = read_jsonl_file(&self.log_path(conversation_id), conversation_id)?;
        {
            let mut cache = self.cache.write();
            cache.insert(conversation_id.to_owned(), records.clone());
        }
        Ok(records)
    }

    fn log_path(&self, conversation_id: &str) -> PathBuf {
        self.base_dir.join(format!("{conversation_id}.jsonl"))
    }
}

/// Read and parse a JSONL message log file.
fn read_jsonl_file(path: &Path, conversation_id: &str) -> Result<Vec<MessageRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut records = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MessageRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    conversation_id = conversation_id,
                    error = %e,
                    "skipping malformed message log line"
                );
            }
        }
    }
    Ok(records)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
