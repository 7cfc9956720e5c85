//! The caller-facing wire protocol: one JSON object per line.
//!
//! Exactly five event kinds exist; adding one is a compiler-checked change.
//! Events are constructed, serialized, flushed, and discarded — never
//! retained or reordered.

use serde::Serialize;
use tokio::sync::mpsc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WireEvent — the NDJSON event type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted to the caller during a single turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum WireEvent {
    /// Incremental assistant text from any round.
    #[serde(rename = "chunk")]
    Chunk { text: String },

    /// A tool call is about to execute.
    #[serde(rename = "tool_start")]
    ToolStart { tool: String, label: String },

    /// A tool call returned.
    #[serde(rename = "tool_done")]
    ToolDone { tool: String, success: bool },

    /// Normal completion. Emitted exactly once; carries the identifiers and
    /// timestamps of the two messages persisted for this turn.
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "userCreatedAt")]
        user_created_at: i64,
        #[serde(rename = "assistantId")]
        assistant_id: String,
        #[serde(rename = "assistantCreatedAt")]
        assistant_created_at: i64,
    },

    /// Unrecoverable failure. At most once; the stream closes right after.
    #[serde(rename = "error")]
    Error { error: String },
}

/// Serialize an event to its NDJSON wire form (JSON object + newline).
pub fn ndjson_line(event: &WireEvent) -> String {
    let mut line = serde_json::to_string(event)
        .unwrap_or_else(|e| format!(r#"{{"kind":"error","error":"serialization: {e}"}}"#));
    line.push('\n');
    line
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventSink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The receiving half of the event channel has been dropped — the caller
/// disconnected mid-stream.
#[derive(Debug, thiserror::Error)]
#[error("event sink closed: caller disconnected")]
pub struct SinkClosed;

/// Sending side of the turn's event channel.
///
/// A failed send means the caller is gone; the orchestrator treats that as
/// a signal to abandon the turn rather than something to retry.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<WireEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<WireEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: WireEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serializes_with_kind_tag() {
        let line = ndjson_line(&WireEvent::Chunk { text: "Hi".into() });
        assert_eq!(line, "{\"kind\":\"chunk\",\"text\":\"Hi\"}\n");
    }

    #[test]
    fn tool_events_carry_name_and_flag() {
        let start = serde_json::to_value(WireEvent::ToolStart {
            tool: "get_weather".into(),
            label: "Checking the weather".into(),
        })
        .unwrap();
        assert_eq!(start["kind"], "tool_start");
        assert_eq!(start["label"], "Checking the weather");

        let done = serde_json::to_value(WireEvent::ToolDone {
            tool: "get_weather".into(),
            success: false,
        })
        .unwrap();
        assert_eq!(done["kind"], "tool_done");
        assert_eq!(done["success"], false);
    }

    #[test]
    fn done_uses_camel_case_fields() {
        let v = serde_json::to_value(WireEvent::Done {
            user_id: "u1".into(),
            user_created_at: 1700000000000,
            assistant_id: "a1".into(),
            assistant_created_at: 1700000000500,
        })
        .unwrap();
        assert_eq!(v["kind"], "done");
        assert_eq!(v["userId"], "u1");
        assert_eq!(v["userCreatedAt"], 1700000000000i64);
        assert_eq!(v["assistantId"], "a1");
        assert_eq!(v["assistantCreatedAt"], 1700000000500i64);
    }

    #[test]
    fn every_line_ends_with_newline() {
        let line = ndjson_line(&WireEvent::Error {
            error: "boom".into(),
        });
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
