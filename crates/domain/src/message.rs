use serde::{Deserialize, Serialize};

/// A message in the conversation history (provider-agnostic).
///
/// Tool results travel as user-role messages carrying [`ContentBlock::ToolResult`]
/// blocks, so the history only ever contains user and assistant roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One content block inside a structured message.
///
/// A `ToolUse` block's `input` is only well-formed JSON once its originating
/// stream has signalled block-stop; partial input under construction lives in
/// the round accumulator, never in a `ContentBlock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        /// Always a JSON string payload (never a raw structure), so the model
        /// receives a text body regardless of success/failure shape.
        content: String,
    },

    /// A base64-encoded document (PDF) attachment.
    #[serde(rename = "document")]
    Document { media_type: String, data: String },

    /// A base64-encoded image attachment.
    #[serde(rename = "image")]
    Image { media_type: String, data: String },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text block, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_block_serializes_with_type_tag() {
        let block = ContentBlock::ToolUse {
            id: "tu_1".into(),
            name: "get_weather".into(),
            input: serde_json::json!({"city": "Chicago"}),
        };
        let v = serde_json::to_value(&block).unwrap();
        assert_eq!(v["type"], "tool_use");
        assert_eq!(v["name"], "get_weather");
        assert_eq!(v["input"]["city"], "Chicago");
    }

    #[test]
    fn text_content_roundtrips_untagged() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content.text(), Some("hello"));
        assert_eq!(back.role, Role::User);
    }

    #[test]
    fn blocks_content_extracts_first_text() {
        let msg = Message::user_blocks(vec![
            ContentBlock::Document {
                media_type: "application/pdf".into(),
                data: "QUJD".into(),
            },
            ContentBlock::Text {
                text: "summarize".into(),
            },
        ]);
        assert_eq!(msg.content.text(), Some("summarize"));
    }
}
