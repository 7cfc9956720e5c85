//! Conversation and message persistence for the Tiller gateway.
//!
//! Conversations live in a single `conversations.json` index; each
//! conversation's messages are an append-only `<conversationId>.jsonl` log.

pub mod conversations;
pub mod messages;

pub use conversations::{ConversationEntry, ConversationStore};
pub use messages::{MessageLog, MessageRecord};
