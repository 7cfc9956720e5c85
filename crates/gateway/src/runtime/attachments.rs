//! Attachment preprocessing — rewrites the newest user message into a
//! multi-part content array when file attachments are present.
//!
//! Ordering is deliberate: document and image blocks come first, in
//! attachment order, and the instructional text lands last, so the model
//! reads the source material before the instruction referencing it.

use serde::Deserialize;

use tiller_domain::message::ContentBlock;

/// One inbound file attachment (base64 payload).
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub data: String,
}

const IMAGE_MEDIA_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Build the replacement content-block array for the newest user message.
///
/// PDFs become document blocks, supported images become image blocks, and
/// anything else is skipped without an error. Exactly one text block with
/// the original message text closes the array.
pub fn build_user_blocks(attachments: &[Attachment], text: &str) -> Vec<ContentBlock> {
    let mut blocks = Vec::with_capacity(attachments.len() + 1);

    for attachment in attachments {
        match attachment.media_type.as_str() {
            "application/pdf" => blocks.push(ContentBlock::Document {
                media_type: attachment.media_type.clone(),
                data: attachment.data.clone(),
            }),
            mt if IMAGE_MEDIA_TYPES.contains(&mt) => blocks.push(ContentBlock::Image {
                media_type: attachment.media_type.clone(),
                data: attachment.data.clone(),
            }),
            other => {
                tracing::warn!(
                    name = %attachment.name,
                    media_type = %other,
                    "unsupported attachment media type; skipping"
                );
            }
        }
    }

    blocks.push(ContentBlock::Text {
        text: text.to_string(),
    });

    blocks
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(media_type: &str) -> Attachment {
        Attachment {
            name: "file".into(),
            media_type: media_type.into(),
            data: "QUJD".into(),
        }
    }

    #[test]
    fn text_always_lands_last() {
        let blocks = build_user_blocks(
            &[attachment("application/pdf"), attachment("image/png")],
            "summarize",
        );

        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], ContentBlock::Document { .. }));
        assert!(matches!(blocks[1], ContentBlock::Image { .. }));
        match &blocks[2] {
            ContentBlock::Text { text } => assert_eq!(text, "summarize"),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn attachment_order_is_preserved() {
        let blocks = build_user_blocks(
            &[attachment("image/webp"), attachment("application/pdf")],
            "compare these",
        );

        assert!(matches!(blocks[0], ContentBlock::Image { .. }));
        assert!(matches!(blocks[1], ContentBlock::Document { .. }));
    }

    #[test]
    fn unsupported_media_types_are_skipped() {
        let blocks = build_user_blocks(
            &[attachment("text/csv"), attachment("application/pdf")],
            "read this",
        );

        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0], ContentBlock::Document { .. }));
        assert!(matches!(blocks[1], ContentBlock::Text { .. }));
    }

    #[test]
    fn no_attachments_yields_single_text_block() {
        let blocks = build_user_blocks(&[], "just text");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], ContentBlock::Text { .. }));
    }
}
