//! `POST /v1/turns` — run one conversation turn, streamed back as NDJSON.
//!
//! Validation failures and persistence failures for the inbound user message
//! surface as ordinary JSON error responses before any streaming starts.
//! Once the body begins, failures travel in-band as `error` events.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::runtime::attachments::Attachment;
use crate::runtime::events::ndjson_line;
use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

use super::api_error;

const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

#[derive(Debug, Deserialize)]
pub struct TurnApiRequest {
    /// Omit to start a new conversation.
    pub conversation_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Reject requests before any conversation state is touched. Returns the
/// trimmed message content; everything downstream (persistence, the model)
/// sees only the trimmed form.
fn validate(req: &TurnApiRequest, max_attachments: usize) -> Result<String, String> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err("content must not be empty".into());
    }
    if req.attachments.len() > max_attachments {
        return Err(format!(
            "too many attachments: {} exceeds the limit of {max_attachments}",
            req.attachments.len()
        ));
    }
    Ok(content.to_string())
}

pub async fn create_turn(
    State(state): State<AppState>,
    payload: Result<Json<TurnApiRequest>, JsonRejection>,
) -> Response {
    // A body axum cannot deserialize gets the same JSON error shape as our
    // own validation failures, not the default plain-text rejection.
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return api_error(rejection.status(), rejection.body_text()).into_response()
        }
    };

    let content = match validate(&req, state.config.limits.max_attachments) {
        Ok(content) => content,
        Err(msg) => return api_error(StatusCode::BAD_REQUEST, msg).into_response(),
    };

    let (conversation, is_new) = match state
        .conversations
        .resolve_or_create(req.conversation_id.as_deref())
    {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve conversation");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    let conversation_id = conversation.conversation_id;
    if is_new {
        tracing::info!(conversation_id = %conversation_id, "created conversation");
    }

    // The user message is durable before the first byte streams, so the
    // `done` event can carry its identifier and a crash mid-turn never
    // loses the caller's input.
    let user_record = match state
        .messages
        .create_message(&conversation_id, "user", &content)
    {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(conversation_id = %conversation_id, error = %e, "failed to persist user message");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let mut rx = run_turn(
        state,
        TurnInput {
            conversation_id: conversation_id.clone(),
            content,
            attachments: req.attachments,
            user_record,
        },
    );

    let body = Body::from_stream(async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<_, Infallible>(Bytes::from(ndjson_line(&event)));
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(CONVERSATION_ID_HEADER, conversation_id)
        .body(body)
        .unwrap_or_else(|e| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content: &str, attachments: usize) -> TurnApiRequest {
        TurnApiRequest {
            conversation_id: None,
            content: content.into(),
            attachments: (0..attachments)
                .map(|i| Attachment {
                    name: format!("f{i}.pdf"),
                    media_type: "application/pdf".into(),
                    data: "QUJD".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(validate(&request("", 0), 5).is_err());
        assert!(validate(&request("   \n\t", 0), 5).is_err());
    }

    #[test]
    fn content_is_trimmed() {
        assert_eq!(validate(&request("  Hi  \n", 0), 5).unwrap(), "Hi");
    }

    #[test]
    fn attachment_limit_is_enforced() {
        assert!(validate(&request("hi", 5), 5).is_ok());
        assert!(validate(&request("hi", 6), 5).is_err());
    }

    #[test]
    fn attachments_default_to_empty() {
        let req: TurnApiRequest = serde_json::from_str(r#"{"content":"Hi"}"#).unwrap();
        assert!(req.attachments.is_empty());
        assert!(req.conversation_id.is_none());
        assert!(validate(&req, 5).is_ok());
    }
}
