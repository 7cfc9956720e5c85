//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API with streaming and tool use.
//! System prompts go in a separate top-level `system` field, and tool
//! results travel as user messages with `tool_result` content blocks.
//! Provider wire events are flattened into the [`StreamSignal`] alphabet;
//! block reassembly happens in the gateway's round accumulator, not here.

use serde_json::Value;

use crate::sse::sse_response_stream;
use crate::traits::{ModelProvider, TurnRequest};
use crate::util::{from_reqwest, resolve_api_key};
use tiller_domain::config::ProviderConfig;
use tiller_domain::error::{Error, Result};
use tiller_domain::message::{ContentBlock, Message, MessageContent, Role};
use tiller_domain::stream::{BoxStream, StopSignal, StreamSignal};
use tiller_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A model provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new provider from the deserialized provider config.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &TurnRequest) -> Value {
        let api_messages: Vec<Value> = req.messages.iter().map(msg_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": api_messages,
            "max_tokens": req.max_tokens.unwrap_or(self.max_tokens),
            "stream": true,
        });

        if !req.system.is_empty() {
            body["system"] = Value::String(req.system.clone());
        }

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_anthropic(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": role,
            "content": t,
        }),
        MessageContent::Blocks(blocks) => {
            let content: Vec<Value> = blocks.iter().map(block_to_anthropic).collect();
            serde_json::json!({
                "role": role,
                "content": content,
            })
        }
    }
}

fn block_to_anthropic(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({
            "type": "text",
            "text": text,
        }),
        ContentBlock::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
        } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
        }),
        ContentBlock::Document { media_type, data } => serde_json::json!({
            "type": "document",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": data,
            }
        }),
        ContentBlock::Image { media_type, data } => serde_json::json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": media_type,
                "data": data,
            }
        }),
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a single Anthropic SSE data payload into zero or more stream signals.
///
/// Content blocks stream strictly one at a time, so the block index carried
/// by the wire events is not needed downstream: a `content_block_stop` always
/// refers to the most recently opened block. Stops of text blocks surface as
/// [`StreamSignal::BlockStop`] too; the accumulator ignores them when no tool
/// builder is open.
fn parse_anthropic_sse(data: &str) -> Vec<Result<StreamSignal>> {
    let mut signals = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            signals.push(Err(Error::Json(e)));
            return signals;
        }
    };

    let event_type = v.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match event_type {
        "content_block_start" => {
            if let Some(block) = v.get("content_block") {
                let block_type = block.get("type").and_then(|v| v.as_str()).unwrap_or("");
                if block_type == "tool_use" {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    signals.push(Ok(StreamSignal::ToolUseStart { id, name }));
                }
            }
        }

        "content_block_delta" => {
            if let Some(delta) = v.get("delta") {
                let delta_type = delta.get("type").and_then(|v| v.as_str()).unwrap_or("");
                match delta_type {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|v| v.as_str()) {
                            if !text.is_empty() {
                                signals.push(Ok(StreamSignal::TextDelta {
                                    text: text.to_string(),
                                }));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.get("partial_json").and_then(|v| v.as_str()) {
                            signals.push(Ok(StreamSignal::InputFragment {
                                text: partial.to_string(),
                            }));
                        }
                    }
                    _ => {}
                }
            }
        }

        "content_block_stop" => {
            signals.push(Ok(StreamSignal::BlockStop));
        }

        "message_delta" => {
            if let Some(stop_reason) = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
            {
                signals.push(Ok(StreamSignal::Stop {
                    signal: StopSignal::from_raw(stop_reason),
                }));
            }
        }

        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            signals.push(Err(Error::Provider {
                provider: "anthropic".into(),
                message: msg.to_string(),
            }));
        }

        _ => {
            // message_start, message_stop, ping -- nothing to surface.
        }
    }

    signals
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ModelProvider for AnthropicProvider {
    async fn stream_turn(
        &self,
        req: &TurnRequest,
    ) -> Result<BoxStream<'static, Result<StreamSignal>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(req);

        tracing::debug!(provider = %self.id, url = %url, "anthropic stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        Ok(sse_response_stream(resp, parse_anthropic_sse))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_use_block_start_maps_to_signal() {
        let data = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"tu_1","name":"get_weather"}}"#;
        let signals = parse_anthropic_sse(data);
        assert_eq!(signals.len(), 1);
        match signals[0].as_ref().unwrap() {
            StreamSignal::ToolUseStart { id, name } => {
                assert_eq!(id, "tu_1");
                assert_eq!(name, "get_weather");
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn text_block_start_emits_nothing() {
        let data = r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#;
        assert!(parse_anthropic_sse(data).is_empty());
    }

    #[test]
    fn text_delta_maps_to_signal() {
        let data =
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        let signals = parse_anthropic_sse(data);
        match signals[0].as_ref().unwrap() {
            StreamSignal::TextDelta { text } => assert_eq!(text, "Hi"),
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn input_json_delta_maps_to_fragment() {
        let data = r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}"#;
        let signals = parse_anthropic_sse(data);
        match signals[0].as_ref().unwrap() {
            StreamSignal::InputFragment { text } => assert_eq!(text, "{\"city\":"),
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn message_delta_stop_reason_maps_to_stop() {
        let data = r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":12}}"#;
        let signals = parse_anthropic_sse(data);
        match signals[0].as_ref().unwrap() {
            StreamSignal::Stop { signal } => assert_eq!(*signal, StopSignal::ToolUse),
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn error_event_surfaces_as_provider_error() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let signals = parse_anthropic_sse(data);
        assert!(signals[0].is_err());
    }

    #[test]
    fn ping_is_ignored() {
        assert!(parse_anthropic_sse(r#"{"type":"ping"}"#).is_empty());
    }

    #[test]
    fn tool_result_block_serializes_as_string_content() {
        let msg = Message::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "tu_1".into(),
            content: r#"{"temp":40}"#.into(),
        }]);
        let v = msg_to_anthropic(&msg);
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "tool_result");
        // The payload must be a JSON *string*, never a raw structure.
        assert!(v["content"][0]["content"].is_string());
    }

    #[test]
    fn document_block_uses_base64_source() {
        let msg = Message::user_blocks(vec![ContentBlock::Document {
            media_type: "application/pdf".into(),
            data: "QUJD".into(),
        }]);
        let v = msg_to_anthropic(&msg);
        assert_eq!(v["content"][0]["type"], "document");
        assert_eq!(v["content"][0]["source"]["type"], "base64");
        assert_eq!(v["content"][0]["source"]["media_type"], "application/pdf");
    }
}
