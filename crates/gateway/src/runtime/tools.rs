//! Tool dispatch — the adapter between completed tool-use blocks and the
//! external tool execution service.
//!
//! Tool calls within a round run strictly one at a time so side effects with
//! ordering dependencies behave predictably, and so at most one
//! `tool_start`/`tool_done` pair is ever in flight.

use std::collections::HashMap;

use serde_json::Value;

use tiller_domain::config::ToolsConfig;
use tiller_domain::error::{Error, Result};
use tiller_domain::message::ContentBlock;
use tiller_domain::tool::{ToolDefinition, ToolResult, ToolUse};

use super::events::{EventSink, SinkClosed, WireEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolExecutor trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The external tool execution service, at its interface boundary.
///
/// Injected into the orchestrator so tests can script results without a
/// network. `execute` may fail; the dispatch adapter converts every failure
/// into a [`ToolResult`] and never lets it escape the turn.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Perform one tool invocation on behalf of `caller_id`.
    async fn execute(&self, tool: &str, input: &Value, caller_id: &str) -> Result<ToolResult>;

    /// The manifest of tools this service offers.
    async fn manifest(&self) -> Result<Vec<ToolDefinition>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Talks to the tool execution service over HTTP.
///
/// `POST {base_url}/v1/execute` with `{tool, input, caller_id}` returns
/// `{success, data?, error?}`; `GET {base_url}/v1/tools` returns the manifest.
pub struct HttpToolExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolExecutor {
    pub fn from_config(cfg: &ToolsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::Tool(e.to_string()))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, tool: &str, input: &Value, caller_id: &str) -> Result<ToolResult> {
        let url = format!("{}/v1/execute", self.base_url);
        let body = serde_json::json!({
            "tool": tool,
            "input": input,
            "caller_id": caller_id,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Tool(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Tool(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Tool(format!("HTTP {} - {}", status.as_u16(), text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Tool(format!("malformed tool service response: {e}")))
    }

    async fn manifest(&self) -> Result<Vec<ToolDefinition>> {
        let url = format!("{}/v1/tools", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Tool(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Tool(format!("HTTP {}", status.as_u16())));
        }

        resp.json()
            .await
            .map_err(|e| Error::Tool(format!("malformed tool manifest: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Human-readable label for a tool, falling back to the raw name.
pub fn label_for<'a>(labels: &'a HashMap<String, String>, tool: &'a str) -> &'a str {
    labels.get(tool).map(String::as_str).unwrap_or(tool)
}

/// Execute one completed tool call, bracketed by `tool_start`/`tool_done`
/// events, and return the tool-result content block to feed back to the
/// model.
///
/// Executor failures never propagate: they become a failure [`ToolResult`]
/// whose message reaches the model, while the caller sees
/// `tool_done{success:false}`. The only error path out of here is a closed
/// event sink.
pub async fn dispatch_tool(
    executor: &dyn ToolExecutor,
    labels: &HashMap<String, String>,
    call: &ToolUse,
    caller_id: &str,
    sink: &EventSink,
) -> std::result::Result<ContentBlock, SinkClosed> {
    sink.send(WireEvent::ToolStart {
        tool: call.name.clone(),
        label: label_for(labels, &call.name).to_string(),
    })
    .await?;

    let result = match executor.execute(&call.name, &call.input, caller_id).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
            ToolResult::failure(e.to_string())
        }
    };

    sink.send(WireEvent::ToolDone {
        tool: call.name.clone(),
        success: result.success,
    })
    .await?;

    Ok(ContentBlock::ToolResult {
        tool_use_id: call.id.clone(),
        content: result.to_content_string(),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct FailingExecutor;

    #[async_trait::async_trait]
    impl ToolExecutor for FailingExecutor {
        async fn execute(&self, _: &str, _: &Value, _: &str) -> Result<ToolResult> {
            Err(Error::Tool("connection refused".into()))
        }

        async fn manifest(&self) -> Result<Vec<ToolDefinition>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn label_falls_back_to_tool_name() {
        let mut labels = HashMap::new();
        labels.insert("get_weather".to_string(), "Checking the weather".to_string());

        assert_eq!(label_for(&labels, "get_weather"), "Checking the weather");
        assert_eq!(label_for(&labels, "unlabeled_tool"), "unlabeled_tool");
    }

    #[tokio::test]
    async fn executor_failure_becomes_error_result() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(tx);
        let call = ToolUse {
            id: "tu_1".into(),
            name: "get_weather".into(),
            input: serde_json::json!({}),
        };

        let block = dispatch_tool(&FailingExecutor, &HashMap::new(), &call, "c1", &sink)
            .await
            .unwrap();

        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                assert_eq!(tool_use_id, "tu_1");
                assert!(content.contains("connection refused"));
            }
            other => panic!("unexpected block: {other:?}"),
        }

        // tool_start then tool_done{success:false}.
        match rx.recv().await.unwrap() {
            WireEvent::ToolStart { tool, .. } => assert_eq!(tool, "get_weather"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            WireEvent::ToolDone { success, .. } => assert!(!success),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_sink_aborts_dispatch() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let sink = EventSink::new(tx);
        let call = ToolUse {
            id: "tu_1".into(),
            name: "get_weather".into(),
            input: serde_json::json!({}),
        };

        let result = dispatch_tool(&FailingExecutor, &HashMap::new(), &call, "c1", &sink).await;
        assert!(result.is_err());
    }
}
