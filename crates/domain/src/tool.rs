use serde::{Deserialize, Serialize};

/// A completed tool invocation request from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Tool definition exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub parameters: serde_json::Value,
}

/// Normalized outcome of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Serialize into the text payload of a tool-result content block.
    ///
    /// The model always receives a JSON string: the data value itself on
    /// success, `{"error": "..."}` on failure.
    pub fn to_content_string(&self) -> String {
        let body = if self.success {
            serde_json::json!(self.data.clone().unwrap_or(serde_json::Value::Null))
        } else {
            serde_json::json!({
                "error": self.error.clone().unwrap_or_else(|| "unknown error".into())
            })
        };
        body.to_string()
    }
}
