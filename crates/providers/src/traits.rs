use tiller_domain::error::Result;
use tiller_domain::message::Message;
use tiller_domain::stream::{BoxStream, StreamSignal};
use tiller_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic request for one streamed model round.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// System prompt, sent out-of-band from the message history.
    pub system: String,
    /// The full conversation history for this round.
    pub messages: Vec<Message>,
    /// The complete tool manifest. Never pruned between rounds.
    pub tools: Vec<ToolDefinition>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every model provider adapter implements.
///
/// Implementations translate between our internal types and the wire format
/// of the provider's streaming HTTP API, flattening provider events into the
/// [`StreamSignal`] alphabet the round accumulator consumes. The orchestrator
/// takes the provider as an injected handle, so tests can drive it with a
/// scripted fake.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Open one streaming round against the model.
    async fn stream_turn(
        &self,
        req: &TurnRequest,
    ) -> Result<BoxStream<'static, Result<StreamSignal>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
