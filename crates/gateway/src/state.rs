use std::sync::Arc;

use tiller_domain::config::Config;
use tiller_domain::tool::ToolDefinition;
use tiller_providers::ModelProvider;
use tiller_store::{ConversationStore, MessageLog};

use crate::runtime::tools::ToolExecutor;

/// Shared application state passed to all API handlers.
///
/// The model provider and tool executor are injected trait handles (never
/// process-wide singletons), so the orchestrator runs against fakes in tests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn ModelProvider>,
    pub tools: Arc<dyn ToolExecutor>,
    /// Tool manifest fetched from the tool service at startup.
    /// Sent whole to the model every round; never pruned.
    pub tool_defs: Arc<Vec<ToolDefinition>>,
    pub conversations: Arc<ConversationStore>,
    pub messages: Arc<MessageLog>,
}
