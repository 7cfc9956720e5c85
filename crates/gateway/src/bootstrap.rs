//! AppState construction extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;

use tiller_domain::config::Config;
use tiller_providers::AnthropicProvider;
use tiller_store::{ConversationStore, MessageLog};

use crate::runtime::tools::{HttpToolExecutor, ToolExecutor};
use crate::state::AppState;

/// Initialize every subsystem and return a fully-wired [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Persistence ──────────────────────────────────────────────────
    let conversations = Arc::new(
        ConversationStore::new(&config.store.state_path)
            .context("initializing conversation store")?,
    );
    let messages = Arc::new(
        MessageLog::new(&config.store.state_path).context("initializing message log")?,
    );
    tracing::info!(path = %config.store.state_path.display(), "stores ready");

    // ── Model provider ───────────────────────────────────────────────
    let provider = Arc::new(
        AnthropicProvider::from_config(&config.provider).context("initializing model provider")?,
    );
    tracing::info!(
        provider = %config.provider.id,
        model = %config.provider.model,
        "model provider ready"
    );

    // ── Tool executor + manifest ─────────────────────────────────────
    let tools: Arc<dyn ToolExecutor> = Arc::new(
        HttpToolExecutor::from_config(&config.tools).context("initializing tool executor")?,
    );
    let tool_defs = match tools.manifest().await {
        Ok(defs) => {
            tracing::info!(tools = defs.len(), "tool manifest loaded");
            defs
        }
        Err(e) => {
            tracing::warn!(
                url = %config.tools.base_url,
                error = %e,
                "tool manifest unavailable; turns will run without tools"
            );
            Vec::new()
        }
    };

    Ok(AppState {
        config,
        provider,
        tools,
        tool_defs: Arc::new(tool_defs),
        conversations,
        messages,
    })
}
