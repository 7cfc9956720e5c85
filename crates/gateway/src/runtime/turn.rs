//! The turn orchestrator: a budget-bounded loop of model rounds with tool
//! dispatch in between.
//!
//! Per-turn state lives in a [`TurnState`] value owned by one task; nothing
//! here is shared or global. Each turn runs in its own spawned task so the
//! HTTP handler can stream events while the loop makes progress.

use tokio::sync::mpsc;

use tiller_domain::message::{ContentBlock, Message};
use tiller_domain::stream::StopSignal;
use tiller_providers::TurnRequest;
use tiller_store::MessageRecord;

use super::attachments::{build_user_blocks, Attachment};
use super::events::{EventSink, SinkClosed, WireEvent};
use super::round::execute_round;
use super::tools::dispatch_tool;
use crate::state::AppState;

/// Size of the per-turn event channel. Large enough that short bursts of
/// chunks never stall the round loop on a healthy connection.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors & inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a turn ended before its normal finish path.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The caller dropped the stream. The turn is abandoned: no assistant
    /// message is persisted and no further events are emitted.
    #[error("caller disconnected")]
    Disconnected,

    /// Provider, tool-service, or store failure the turn cannot survive.
    #[error(transparent)]
    Fatal(#[from] tiller_domain::error::Error),
}

impl From<SinkClosed> for TurnError {
    fn from(_: SinkClosed) -> Self {
        TurnError::Disconnected
    }
}

/// Everything the orchestrator needs to run one turn. The user message has
/// already been persisted by the handler; its record rides along so the
/// `done` event can reference it.
pub struct TurnInput {
    pub conversation_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub user_record: MessageRecord,
}

/// How the round loop concluded (for tracing only).
#[derive(Debug, Clone, Copy)]
enum FinishReason {
    NoToolUse,
    BudgetExhausted,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-turn accumulation state: the in-memory message history this turn
/// extends round by round, and the full assistant text destined for
/// persistence.
struct TurnState {
    messages: Vec<Message>,
    text: String,
    round_index: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn in a background task and return the event channel.
///
/// The receiver side drives the NDJSON response body. Dropping it mid-turn
/// cancels the turn at the next event send.
pub fn run_turn(state: AppState, input: TurnInput) -> mpsc::Receiver<WireEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let sink = EventSink::new(tx);

    tokio::spawn(async move {
        let conversation_id = input.conversation_id.clone();
        match run_turn_inner(&state, input, &sink).await {
            Ok(()) => {}
            Err(TurnError::Disconnected) => {
                tracing::debug!(conversation_id = %conversation_id, "turn abandoned: caller disconnected");
            }
            Err(TurnError::Fatal(e)) => {
                tracing::error!(conversation_id = %conversation_id, error = %e, "turn failed");
                // Best effort: the caller may already be gone.
                let _ = sink
                    .send(WireEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    });

    rx
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The round loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &AppState,
    input: TurnInput,
    sink: &EventSink,
) -> Result<(), TurnError> {
    let limits = &state.config.limits;
    let round_timeout = std::time::Duration::from_secs(limits.round_timeout_secs);

    let mut turn = TurnState {
        messages: load_history(state, &input)?,
        text: String::new(),
        round_index: 0,
    };

    let finish = loop {
        if turn.round_index >= limits.round_budget {
            break FinishReason::BudgetExhausted;
        }
        turn.round_index += 1;

        let req = TurnRequest {
            system: state.config.prompt.system.clone(),
            messages: turn.messages.clone(),
            tools: state.tool_defs.as_ref().clone(),
            max_tokens: Some(state.config.provider.max_tokens),
        };

        tracing::debug!(
            conversation_id = %input.conversation_id,
            round = turn.round_index,
            "starting model round"
        );

        let outcome = tokio::time::timeout(
            round_timeout,
            execute_round(state.provider.as_ref(), &req, sink, &mut turn.text),
        )
        .await
        .map_err(|_| {
            tiller_domain::error::Error::Timeout(format!(
                "model round exceeded {}s",
                limits.round_timeout_secs
            ))
        })??;

        if outcome.stop != StopSignal::ToolUse || outcome.tool_calls.is_empty() {
            break FinishReason::NoToolUse;
        }

        // Extend history with the assistant's round output, then dispatch
        // each tool sequentially and feed the results back as one
        // user-role message.
        let mut assistant_blocks = Vec::new();
        if !outcome.text.is_empty() {
            assistant_blocks.push(ContentBlock::Text {
                text: outcome.text.clone(),
            });
        }
        for call in &outcome.tool_calls {
            assistant_blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        turn.messages.push(Message::assistant_blocks(assistant_blocks));

        let mut result_blocks = Vec::with_capacity(outcome.tool_calls.len());
        for call in &outcome.tool_calls {
            let block = dispatch_tool(
                state.tools.as_ref(),
                &state.config.tools.labels,
                call,
                &input.conversation_id,
                sink,
            )
            .await?;
            result_blocks.push(block);
        }
        turn.messages.push(Message::user_blocks(result_blocks));
    };

    tracing::info!(
        conversation_id = %input.conversation_id,
        rounds = turn.round_index,
        finish = ?finish,
        "turn complete"
    );

    finish_turn(state, &input, &turn, sink).await
}

/// Persist the assistant message, stamp the conversation, and emit `done`.
async fn finish_turn(
    state: &AppState,
    input: &TurnInput,
    turn: &TurnState,
    sink: &EventSink,
) -> Result<(), TurnError> {
    let assistant = state
        .messages
        .create_message(&input.conversation_id, "assistant", &turn.text)?;
    state.conversations.touch(&input.conversation_id)?;

    // Everything is durable at this point; a disconnect now only means the
    // caller misses the receipt.
    if sink
        .send(WireEvent::Done {
            user_id: input.user_record.id.clone(),
            user_created_at: input.user_record.created_at_millis(),
            assistant_id: assistant.id.clone(),
            assistant_created_at: assistant.created_at_millis(),
        })
        .await
        .is_err()
    {
        tracing::debug!(
            conversation_id = %input.conversation_id,
            "caller disconnected before done event"
        );
    }

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rebuild the provider-facing message history from the persisted log.
///
/// The log stores plain text only; in-turn tool blocks from past turns were
/// in-memory and are gone by design. If the current request carries
/// attachments, the newest user message (persisted moments ago by the
/// handler) is swapped for a multi-part block message.
fn load_history(state: &AppState, input: &TurnInput) -> Result<Vec<Message>, TurnError> {
    let records = state.messages.read(&input.conversation_id)?;

    let mut messages = Vec::with_capacity(records.len());
    for record in &records {
        match record.role.as_str() {
            "user" => messages.push(Message::user(record.content.clone())),
            "assistant" => messages.push(Message::assistant(record.content.clone())),
            other => {
                tracing::warn!(
                    conversation_id = %input.conversation_id,
                    role = %other,
                    "skipping message with unknown role"
                );
            }
        }
    }

    if !input.attachments.is_empty() {
        let blocks = build_user_blocks(&input.attachments, &input.content);
        if let Some(last) = messages.last_mut() {
            *last = Message::user_blocks(blocks);
        } else {
            messages.push(Message::user_blocks(blocks));
        }
    }

    Ok(messages)
}
