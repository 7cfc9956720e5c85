//! One model round: open a streaming request, reassemble content blocks
//! from the provider's signals, and report the round's outcome.
//!
//! All accumulation state lives in explicit [`RoundState`] values owned by
//! a single [`execute_round`] invocation and destroyed when it returns.

use futures_util::StreamExt;

use tiller_domain::stream::{StopSignal, StreamSignal};
use tiller_domain::tool::ToolUse;
use tiller_providers::{ModelProvider, TurnRequest};

use super::events::{EventSink, SinkClosed, WireEvent};
use super::turn::TurnError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Round state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool-use block under construction. Its input is a raw string buffer
/// until block-stop; it must never be dispatched before then.
#[derive(Debug)]
struct ToolUseBuilder {
    id: String,
    name: String,
    input_buf: String,
}

/// Transient accumulation state for one round.
#[derive(Debug)]
pub struct RoundState {
    /// Assistant text accumulated this round (feeds the next assistant
    /// content block, not persistence).
    pub text: String,
    current_tool: Option<ToolUseBuilder>,
    /// Completed tool-use blocks, in stream order.
    pub tool_calls: Vec<ToolUse>,
    /// Why the model ended the round. Last write wins.
    pub stop: StopSignal,
}

/// What one round produced.
#[derive(Debug)]
pub struct RoundOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolUse>,
    pub stop: StopSignal,
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            current_tool: None,
            tool_calls: Vec::new(),
            stop: StopSignal::Other("unknown".into()),
        }
    }

    /// Fold one provider signal into the round.
    ///
    /// Text deltas accumulate twice on purpose: `turn_text` is the value
    /// ultimately persisted, while the round-local copy feeds the assistant
    /// content block sent back to the model.
    pub fn apply(&mut self, signal: StreamSignal, turn_text: &mut String) {
        match signal {
            StreamSignal::ToolUseStart { id, name } => {
                if self.current_tool.is_some() {
                    // Provider protocol violation: a new tool-use block opened
                    // before the previous one stopped. Close the prior builder
                    // as if a block-stop had arrived.
                    tracing::warn!(
                        tool = %name,
                        "tool-use block started while another was open; forcing block-stop"
                    );
                    self.close_builder();
                }
                self.current_tool = Some(ToolUseBuilder {
                    id,
                    name,
                    input_buf: String::new(),
                });
            }
            StreamSignal::TextDelta { text } => {
                self.text.push_str(&text);
                turn_text.push_str(&text);
            }
            StreamSignal::InputFragment { text } => {
                if let Some(builder) = self.current_tool.as_mut() {
                    builder.input_buf.push_str(&text);
                }
            }
            StreamSignal::BlockStop => {
                self.close_builder();
            }
            StreamSignal::Stop { signal } => {
                self.stop = signal;
            }
        }
    }

    /// Complete the open tool builder, if any.
    ///
    /// An empty input buffer parses as `{}`. A buffer that is not valid JSON
    /// drops the tool call: it never reaches the completed list and the model
    /// receives no result for it.
    fn close_builder(&mut self) {
        let Some(builder) = self.current_tool.take() else {
            return;
        };

        let input = if builder.input_buf.is_empty() {
            Ok(serde_json::json!({}))
        } else {
            serde_json::from_str(&builder.input_buf)
        };

        match input {
            Ok(input) => self.tool_calls.push(ToolUse {
                id: builder.id,
                name: builder.name,
                input,
            }),
            Err(e) => {
                tracing::warn!(
                    tool = %builder.name,
                    id = %builder.id,
                    error = %e,
                    "tool-use input is not valid JSON; dropping the call"
                );
            }
        }
    }

    pub fn into_outcome(mut self) -> RoundOutcome {
        // A stream that ends mid-block still yields whatever completed.
        self.close_builder();
        RoundOutcome {
            text: self.text,
            tool_calls: self.tool_calls,
            stop: self.stop,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// execute_round
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run exactly one streaming request against the model provider.
///
/// Every text delta is forwarded to the caller as a `chunk` event the moment
/// it arrives. Provider failures propagate to the orchestrator untouched —
/// no recovery happens at this layer.
pub async fn execute_round(
    provider: &dyn ModelProvider,
    req: &TurnRequest,
    sink: &EventSink,
    turn_text: &mut String,
) -> Result<RoundOutcome, TurnError> {
    let mut stream = provider.stream_turn(req).await?;
    let mut round = RoundState::new();

    while let Some(item) = stream.next().await {
        let signal = item?;
        if let StreamSignal::TextDelta { text } = &signal {
            sink.send(WireEvent::Chunk { text: text.clone() })
                .await
                .map_err(|_: SinkClosed| TurnError::Disconnected)?;
        }
        round.apply(signal, turn_text);
    }

    Ok(round.into_outcome())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_start(id: &str, name: &str) -> StreamSignal {
        StreamSignal::ToolUseStart {
            id: id.into(),
            name: name.into(),
        }
    }

    fn fragment(s: &str) -> StreamSignal {
        StreamSignal::InputFragment { text: s.into() }
    }

    #[test]
    fn text_accumulates_in_round_and_turn() {
        let mut round = RoundState::new();
        let mut turn_text = String::from("previous round. ");

        round.apply(StreamSignal::TextDelta { text: "Hel".into() }, &mut turn_text);
        round.apply(StreamSignal::TextDelta { text: "lo".into() }, &mut turn_text);

        assert_eq!(round.text, "Hello");
        assert_eq!(turn_text, "previous round. Hello");
    }

    #[test]
    fn tool_call_assembles_from_fragments() {
        let mut round = RoundState::new();
        let mut t = String::new();

        round.apply(tool_start("tu_1", "get_weather"), &mut t);
        round.apply(fragment("{\"city\":"), &mut t);
        round.apply(fragment("\"Chicago\"}"), &mut t);
        round.apply(StreamSignal::BlockStop, &mut t);

        assert_eq!(round.tool_calls.len(), 1);
        assert_eq!(round.tool_calls[0].name, "get_weather");
        assert_eq!(round.tool_calls[0].input["city"], "Chicago");
    }

    #[test]
    fn empty_input_parses_as_empty_object() {
        let mut round = RoundState::new();
        let mut t = String::new();

        round.apply(tool_start("tu_1", "list_goals"), &mut t);
        round.apply(StreamSignal::BlockStop, &mut t);

        assert_eq!(round.tool_calls.len(), 1);
        assert_eq!(round.tool_calls[0].input, serde_json::json!({}));
    }

    #[test]
    fn malformed_input_drops_the_call() {
        let mut round = RoundState::new();
        let mut t = String::new();

        round.apply(tool_start("tu_1", "get_weather"), &mut t);
        round.apply(fragment("{\"city\": trunc"), &mut t);
        round.apply(StreamSignal::BlockStop, &mut t);

        assert!(round.tool_calls.is_empty());
    }

    #[test]
    fn second_start_forces_close_of_open_builder() {
        let mut round = RoundState::new();
        let mut t = String::new();

        round.apply(tool_start("tu_1", "first"), &mut t);
        round.apply(fragment("{}"), &mut t);
        // No BlockStop — the provider misbehaves and opens another block.
        round.apply(tool_start("tu_2", "second"), &mut t);
        round.apply(StreamSignal::BlockStop, &mut t);

        assert_eq!(round.tool_calls.len(), 2);
        assert_eq!(round.tool_calls[0].id, "tu_1");
        assert_eq!(round.tool_calls[1].id, "tu_2");
    }

    #[test]
    fn fragment_without_open_builder_is_ignored() {
        let mut round = RoundState::new();
        let mut t = String::new();

        round.apply(fragment("{\"stray\":1}"), &mut t);
        round.apply(StreamSignal::BlockStop, &mut t);

        assert!(round.tool_calls.is_empty());
        assert!(round.text.is_empty());
    }

    #[test]
    fn last_stop_signal_wins() {
        let mut round = RoundState::new();
        let mut t = String::new();

        round.apply(
            StreamSignal::Stop {
                signal: StopSignal::ToolUse,
            },
            &mut t,
        );
        round.apply(
            StreamSignal::Stop {
                signal: StopSignal::EndTurn,
            },
            &mut t,
        );

        assert_eq!(round.stop, StopSignal::EndTurn);
    }

    #[test]
    fn outcome_closes_dangling_builder() {
        let mut round = RoundState::new();
        let mut t = String::new();

        round.apply(tool_start("tu_1", "get_weather"), &mut t);
        round.apply(fragment("{\"city\":\"Chicago\"}"), &mut t);
        // Stream ends without a BlockStop.
        let outcome = round.into_outcome();

        assert_eq!(outcome.tool_calls.len(), 1);
    }

    #[test]
    fn default_stop_is_unknown() {
        let outcome = RoundState::new().into_outcome();
        assert_eq!(outcome.stop, StopSignal::Other("unknown".into()));
    }
}
