use std::pin::Pin;

/// A boxed async stream, used for provider streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Signals emitted while streaming one model round (provider-agnostic).
///
/// Providers flatten their wire events into this alphabet; the round
/// accumulator in the gateway reassembles complete content blocks from it.
/// Blocks arrive strictly one at a time, so no block index is carried.
#[derive(Debug, Clone)]
pub enum StreamSignal {
    /// A tool-use content block has opened. Input fragments follow until
    /// the matching [`StreamSignal::BlockStop`].
    ToolUseStart { id: String, name: String },

    /// Incremental assistant text.
    TextDelta { text: String },

    /// A fragment of the open tool-use block's JSON input string.
    InputFragment { text: String },

    /// The open content block (if any) is complete.
    BlockStop,

    /// The model reported why this round's response ended.
    /// May arrive more than once; last write wins.
    Stop { signal: StopSignal },
}

/// Why the model ended a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopSignal {
    /// Natural end of the response.
    EndTurn,
    /// The model wants its tool calls executed and the results fed back.
    ToolUse,
    /// Anything else the provider reports (max_tokens, refusal, ...).
    Other(String),
}

impl StopSignal {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "end_turn" => StopSignal::EndTurn,
            "tool_use" => StopSignal::ToolUse,
            other => StopSignal::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_from_raw() {
        assert_eq!(StopSignal::from_raw("end_turn"), StopSignal::EndTurn);
        assert_eq!(StopSignal::from_raw("tool_use"), StopSignal::ToolUse);
        assert_eq!(
            StopSignal::from_raw("max_tokens"),
            StopSignal::Other("max_tokens".into())
        );
    }
}
