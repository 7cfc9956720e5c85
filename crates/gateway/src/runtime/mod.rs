//! Core runtime — the orchestrator that ties history loading, attachment
//! preprocessing, model streaming, tool dispatch, and persistence into one
//! deterministic loop.
//!
//! Entry point: [`run_turn`] takes a conversation + user message and returns
//! a channel of [`events::WireEvent`]s for NDJSON streaming.

pub mod attachments;
pub mod events;
pub mod round;
pub mod tools;
pub mod turn;

pub use events::{EventSink, WireEvent};
pub use turn::{run_turn, TurnInput};
