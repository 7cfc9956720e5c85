//! Tiller gateway — the HTTP server and turn orchestrator.

pub mod api;
pub mod bootstrap;
pub mod runtime;
pub mod state;
