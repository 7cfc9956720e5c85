//! Shared types for the Tiller gateway: messages and content blocks,
//! provider stream signals, configuration, and the common error type.

pub mod config;
pub mod error;
pub mod message;
pub mod stream;
pub mod tool;
