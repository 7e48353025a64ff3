//! Inference backend implementations for Pacekeeper.
//!
//! All providers implement the `pacekeeper_core::Provider` trait and are
//! injected into a run by the caller.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
