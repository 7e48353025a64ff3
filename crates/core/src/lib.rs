//! # Pacekeeper Core
//!
//! Domain types, traits, and error definitions for the Pacekeeper
//! tool-orchestration engine. This crate has **no runtime dependencies on
//! the engine itself**; it defines the model that the engine, the tool
//! sets and the providers all implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait or a plain value here:
//! - `Provider`: the inference backend, injected per run
//! - `Tool`: one capability, registered per run in a `ToolRegistry`
//! - `ResultStore`: explicit per-run state, passed by reference
//! - `Blueprint`: the static shape of a task's workflow

pub mod blueprint;
pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod outcome;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use blueprint::{Blueprint, CommitRule, GateRule, MetadataFn};
pub use context::{RunId, TaskContext, ToolContext};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{ContentBlock, Message, MessageLog, Role};
pub use outcome::RunOutcome;
pub use provider::{Provider, ProviderRequest, ProviderResponse, StopReason, ToolDefinition, Usage};
pub use store::{GateDecision, ResultStatus, ResultStore, StorageKey, StoredResult};
pub use tool::{Tool, ToolCall, ToolOutput, ToolRegistry};
