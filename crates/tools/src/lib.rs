//! Tool sets for Pacekeeper's workflows.
//!
//! Each workflow module declares a closed enum of its tools, builds the
//! per-run registry from it, and publishes the blueprint, system prompt and
//! opening instruction the runner needs. Tools reach persistence only
//! through the traits in [`collaborators`].

pub mod collaborators;
pub mod training_program;
pub mod weekly_report;

use pacekeeper_core::error::ToolError;
use serde::de::DeserializeOwned;

pub use collaborators::{
    Activity, ActivitySource, ArtifactStore, InMemoryActivitySource, InMemoryArtifactStore,
};
pub use training_program::{ProgramDeps, ProgramTool};
pub use weekly_report::{ReportDeps, ReportTool};

/// Deserialize a tool's input into its typed form.
pub(crate) fn parse_input<T: DeserializeOwned>(input: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
