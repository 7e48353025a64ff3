//! The typed outcome of a run.

use serde::{Deserialize, Serialize};

/// Produced exactly once per run by the result assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The commit tool durably persisted an artifact.
    Success {
        artifact_id: String,
        #[serde(default)]
        metadata: serde_json::Map<String, serde_json::Value>,
    },

    /// The run deliberately did not produce an artifact.
    Skipped {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blocking_flags: Option<Vec<String>>,
    },

    /// The run tried and did not finish.
    Failed { reason: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short status label for logs ("success", "skipped", "failed").
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    /// The reason carried by a skipped or failed outcome.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Skipped { reason, .. } | Self::Failed { reason } => Some(reason),
        }
    }

    /// True when a gate tool blocked the run.
    pub fn is_gate_block(&self) -> bool {
        matches!(self, Self::Skipped { blocking_flags: Some(_), .. })
    }
}
