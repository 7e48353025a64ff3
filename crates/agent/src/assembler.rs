//! Result assembly: turns a run's stored results into its outcome.

use pacekeeper_core::blueprint::Blueprint;
use pacekeeper_core::outcome::RunOutcome;
use pacekeeper_core::store::ResultStore;

/// Classifies a finished run. Reads only the store snapshot and the final
/// text, so assembling twice gives the same outcome.
pub struct ResultAssembler<'a> {
    blueprint: &'a Blueprint,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(blueprint: &'a Blueprint) -> Self {
        Self { blueprint }
    }

    pub fn assemble(&self, store: &ResultStore, final_text: &str) -> RunOutcome {
        if let Some(artifact_id) = self.artifact_id(store) {
            return RunOutcome::Success {
                artifact_id,
                metadata: (self.blueprint.metadata)(store),
            };
        }

        if let Some(gate) = &self.blueprint.gate
            && let Some(decision) = store.gate_decision(&gate.tool)
            && decision.is_blocked()
        {
            return RunOutcome::Skipped {
                reason: decision
                    .reason
                    .unwrap_or_else(|| format!("{} decided not to proceed", gate.tool)),
                blocking_flags: Some(decision.flags),
            };
        }

        let text = final_text.trim();
        if store.is_empty() {
            return RunOutcome::Skipped {
                reason: if text.is_empty() {
                    "model finished without invoking any tool".into()
                } else {
                    text.to_string()
                },
                blocking_flags: None,
            };
        }

        RunOutcome::Failed {
            reason: if text.is_empty() {
                format!("run ended before {} completed", self.blueprint.commit.tool)
            } else {
                text.to_string()
            },
        }
    }

    /// The artifact id from a successful commit, if there is one.
    fn artifact_id(&self, store: &ResultStore) -> Option<String> {
        let commit = &self.blueprint.commit;
        let result = store.for_tool(&commit.tool).find(|r| r.is_success())?;
        match &result.data[commit.artifact_field.as_str()] {
            serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
