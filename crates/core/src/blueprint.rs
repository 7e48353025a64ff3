//! Task blueprints: the static shape of a multi-step workflow.
//!
//! A blueprint names the gate, the commit step, the tools that may run in
//! parallel, and the canonical step order. The coordinator, assembler and
//! retry supervisor read it; tools never do.

use crate::error::{Error, Result};
use crate::store::ResultStore;
use crate::tool::ToolRegistry;

/// Aggregates success metadata from the store. Must be pure.
pub type MetadataFn = fn(&ResultStore) -> serde_json::Map<String, serde_json::Value>;

/// A gate tool and the downstream tools it guards.
#[derive(Debug, Clone)]
pub struct GateRule {
    pub tool: String,
    pub guarded: Vec<String>,
}

impl GateRule {
    pub fn guards(&self, tool: &str) -> bool {
        self.guarded.iter().any(|t| t == tool)
    }
}

/// The terminal step that persists the task's artifact.
#[derive(Debug, Clone)]
pub struct CommitRule {
    pub tool: String,
    /// Field of the commit tool's structured output holding the artifact id
    pub artifact_field: String,
}

#[derive(Debug, Clone)]
pub struct Blueprint {
    pub name: String,
    pub gate: Option<GateRule>,
    pub commit: CommitRule,
    /// Tools whose invocations in one batch run concurrently
    pub parallel: Vec<String>,
    /// Canonical step order
    pub steps: Vec<String>,
    /// Fewer successful results than this makes a failed run retryable
    pub min_successful_tools: usize,
    pub metadata: MetadataFn,
}

fn no_metadata(_: &ResultStore) -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::new()
}

impl Blueprint {
    /// A blueprint with only a commit step.
    pub fn new(name: impl Into<String>, commit_tool: impl Into<String>, artifact_field: impl Into<String>) -> Self {
        let commit_tool = commit_tool.into();
        Self {
            name: name.into(),
            gate: None,
            steps: vec![commit_tool.clone()],
            commit: CommitRule {
                tool: commit_tool,
                artifact_field: artifact_field.into(),
            },
            parallel: Vec::new(),
            min_successful_tools: 1,
            metadata: no_metadata,
        }
    }

    pub fn with_gate(mut self, tool: impl Into<String>, guarded: Vec<String>) -> Self {
        self.gate = Some(GateRule {
            tool: tool.into(),
            guarded,
        });
        self
    }

    pub fn with_parallel(mut self, tools: Vec<String>) -> Self {
        self.parallel = tools;
        self
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_min_successful_tools(mut self, min: usize) -> Self {
        self.min_successful_tools = min;
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataFn) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_parallel(&self, tool: &str) -> bool {
        self.parallel.iter().any(|t| t == tool)
    }

    /// Check that every tool the blueprint names is registered.
    pub fn validate(&self, registry: &ToolRegistry) -> Result<()> {
        let mut named: Vec<&str> = vec![self.commit.tool.as_str()];
        if let Some(gate) = &self.gate {
            named.push(&gate.tool);
            named.extend(gate.guarded.iter().map(String::as_str));
        }
        named.extend(self.parallel.iter().map(String::as_str));
        named.extend(self.steps.iter().map(String::as_str));

        let missing: Vec<&str> = named.into_iter().filter(|n| !registry.contains(n)).collect();
        if !missing.is_empty() {
            return Err(Error::Config {
                message: format!(
                    "blueprint '{}' names unregistered tools: {}",
                    self.name,
                    missing.join(", ")
                ),
            });
        }

        if !self.steps.contains(&self.commit.tool) {
            return Err(Error::Config {
                message: format!("blueprint '{}' steps must include the commit tool", self.name),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ToolContext;
    use crate::error::ToolError;
    use crate::tool::{Tool, ToolOutput};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str { self.0 }
        fn description(&self) -> &str { "test" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(&self, _input: serde_json::Value, _ctx: &ToolContext<'_>) -> std::result::Result<ToolOutput, ToolError> {
            Ok(ToolOutput::new("ok", serde_json::Value::Null))
        }
    }

    fn registry(names: &[&'static str]) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        for n in names {
            reg.register(Box::new(Named(n)));
        }
        reg
    }

    fn blueprint() -> Blueprint {
        Blueprint::new("demo", "save", "id")
            .with_gate("gate", vec!["work".into(), "save".into()])
            .with_parallel(vec!["work".into()])
            .with_steps(vec!["gate".into(), "work".into(), "save".into()])
    }

    #[test]
    fn validate_accepts_complete_registry() {
        blueprint().validate(&registry(&["gate", "work", "save"])).unwrap();
    }

    #[test]
    fn validate_reports_typos() {
        let err = blueprint().validate(&registry(&["gate", "wrok", "save"])).unwrap_err();
        assert!(err.to_string().contains("work"));
    }

    #[test]
    fn gate_rule_guards() {
        let bp = blueprint();
        let gate = bp.gate.as_ref().unwrap();
        assert!(gate.guards("save"));
        assert!(!gate.guards("gate"));
        assert!(bp.is_parallel("work"));
        assert!((bp.metadata)(&ResultStore::new()).is_empty());
    }
}
