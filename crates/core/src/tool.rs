//! Tool trait: the abstraction over the capabilities a run can use.
//!
//! Each task registers its own closed set of tools for the duration of a
//! run. The coordinator resolves the model's invocations against that
//! registry and never guesses at names it does not know.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::context::ToolContext;
use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::store::StorageKey;

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Input payload as a JSON value
    pub input: serde_json::Value,
}

/// What a tool hands back on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text returned to the model
    pub content: String,

    /// Structured data kept in the result store
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            content: content.into(),
            data,
        }
    }

    /// Use the structured data itself as the model-facing text.
    pub fn json(data: serde_json::Value) -> Self {
        let content = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
        Self { content, data }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "compute_week_metrics").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// The logical target an invocation works on, if the tool can run
    /// several times per run against different targets.
    fn storage_target(&self, _input: &serde_json::Value) -> Option<String> {
        None
    }

    /// Execute the tool with the given input.
    async fn execute(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Storage key for an invocation with this input.
    fn storage_key(&self, input: &serde_json::Value) -> StorageKey {
        StorageKey::new(self.name(), self.storage_target(input))
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The tools registered for one run.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions, sorted by name so requests are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
