//! Run identity and the task context handed to every tool.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ToolError;
use crate::store::ResultStore;

/// Unique identifier for one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Already-resolved, task-specific data assembled by the caller before a
/// run starts (profile, identifiers, date ranges).
///
/// The engine never looks inside; tools read what they need through
/// [`TaskContext::get`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskContext {
    values: serde_json::Map<String, serde_json::Value>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        match value {
            serde_json::Value::Object(values) => Ok(Self { values }),
            other => Err(crate::Error::Config {
                message: format!("task context must be a JSON object, got {other}"),
            }),
        }
    }

    /// Insert a value under `key`, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> crate::Result<Self> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Deserialize the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ToolError> {
        let raw = self
            .values
            .get(key)
            .ok_or_else(|| ToolError::MissingContext(key.to_string()))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| ToolError::InvalidArguments(format!("context value '{key}': {e}")))
    }

    pub fn raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Everything a tool sees besides its own input.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    pub run_id: &'a RunId,
    pub task: &'a TaskContext,
    /// Results stored so far in this run (read-only).
    pub results: &'a ResultStore,
}
