//! The per-run result store.
//!
//! Maps a [`StorageKey`] to the most recent result recorded under it. Keys
//! are a pure function of the tool name and an optional logical target
//! (e.g. a phase id), so parallel invocations of one tool against
//! different targets never share an entry.
//!
//! A stored success is never replaced by a later error under the same key;
//! the error is kept beside it in the failed-attempt log instead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key under which a tool result is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageKey {
    tool: String,
    target: Option<String>,
}

impl StorageKey {
    pub fn new(tool: impl Into<String>, target: Option<String>) -> Self {
        Self {
            tool: tool.into(),
            target,
        }
    }

    /// Key for a tool that has a single logical target per run.
    pub fn for_tool(tool: impl Into<String>) -> Self {
        Self::new(tool, None)
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{}", self.tool, target),
            None => write!(f, "{}", self.tool),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
}

/// One recorded tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub key: StorageKey,

    /// Invocation id the model assigned to the call
    pub invocation_id: String,

    /// The input the tool was invoked with
    pub input: serde_json::Value,

    pub status: ResultStatus,

    /// Text returned to the model
    pub content: String,

    /// Structured output (null for errors and blocked calls)
    #[serde(default)]
    pub data: serde_json::Value,

    pub recorded_at: DateTime<Utc>,
}

impl StoredResult {
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// Decision published by a gate tool in its structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub proceed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default)]
    pub flags: Vec<String>,
}

impl GateDecision {
    pub fn proceed(flags: Vec<String>) -> Self {
        Self {
            proceed: true,
            reason: None,
            flags,
        }
    }

    pub fn block(reason: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            proceed: false,
            reason: Some(reason.into()),
            flags,
        }
    }

    pub fn is_blocked(&self) -> bool {
        !self.proceed
    }
}

/// Results recorded during one run.
///
/// Iteration order is the key order, so anything derived from a snapshot
/// is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultStore {
    entries: BTreeMap<StorageKey, StoredResult>,

    /// Errors that arrived after a success under the same key
    #[serde(default)]
    shadowed: Vec<StoredResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result under its key, returning the one it replaced.
    ///
    /// An error recorded over a success leaves the success in place and
    /// lands in [`ResultStore::shadowed`].
    pub fn record(&mut self, result: StoredResult) -> Option<StoredResult> {
        if !result.is_success() && self.get(&result.key).is_some_and(StoredResult::is_success) {
            self.shadowed.push(result);
            return None;
        }
        self.entries.insert(result.key.clone(), result)
    }

    /// Errors kept beside an earlier success for the same key.
    pub fn shadowed(&self) -> &[StoredResult] {
        &self.shadowed
    }

    /// Every error result recorded this run, current or shadowed.
    pub fn errors(&self) -> impl Iterator<Item = &StoredResult> {
        self.entries
            .values()
            .filter(|r| !r.is_success())
            .chain(self.shadowed.iter())
    }

    pub fn get(&self, key: &StorageKey) -> Option<&StoredResult> {
        self.entries.get(key)
    }

    /// The successful result stored for a single-target tool.
    pub fn success(&self, tool: &str) -> Option<&StoredResult> {
        self.get(&StorageKey::for_tool(tool))
            .filter(|r| r.is_success())
    }

    /// All entries recorded for `tool`, across targets.
    pub fn for_tool<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a StoredResult> + 'a {
        self.entries.values().filter(move |r| r.key.tool() == tool)
    }

    pub fn has_success(&self, tool: &str) -> bool {
        self.for_tool(tool).any(StoredResult::is_success)
    }

    pub fn successful_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_success()).count()
    }

    /// The gate's decision, if the gate tool ran successfully.
    pub fn gate_decision(&self, gate_tool: &str) -> Option<GateDecision> {
        self.success(gate_tool)
            .and_then(|r| serde_json::from_value(r.data.clone()).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredResult> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Only the retry supervisor does this, before its
    /// single retry run.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.shadowed.clear();
    }
}
