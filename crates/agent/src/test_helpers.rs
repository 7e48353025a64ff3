//! Shared test helpers for engine tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pacekeeper_core::context::ToolContext;
use pacekeeper_core::error::{ProviderError, ToolError};
use pacekeeper_core::message::{ContentBlock, Message};
use pacekeeper_core::provider::{Provider, ProviderRequest, ProviderResponse, StopReason, Usage};
use pacekeeper_core::store::GateDecision;
use pacekeeper_core::tool::{Tool, ToolOutput};
use std::sync::Arc;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses
/// provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let call = requests.len();

        if call >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                call,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[call].clone())
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    make_stopped_response(text, StopReason::EndTurn)
}

/// A text response that ended for the given reason.
pub fn make_stopped_response(text: &str, stop_reason: StopReason) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        stop_reason,
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<ContentBlock>, thought: &str) -> ProviderResponse {
    let mut blocks = Vec::new();
    if !thought.is_empty() {
        blocks.push(ContentBlock::text(thought));
    }
    blocks.extend(tool_calls);
    ProviderResponse {
        message: Message::assistant_blocks(blocks),
        stop_reason: StopReason::ToolUse,
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool-use block.
pub fn make_tool_call(id: &str, name: &str, input: serde_json::Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

/// A tool stub that counts its executions.
pub struct CountingTool {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    output: serde_json::Value,
    fail_with: Option<ToolError>,
    /// Calls before `fail_with` starts applying
    fail_from: usize,
    target_field: Option<&'static str>,
}

impl CountingTool {
    pub fn new(name: &'static str, output: serde_json::Value) -> Self {
        Self {
            name,
            calls: Arc::new(AtomicUsize::new(0)),
            output,
            fail_with: None,
            fail_from: 0,
            target_field: None,
        }
    }

    /// A gate stub publishing the given decision.
    pub fn gate(name: &'static str, decision: GateDecision) -> Self {
        Self::new(name, serde_json::to_value(decision).unwrap())
    }

    pub fn failing(name: &'static str, error: ToolError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new(name, serde_json::Value::Null)
        }
    }

    /// Succeed on the first `successes` calls, then fail with `error`.
    pub fn failing_after(mut self, successes: usize, error: ToolError) -> Self {
        self.fail_with = Some(error);
        self.fail_from = successes;
        self
    }

    /// Key invocations by this input field.
    pub fn targeted(mut self, field: &'static str) -> Self {
        self.target_field = Some(field);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "counting stub"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn storage_target(&self, input: &serde_json::Value) -> Option<String> {
        self.target_field
            .and_then(|f| input[f].as_str())
            .map(String::from)
    }

    async fn execute(&self, input: serde_json::Value, _ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(err) = &self.fail_with
            && previous >= self.fail_from
        {
            return Err(err.clone());
        }
        let mut data = self.output.clone();
        if let Some(field) = self.target_field
            && let Some(obj) = data.as_object_mut()
        {
            obj.insert(field.to_string(), input[field].clone());
        }
        Ok(ToolOutput::json(data))
    }
}
