//! Tool execution coordinator.
//!
//! Executes one batch of invocations requested by the model:
//!
//! 1. Group invocations by tool name, in order of first appearance
//! 2. Run a group of a parallel tool concurrently, everything else in order
//! 3. Short-circuit guarded tools once the gate has said "do not proceed"
//! 4. Record every settled invocation in the result store
//! 5. Return result blocks in the order the model requested them

use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use pacekeeper_core::blueprint::Blueprint;
use pacekeeper_core::context::{RunId, TaskContext, ToolContext};
use pacekeeper_core::event::{DomainEvent, EventBus};
use pacekeeper_core::message::ContentBlock;
use pacekeeper_core::store::{ResultStatus, ResultStore, StorageKey, StoredResult};
use pacekeeper_core::tool::{Tool, ToolCall, ToolRegistry};
use tracing::{debug, info, warn};

/// Executes tool invocations for one run.
pub struct ToolCoordinator<'a> {
    registry: &'a ToolRegistry,
    blueprint: &'a Blueprint,
    run_id: &'a RunId,
    task: &'a TaskContext,
    events: &'a EventBus,
}

impl<'a> ToolCoordinator<'a> {
    pub fn new(
        registry: &'a ToolRegistry,
        blueprint: &'a Blueprint,
        run_id: &'a RunId,
        task: &'a TaskContext,
        events: &'a EventBus,
    ) -> Self {
        Self {
            registry,
            blueprint,
            run_id,
            task,
            events,
        }
    }

    /// Execute a batch and return one result block per invocation.
    pub async fn execute(&self, calls: Vec<ToolCall>, store: &mut ResultStore) -> Vec<ContentBlock> {
        let mut blocks: Vec<Option<ContentBlock>> = vec![None; calls.len()];

        for (name, indices) in group_by_tool(&calls) {
            let Some(tool) = self.registry.get(name) else {
                for &i in &indices {
                    let result = self.unknown_tool(&calls[i]);
                    blocks[i] = Some(to_block(&result));
                    store.record(result);
                }
                continue;
            };

            if indices.len() > 1 && self.blueprint.is_parallel(name) {
                for (i, result) in self.run_parallel(tool, &calls, &indices, store).await {
                    blocks[i] = Some(to_block(&result));
                    store.record(result);
                }
            } else {
                for &i in &indices {
                    let result = match self.blocked_by_gate(name, store) {
                        Some(reason) => self.blocked(tool, &calls[i], &reason),
                        None => self.run_one(tool, &calls[i], store, false).await,
                    };
                    blocks[i] = Some(to_block(&result));
                    store.record(result);
                }
            }
        }

        blocks.into_iter().flatten().collect()
    }

    /// Run every invocation of one parallel tool and wait for all of them.
    ///
    /// The store is only read while the batch runs; callers write the
    /// results once every member has settled.
    async fn run_parallel(
        &self,
        tool: &dyn Tool,
        calls: &[ToolCall],
        indices: &[usize],
        store: &ResultStore,
    ) -> Vec<(usize, StoredResult)> {
        if let Some(reason) = self.blocked_by_gate(tool.name(), store) {
            return indices
                .iter()
                .map(|&i| (i, self.blocked(tool, &calls[i], &reason)))
                .collect();
        }

        debug!(run_id = %self.run_id, tool = tool.name(), size = indices.len(), "Running parallel batch");
        let settled = join_all(indices.iter().map(|&i| self.run_one(tool, &calls[i], store, true))).await;
        indices.iter().copied().zip(settled).collect()
    }

    /// The gate's blocking reason if `tool` is guarded and the gate said no.
    fn blocked_by_gate(&self, tool: &str, store: &ResultStore) -> Option<String> {
        let gate = self.blueprint.gate.as_ref()?;
        if !gate.guards(tool) {
            return None;
        }
        let decision = store.gate_decision(&gate.tool)?;
        decision.is_blocked().then(|| {
            decision
                .reason
                .unwrap_or_else(|| format!("{} decided not to proceed", gate.tool))
        })
    }

    async fn run_one(&self, tool: &dyn Tool, call: &ToolCall, store: &ResultStore, parallel: bool) -> StoredResult {
        let key = tool.storage_key(&call.input);
        self.events.publish(DomainEvent::ToolDispatched {
            run_id: self.run_id.to_string(),
            tool_name: call.name.clone(),
            storage_key: key.to_string(),
            parallel,
            timestamp: Utc::now(),
        });

        let ctx = ToolContext {
            run_id: self.run_id,
            task: self.task,
            results: store,
        };
        let start = Instant::now();
        let outcome = tool.execute(call.input.clone(), &ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (status, content, data) = match outcome {
            Ok(output) => {
                debug!(run_id = %self.run_id, tool = %call.name, storage_key = %key, duration_ms, "Tool succeeded");
                (ResultStatus::Success, output.content, output.data)
            }
            Err(e) => {
                warn!(run_id = %self.run_id, tool = %call.name, storage_key = %key, error = %e, "Tool execution failed");
                (ResultStatus::Error, format!("Error: {e}"), serde_json::Value::Null)
            }
        };

        self.events.publish(DomainEvent::ToolCompleted {
            run_id: self.run_id.to_string(),
            tool_name: call.name.clone(),
            storage_key: key.to_string(),
            success: status == ResultStatus::Success,
            duration_ms,
            timestamp: Utc::now(),
        });

        StoredResult {
            key,
            invocation_id: call.id.clone(),
            input: call.input.clone(),
            status,
            content,
            data,
            recorded_at: Utc::now(),
        }
    }

    fn blocked(&self, tool: &dyn Tool, call: &ToolCall, reason: &str) -> StoredResult {
        let key = tool.storage_key(&call.input);
        info!(run_id = %self.run_id, tool = %call.name, storage_key = %key, reason, "Blocked by gate");
        self.events.publish(DomainEvent::BlockingTriggered {
            run_id: self.run_id.to_string(),
            tool_name: call.name.clone(),
            storage_key: key.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        StoredResult {
            key,
            invocation_id: call.id.clone(),
            input: call.input.clone(),
            status: ResultStatus::Error,
            content: format!(
                "Blocked: {} was not executed because the validation gate decided not to proceed ({reason}). \
                 Do not call downstream tools; explain why the task cannot be completed.",
                call.name
            ),
            data: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    fn unknown_tool(&self, call: &ToolCall) -> StoredResult {
        warn!(run_id = %self.run_id, tool = %call.name, "Model requested an unknown tool");
        StoredResult {
            key: StorageKey::for_tool(&call.name),
            invocation_id: call.id.clone(),
            input: call.input.clone(),
            status: ResultStatus::Error,
            content: format!(
                "Error: unknown tool '{}'. Available tools: {}",
                call.name,
                self.registry.names().join(", ")
            ),
            data: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }
}

/// Group call indices by tool name, in order of first appearance.
fn group_by_tool(calls: &[ToolCall]) -> Vec<(&str, Vec<usize>)> {
    let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
    for (i, call) in calls.iter().enumerate() {
        match groups.iter_mut().find(|(name, _)| *name == call.name) {
            Some((_, indices)) => indices.push(i),
            None => groups.push((&call.name, vec![i])),
        }
    }
    groups
}

fn to_block(result: &StoredResult) -> ContentBlock {
    ContentBlock::tool_result(&result.invocation_id, &result.content, !result.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::CountingTool;
    use pacekeeper_core::error::ToolError;
    use pacekeeper_core::store::GateDecision;
    use std::sync::atomic::Ordering;

    fn call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    fn blueprint() -> Blueprint {
        Blueprint::new("demo", "save", "id")
            .with_gate("gate", vec!["work".into(), "save".into()])
            .with_parallel(vec!["work".into()])
            .with_steps(vec!["gate".into(), "work".into(), "save".into()])
    }

    fn result_ids(blocks: &[ContentBlock]) -> Vec<(&str, bool)> {
        blocks
            .iter()
            .map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, is_error, .. } => (tool_use_id.as_str(), *is_error),
                other => panic!("unexpected block {other:?}"),
            })
            .collect()
    }

    #[test]
    fn grouping_keeps_first_appearance_order() {
        let calls = vec![
            call("1", "b", serde_json::json!({})),
            call("2", "a", serde_json::json!({})),
            call("3", "b", serde_json::json!({})),
        ];
        let groups = group_by_tool(&calls);
        assert_eq!(groups, vec![("b", vec![0, 2]), ("a", vec![1])]);
    }

    #[tokio::test]
    async fn gate_block_in_same_batch_stops_downstream() {
        let gate = CountingTool::gate("gate", GateDecision::block("insufficient_data", vec!["too_few_activities".into()]));
        let save = CountingTool::new("save", serde_json::json!({"id": "X"}));
        let save_calls = save.counter();

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(gate));
        registry.register(Box::new(save));
        registry.register(Box::new(CountingTool::new("work", serde_json::json!({}))));

        let bp = blueprint();
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        let blocks = coordinator
            .execute(
                vec![call("g", "gate", serde_json::json!({})), call("s", "save", serde_json::json!({}))],
                &mut store,
            )
            .await;

        assert_eq!(result_ids(&blocks), vec![("g", false), ("s", true)]);
        assert_eq!(save_calls.load(Ordering::SeqCst), 0);
        assert!(!store.has_success("save"));
        assert!(store.get(&StorageKey::for_tool("save")).is_some());
    }

    #[tokio::test]
    async fn failed_rerun_keeps_the_earlier_success() {
        let work = CountingTool::new("work", serde_json::json!({"total_weeks": 12})).failing_after(
            1,
            ToolError::ExecutionFailed {
                tool_name: "work".into(),
                reason: "planner unavailable".into(),
            },
        );

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool::gate("gate", GateDecision::proceed(vec![]))));
        registry.register(Box::new(work));
        registry.register(Box::new(CountingTool::new("save", serde_json::json!({"id": "X"}))));

        let bp = blueprint();
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        coordinator
            .execute(vec![call("g", "gate", serde_json::json!({})), call("w1", "work", serde_json::json!({}))], &mut store)
            .await;
        let blocks = coordinator.execute(vec![call("w2", "work", serde_json::json!({}))], &mut store).await;

        // The model still sees the failure.
        assert_eq!(result_ids(&blocks), vec![("w2", true)]);
        let kept = store.success("work").unwrap();
        assert_eq!(kept.invocation_id, "w1");
        assert_eq!(kept.data["total_weeks"], 12);
        assert_eq!(store.shadowed().len(), 1);
        assert_eq!(store.shadowed()[0].invocation_id, "w2");
    }

    #[tokio::test]
    async fn failed_gate_rerun_does_not_lift_the_block() {
        let gate = CountingTool::gate("gate", GateDecision::block("insufficient_data", vec![])).failing_after(
            1,
            ToolError::Collaborator("activity source unavailable".into()),
        );
        let save = CountingTool::new("save", serde_json::json!({"id": "X"}));
        let save_calls = save.counter();

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(gate));
        registry.register(Box::new(save));
        registry.register(Box::new(CountingTool::new("work", serde_json::json!({}))));

        let bp = blueprint();
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        coordinator.execute(vec![call("g1", "gate", serde_json::json!({}))], &mut store).await;
        let blocks = coordinator
            .execute(
                vec![call("g2", "gate", serde_json::json!({})), call("s", "save", serde_json::json!({}))],
                &mut store,
            )
            .await;

        assert_eq!(result_ids(&blocks), vec![("g2", true), ("s", true)]);
        assert_eq!(save_calls.load(Ordering::SeqCst), 0);
        assert!(store.gate_decision("gate").unwrap().is_blocked());
    }

    #[tokio::test]
    async fn blocking_is_absolute_for_parallel_batches() {
        let work = CountingTool::new("work", serde_json::json!({})).targeted("phase_id");
        let work_calls = work.counter();

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool::gate("gate", GateDecision::block("insufficient_lead_time", vec![]))));
        registry.register(Box::new(work));
        registry.register(Box::new(CountingTool::new("save", serde_json::json!({}))));

        let bp = blueprint();
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let mut rx = events.subscribe();
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        coordinator.execute(vec![call("g", "gate", serde_json::json!({}))], &mut store).await;
        let blocks = coordinator
            .execute(
                vec![
                    call("w1", "work", serde_json::json!({"phase_id": "phase-1"})),
                    call("w2", "work", serde_json::json!({"phase_id": "phase-2"})),
                ],
                &mut store,
            )
            .await;

        assert_eq!(result_ids(&blocks), vec![("w1", true), ("w2", true)]);
        assert_eq!(work_calls.load(Ordering::SeqCst), 0);

        let mut blocking_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), DomainEvent::BlockingTriggered { .. }) {
                blocking_events += 1;
            }
        }
        assert_eq!(blocking_events, 2);
    }

    #[tokio::test]
    async fn parallel_batch_records_every_result() {
        let work = CountingTool::new("work", serde_json::json!({"sessions": 3})).targeted("phase_id");
        let work_calls = work.counter();

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool::gate("gate", GateDecision::proceed(vec![]))));
        registry.register(Box::new(work));
        registry.register(Box::new(CountingTool::new("save", serde_json::json!({}))));

        let bp = blueprint();
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        let calls: Vec<ToolCall> = (1..=4)
            .map(|n| call(&format!("w{n}"), "work", serde_json::json!({"phase_id": format!("phase-{n}")})))
            .collect();
        let blocks = coordinator.execute(calls, &mut store).await;

        assert_eq!(blocks.len(), 4);
        assert_eq!(work_calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.for_tool("work").filter(|r| r.is_success()).count(), 4);
        assert_eq!(
            store.get(&StorageKey::new("work", Some("phase-3".into()))).unwrap().invocation_id,
            "w3"
        );
        assert_eq!(result_ids(&blocks)[0], ("w1", false));
        assert_eq!(result_ids(&blocks)[3], ("w4", false));
    }

    #[tokio::test]
    async fn results_follow_request_order_across_groups() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool::new("a", serde_json::json!({}))));
        registry.register(Box::new(CountingTool::new("b", serde_json::json!({})).targeted("k")));

        let bp = Blueprint::new("demo", "a", "id");
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        let blocks = coordinator
            .execute(
                vec![
                    call("1", "b", serde_json::json!({"k": "x"})),
                    call("2", "a", serde_json::json!({})),
                    call("3", "b", serde_json::json!({"k": "y"})),
                ],
                &mut store,
            )
            .await;
        let ids: Vec<&str> = result_ids(&blocks).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool::new("save", serde_json::json!({}))));
        let bp = Blueprint::new("demo", "save", "id");
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        let blocks = coordinator
            .execute(vec![call("1", "sav", serde_json::json!({}))], &mut store)
            .await;
        match &blocks[0] {
            ContentBlock::ToolResult { content, is_error, .. } => {
                assert!(is_error);
                assert!(content.contains("unknown tool 'sav'"));
                assert!(content.contains("save"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_error_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool::failing(
            "save",
            ToolError::MissingUpstream {
                upstream: "plan".into(),
                detail: "no plan stored".into(),
            },
        )));
        let bp = Blueprint::new("demo", "save", "id");
        let (run_id, task, events) = (RunId::new(), TaskContext::new(), EventBus::default());
        let coordinator = ToolCoordinator::new(&registry, &bp, &run_id, &task, &events);

        let mut store = ResultStore::new();
        let blocks = coordinator
            .execute(vec![call("1", "save", serde_json::json!({}))], &mut store)
            .await;
        assert_eq!(result_ids(&blocks), vec![("1", true)]);
        let stored = store.get(&StorageKey::for_tool("save")).unwrap();
        assert!(stored.content.contains("Missing upstream output from plan"));
    }
}
