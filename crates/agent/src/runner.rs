//! The task runner: one run of one task, end to end.
//!
//! Validates the blueprint, runs the conversation loop, assembles the
//! outcome, and spends at most one retry when the outcome earns it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pacekeeper_core::blueprint::Blueprint;
use pacekeeper_core::context::{RunId, TaskContext};
use pacekeeper_core::error::{Error, Result};
use pacekeeper_core::event::{DomainEvent, EventBus};
use pacekeeper_core::outcome::RunOutcome;
use pacekeeper_core::provider::Provider;
use pacekeeper_core::store::ResultStore;
use pacekeeper_core::tool::ToolRegistry;
use serde::Serialize;
use tracing::{info, warn};

use crate::assembler::ResultAssembler;
use crate::coordinator::ToolCoordinator;
use crate::gateway::ModelGateway;
use crate::loop_runner::{ConversationLoop, DEFAULT_MAX_ITERATIONS};
use crate::retry::{build_directive, retry_trigger};

/// Model and loop settings for a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_iterations: u32,
    pub request_timeout: Duration,
    pub retry_enabled: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            temperature: 0.2,
            max_tokens: Some(4096),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout: Duration::from_secs(120),
            retry_enabled: true,
        }
    }
}

/// Everything one task brings to a run.
pub struct Task {
    pub blueprint: Blueprint,
    pub tools: ToolRegistry,
    pub context: TaskContext,
    pub system_prompt: String,
    pub instruction: String,
}

/// The auditable result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub workflow: String,
    pub outcome: RunOutcome,
    /// 1, or 2 when the retry ran
    pub attempts: u32,
    /// Model calls across all attempts
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_trigger: Option<String>,
}

/// Runs tasks against an injected provider.
pub struct TaskRunner {
    provider: Arc<dyn Provider>,
    settings: RunSettings,
    events: Arc<EventBus>,
}

/// One attempt's result, before the retry decision.
struct Attempt {
    outcome: RunOutcome,
    final_text: String,
    iterations: u32,
    /// The loop returned an error instead of an output
    aborted: bool,
}

impl TaskRunner {
    pub fn new(provider: Arc<dyn Provider>, settings: RunSettings, events: Arc<EventBus>) -> Self {
        Self {
            provider,
            settings,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Run a task to its outcome.
    ///
    /// Only an invalid blueprint is an `Err`; gateway failures end as
    /// `Failed` outcomes.
    pub async fn run(&self, task: Task) -> Result<RunReport> {
        task.blueprint.validate(&task.tools)?;
        if self.settings.max_iterations == 0 {
            return Err(Error::Config {
                message: "max_iterations must be at least 1".into(),
            });
        }

        let run_id = RunId::new();
        let workflow = task.blueprint.name.clone();
        info!(run_id = %run_id, workflow = %workflow, tools = task.tools.len(), "Run started");

        let gateway = ModelGateway::new(self.provider.clone(), &self.settings.model)
            .with_temperature(self.settings.temperature)
            .with_timeout(self.settings.request_timeout);
        let gateway = match self.settings.max_tokens {
            Some(max) => gateway.with_max_tokens(max),
            None => gateway,
        };

        let mut store = ResultStore::new();
        let first = self.attempt(&task, &run_id, &gateway, &task.instruction, 1, &mut store).await;
        let mut report = RunReport {
            run_id: run_id.to_string(),
            workflow: workflow.clone(),
            outcome: first.outcome.clone(),
            attempts: 1,
            iterations: first.iterations,
            retry_trigger: None,
        };

        let trigger = if self.settings.retry_enabled && !first.aborted {
            retry_trigger(&first.outcome, &store, &first.final_text, &task.blueprint)
        } else {
            None
        };

        if let Some(trigger) = trigger {
            info!(run_id = %run_id, workflow = %workflow, trigger = %trigger, "Retrying once with a directive");
            self.events.publish(DomainEvent::RetryTriggered {
                run_id: run_id.to_string(),
                trigger: trigger.to_string(),
                timestamp: Utc::now(),
            });

            let directive = build_directive(&task.blueprint, &store, &trigger);
            store.clear();
            let instruction = format!("{}\n\n{}", task.instruction, directive);
            let second = self.attempt(&task, &run_id, &gateway, &instruction, 2, &mut store).await;

            report.attempts = 2;
            report.iterations += second.iterations;
            report.retry_trigger = Some(trigger.to_string());
            if second.outcome.is_success() {
                report.outcome = second.outcome;
            } else {
                info!(run_id = %run_id, status = second.outcome.status(), "Retry did not succeed, keeping first outcome");
            }
        }

        info!(
            run_id = %run_id,
            workflow = %workflow,
            status = report.outcome.status(),
            attempts = report.attempts,
            iterations = report.iterations,
            "Run finished"
        );
        self.events.publish(DomainEvent::RunFinished {
            run_id: run_id.to_string(),
            status: report.outcome.status().to_string(),
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    async fn attempt(
        &self,
        task: &Task,
        run_id: &RunId,
        gateway: &ModelGateway,
        instruction: &str,
        attempt: u32,
        store: &mut ResultStore,
    ) -> Attempt {
        self.events.publish(DomainEvent::RunStarted {
            run_id: run_id.to_string(),
            workflow: task.blueprint.name.clone(),
            attempt,
            timestamp: Utc::now(),
        });

        let coordinator = ToolCoordinator::new(&task.tools, &task.blueprint, run_id, &task.context, &self.events);
        let conversation = ConversationLoop::new(gateway, &coordinator, &self.events, run_id.to_string())
            .with_system_prompt(&task.system_prompt)
            .with_max_iterations(self.settings.max_iterations);

        match conversation.run(instruction, &task.tools.definitions(), store).await {
            Ok(output) => Attempt {
                outcome: ResultAssembler::new(&task.blueprint).assemble(store, &output.final_text),
                final_text: output.final_text,
                iterations: output.iterations,
                aborted: false,
            },
            Err(e) => {
                warn!(run_id = %run_id, attempt, error = %e, "Run aborted");
                Attempt {
                    outcome: RunOutcome::Failed {
                        reason: abort_reason(&e),
                    },
                    final_text: String::new(),
                    iterations: 0,
                    aborted: true,
                }
            }
        }
    }
}

/// Failure reason for a run whose loop returned an error.
fn abort_reason(error: &Error) -> String {
    match error {
        Error::Provider(e) => format!("model gateway error: {e}"),
        Error::Log(e) => format!("message log error: {e}"),
        other => format!("run aborted: {other}"),
    }
}
