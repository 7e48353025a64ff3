//! The conversation loop.
//!
//! Drives gateway calls and coordinator executions until the model gives a
//! final answer, stops early, or the iteration ceiling is reached.

use chrono::Utc;
use pacekeeper_core::error::Result;
use pacekeeper_core::event::{DomainEvent, EventBus};
use pacekeeper_core::message::MessageLog;
use pacekeeper_core::provider::StopReason;
use pacekeeper_core::store::ResultStore;
use tracing::{debug, info, warn};

use crate::coordinator::ToolCoordinator;
use crate::gateway::{ModelGateway, TurnSignal};

/// Default iteration ceiling.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopStop {
    FinalAnswer,
    Incomplete(StopReason),
    IterationCeiling,
}

/// What one loop run produced.
#[derive(Debug, Clone)]
pub struct LoopOutput {
    /// The final answer, or the best text collected so far
    pub final_text: String,
    pub stop: LoopStop,
    pub iterations: u32,
    pub log: MessageLog,
}

/// One conversation with the model, bound to a coordinator.
pub struct ConversationLoop<'a> {
    gateway: &'a ModelGateway,
    coordinator: &'a ToolCoordinator<'a>,
    events: &'a EventBus,
    run_id: String,
    system_prompt: String,
    max_iterations: u32,
}

impl<'a> ConversationLoop<'a> {
    pub fn new(
        gateway: &'a ModelGateway,
        coordinator: &'a ToolCoordinator<'a>,
        events: &'a EventBus,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            coordinator,
            events,
            run_id: run_id.into(),
            system_prompt: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum number of model calls.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Run the conversation from a fresh log seeded with `instruction`.
    ///
    /// Gateway errors propagate; everything else ends in a [`LoopOutput`].
    pub async fn run(
        &self,
        instruction: &str,
        tools: &[pacekeeper_core::provider::ToolDefinition],
        store: &mut ResultStore,
    ) -> Result<LoopOutput> {
        let mut log = MessageLog::new();
        log.push_user(instruction);

        let mut best_text = String::new();
        let mut iteration = 0;

        while iteration < self.max_iterations {
            iteration += 1;
            debug!(run_id = %self.run_id, iteration, "Loop iteration");
            self.events.publish(DomainEvent::IterationStarted {
                run_id: self.run_id.clone(),
                iteration,
                timestamp: Utc::now(),
            });

            let turn = self.gateway.turn(&self.system_prompt, &log, tools).await?;

            if let Some(usage) = &turn.usage {
                self.events.publish(DomainEvent::ResponseGenerated {
                    run_id: self.run_id.clone(),
                    model: turn.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            let text = turn.message.text();
            if !text.trim().is_empty() {
                best_text = text.clone();
            }

            match turn.signal {
                TurnSignal::ToolsRequested(calls) => {
                    debug!(run_id = %self.run_id, iteration, tool_count = calls.len(), "Executing tool calls");
                    log.push_assistant(turn.message)?;
                    let results = self.coordinator.execute(calls, store).await;
                    log.push_tool_results(results)?;
                }
                TurnSignal::FinalAnswer => {
                    append_if_present(&mut log, turn.message)?;
                    info!(run_id = %self.run_id, iterations = iteration, "Model gave a final answer");
                    return Ok(LoopOutput {
                        final_text: text,
                        stop: LoopStop::FinalAnswer,
                        iterations: iteration,
                        log,
                    });
                }
                TurnSignal::Incomplete(reason) => {
                    append_if_present(&mut log, turn.message)?;
                    warn!(run_id = %self.run_id, iterations = iteration, stop_reason = ?reason, "Model stopped early");
                    return Ok(LoopOutput {
                        final_text: text,
                        stop: LoopStop::Incomplete(reason),
                        iterations: iteration,
                        log,
                    });
                }
            }
        }

        warn!(
            run_id = %self.run_id,
            iterations = iteration,
            "Iteration ceiling reached, returning best text so far"
        );
        Ok(LoopOutput {
            final_text: best_text,
            stop: LoopStop::IterationCeiling,
            iterations: iteration,
            log,
        })
    }
}

/// Backends can end a turn with no content at all; the log only takes
/// non-empty messages.
fn append_if_present(log: &mut MessageLog, message: pacekeeper_core::message::Message) -> Result<()> {
    if message.content.is_empty() {
        return Ok(());
    }
    log.push_assistant(message)?;
    Ok(())
}
