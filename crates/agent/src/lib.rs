//! The orchestration engine: the heart of Pacekeeper.
//!
//! A run follows a **Call → Execute → Observe** cycle:
//!
//! 1. **Send** the message log and tool schemas to the model (`gateway`)
//! 2. **If tool calls**: execute them, enforcing the gate (`coordinator`)
//! 3. **Append** the results and loop back to step 1 (`loop_runner`)
//! 4. **If text response**: classify the stored results (`assembler`)
//! 5. **If the outcome earns it**: retry exactly once (`retry`, `runner`)
//!
//! The loop continues until the model responds with text only, stops early,
//! or the iteration ceiling is reached.

pub mod assembler;
pub mod coordinator;
pub mod gateway;
pub mod loop_runner;
pub mod retry;
pub mod runner;

#[cfg(test)]
mod test_helpers;

pub use assembler::ResultAssembler;
pub use coordinator::ToolCoordinator;
pub use gateway::{GatewayTurn, ModelGateway, TurnSignal};
pub use loop_runner::{ConversationLoop, LoopOutput, LoopStop, DEFAULT_MAX_ITERATIONS};
pub use retry::RetryTrigger;
pub use runner::{RunReport, RunSettings, Task, TaskRunner};
