//! Retry decisions and directives.
//!
//! Every function here is pure: it reads an outcome, a store snapshot and
//! the final text, and never touches the run itself. The runner owns the
//! single retry.

use pacekeeper_core::blueprint::Blueprint;
use pacekeeper_core::outcome::RunOutcome;
use pacekeeper_core::store::ResultStore;

/// Phrases that mark a final answer as a question back to the user.
const CLARIFYING_PHRASES: &[&str] = &[
    "need to",
    "should i",
    "can you confirm",
    "could you",
    "would you like",
    "please provide",
    "let me know",
    "do you want",
];

/// Error text left behind when a downstream tool ran before its upstream.
const PLUMBING_PATTERNS: &[&str] = &[
    "missing upstream output",
    "no stored output",
    "upstream result not found",
];

/// Why a run is being retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryTrigger {
    TooFewResults { successful: usize, required: usize },
    ClarifyingQuestion,
    PlumbingDefect,
}

impl std::fmt::Display for RetryTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewResults { successful, required } => {
                write!(f, "too_few_results ({successful}/{required})")
            }
            Self::ClarifyingQuestion => write!(f, "clarifying_question"),
            Self::PlumbingDefect => write!(f, "plumbing_defect"),
        }
    }
}

/// Decide whether a first-attempt outcome earns the one retry.
pub fn retry_trigger(
    outcome: &RunOutcome,
    store: &ResultStore,
    final_text: &str,
    blueprint: &Blueprint,
) -> Option<RetryTrigger> {
    if outcome.is_success() || outcome.is_gate_block() {
        return None;
    }

    let successful = store.successful_count();
    if successful < blueprint.min_successful_tools {
        return Some(RetryTrigger::TooFewResults {
            successful,
            required: blueprint.min_successful_tools,
        });
    }

    if looks_like_clarifying_question(final_text) {
        return Some(RetryTrigger::ClarifyingQuestion);
    }

    let stored_errors = store.errors().map(|r| r.content.as_str());
    if outcome.reason().into_iter().chain(stored_errors).any(is_plumbing_defect) {
        return Some(RetryTrigger::PlumbingDefect);
    }

    None
}

pub fn looks_like_clarifying_question(text: &str) -> bool {
    if text.contains('?') {
        return true;
    }
    let lower = text.to_lowercase();
    CLARIFYING_PHRASES.iter().any(|p| lower.contains(p))
}

pub fn is_plumbing_defect(text: &str) -> bool {
    let lower = text.to_lowercase();
    PLUMBING_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Steps of the blueprint with no successful result yet.
pub fn missing_steps<'a>(blueprint: &'a Blueprint, store: &ResultStore) -> Vec<&'a str> {
    blueprint
        .steps
        .iter()
        .filter(|step| !store.has_success(step))
        .map(String::as_str)
        .collect()
}

/// Build the directive appended to the instruction for the retry.
///
/// Must be called before the store is cleared: it echoes the inputs and
/// outputs of every successful prior invocation.
pub fn build_directive(blueprint: &Blueprint, store: &ResultStore, trigger: &RetryTrigger) -> String {
    let mut directive = String::from(
        "## Retry directive\n\
         The previous attempt ended without completing the workflow. \
         Do not ask questions and do not stop early: call the tools directly.\n",
    );

    if let RetryTrigger::PlumbingDefect = trigger {
        directive.push_str(
            "A tool failed because an earlier step's output was missing. \
             Run every step in order and wait for each result before the next.\n",
        );
    }

    let missing = missing_steps(blueprint, store);
    directive.push_str(&format!("\nRequired steps, in order: {}\n", blueprint.steps.join(" -> ")));
    if !missing.is_empty() {
        directive.push_str(&format!("Not yet completed: {}\n", missing.join(", ")));
    }

    let prior: Vec<_> = store.iter().filter(|r| r.is_success()).collect();
    if !prior.is_empty() {
        directive.push_str("\nThese steps succeeded before. Call them again with exactly these inputs:\n");
        for result in prior {
            directive.push_str(&format!(
                "- {} input: {}\n  output: {}\n",
                result.key,
                result.input,
                result.data
            ));
        }
    }

    directive.push_str(&format!(
        "\nFinish by calling {} to persist the result.\n",
        blueprint.commit.tool
    ));
    directive
}
