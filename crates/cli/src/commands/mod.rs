//! Subcommand implementations and the wiring they share.

pub mod config_cmd;
pub mod program;
pub mod report;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pacekeeper_agent::{RunReport, RunSettings, TaskRunner};
use pacekeeper_config::AppConfig;
use pacekeeper_core::context::TaskContext;
use pacekeeper_core::event::EventBus;
use pacekeeper_core::outcome::RunOutcome;
use pacekeeper_providers::AnthropicProvider;
use tracing::debug;

/// Load config and fail early, with setup hints, when no key is set.
pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    let config = AppConfig::load().context("Failed to load config")?;
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    PACEKEEPER_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add `api_key` to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }
    Ok(config)
}

/// Build a runner over the configured backend, logging its events.
pub(crate) fn build_runner(config: &AppConfig) -> anyhow::Result<TaskRunner> {
    let api_key = config.api_key.clone().context("No API key configured")?;
    let provider = Arc::new(AnthropicProvider::from_config(&config.provider, api_key));

    let settings = RunSettings {
        model: config.provider.model.clone(),
        temperature: config.provider.temperature,
        max_tokens: Some(config.provider.max_tokens),
        max_iterations: config.orchestration.max_iterations,
        request_timeout: Duration::from_secs(config.provider.request_timeout_secs),
        retry_enabled: config.orchestration.retry_enabled,
    };

    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            debug!(run_id = event.run_id(), event = ?event, "Domain event");
        }
    });

    Ok(TaskRunner::new(provider, settings, events))
}

/// Read a JSON file into a task context.
pub(crate) fn read_context(path: &Path) -> anyhow::Result<TaskContext> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Context file {} is not valid JSON", path.display()))?;
    Ok(TaskContext::from_value(value)?)
}

/// Print the outcome as JSON and map it to the process exit status.
pub(crate) fn finish(report: &RunReport) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&report.outcome)?);
    Ok(ExitCode::from(exit_status(&report.outcome)))
}

fn exit_status(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Success { .. } => 0,
        RunOutcome::Skipped { .. } => 2,
        RunOutcome::Failed { .. } => 1,
    }
}
