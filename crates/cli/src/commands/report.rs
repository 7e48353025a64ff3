//! `pacekeeper report`: Build and save a weekly performance report.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use pacekeeper_agent::Task;
use pacekeeper_tools::weekly_report::{self, Athlete, ReportDeps};
use pacekeeper_tools::{Activity, InMemoryActivitySource};
use tracing::info;

use crate::artifact_store::FsArtifactStore;

pub async fn run(context_path: &Path, activities_path: &Path) -> anyhow::Result<ExitCode> {
    let config = super::load_config()?;
    let context = super::read_context(context_path)?;
    let athlete: Athlete = context.get("athlete").context("Context is missing a valid `athlete`")?;

    let raw = std::fs::read_to_string(activities_path)
        .with_context(|| format!("Failed to read activities file {}", activities_path.display()))?;
    let activities: Vec<Activity> = serde_json::from_str(&raw)
        .with_context(|| format!("Activities file {} is not a list of activities", activities_path.display()))?;
    info!(athlete = %athlete.id, activities = activities.len(), "Loaded activities");

    let deps = ReportDeps {
        activities: Arc::new(InMemoryActivitySource::new().with_activities(&athlete.id, activities)),
        artifacts: Arc::new(FsArtifactStore::new(&config.output_dir)),
        min_activities: config.report.min_activities,
    };
    let task = Task {
        blueprint: weekly_report::blueprint(),
        tools: weekly_report::registry(&deps),
        instruction: weekly_report::instruction(&context)?,
        system_prompt: weekly_report::system_prompt(),
        context,
    };

    let report = super::build_runner(&config)?.run(task).await?;
    super::finish(&report)
}
