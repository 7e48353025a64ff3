//! `pacekeeper program`: Design and save a multi-phase training program.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use pacekeeper_agent::Task;
use pacekeeper_tools::training_program::{self, ProgramDeps};

use crate::artifact_store::FsArtifactStore;

pub async fn run(context_path: &Path) -> anyhow::Result<ExitCode> {
    let config = super::load_config()?;
    let context = super::read_context(context_path)?;

    let deps = ProgramDeps {
        artifacts: Arc::new(FsArtifactStore::new(&config.output_dir)),
        min_weeks: config.program.min_weeks,
        max_weeks: config.program.max_weeks,
    };
    let task = Task {
        blueprint: training_program::blueprint(),
        tools: training_program::registry(&deps),
        instruction: training_program::instruction(&context)?,
        system_prompt: training_program::system_prompt(),
        context,
    };

    let report = super::build_runner(&config)?.run(task).await?;
    super::finish(&report)
}
