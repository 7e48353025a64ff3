//! Weekly performance report.
//!
//! `assess_week_data` decides whether the week holds enough data,
//! `compute_week_metrics` aggregates it, and `save_weekly_report` persists
//! the model's write-up together with the stored metrics.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use pacekeeper_core::blueprint::Blueprint;
use pacekeeper_core::context::{TaskContext, ToolContext};
use pacekeeper_core::error::ToolError;
use pacekeeper_core::store::{GateDecision, ResultStore};
use pacekeeper_core::tool::{Tool, ToolOutput, ToolRegistry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::{Activity, ActivitySource, ArtifactStore};
use crate::{parse_input, round1};

pub const WORKFLOW: &str = "weekly_report";

/// The closed set of tools this workflow registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTool {
    AssessWeekData,
    ComputeWeekMetrics,
    SaveWeeklyReport,
}

impl ReportTool {
    pub const ALL: [Self; 3] = [Self::AssessWeekData, Self::ComputeWeekMetrics, Self::SaveWeeklyReport];

    pub fn name(self) -> &'static str {
        match self {
            Self::AssessWeekData => "assess_week_data",
            Self::ComputeWeekMetrics => "compute_week_metrics",
            Self::SaveWeeklyReport => "save_weekly_report",
        }
    }
}

/// Athlete the report is for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    pub id: String,
    pub name: String,
}

/// The reported week, both ends inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Week {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// What the report tools need besides the task context.
#[derive(Clone)]
pub struct ReportDeps {
    pub activities: Arc<dyn ActivitySource>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub min_activities: usize,
}

/// Register every report tool.
pub fn registry(deps: &ReportDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in ReportTool::ALL {
        let boxed: Box<dyn Tool> = match tool {
            ReportTool::AssessWeekData => Box::new(AssessWeekData {
                activities: deps.activities.clone(),
                min_activities: deps.min_activities,
            }),
            ReportTool::ComputeWeekMetrics => Box::new(ComputeWeekMetrics {
                activities: deps.activities.clone(),
            }),
            ReportTool::SaveWeeklyReport => Box::new(SaveWeeklyReport {
                artifacts: deps.artifacts.clone(),
            }),
        };
        registry.register(boxed);
    }
    registry
}

pub fn blueprint() -> Blueprint {
    let gate = ReportTool::AssessWeekData.name();
    let metrics = ReportTool::ComputeWeekMetrics.name();
    let save = ReportTool::SaveWeeklyReport.name();
    Blueprint::new(WORKFLOW, save, "report_id")
        .with_gate(gate, vec![metrics.into(), save.into()])
        .with_steps(vec![gate.into(), metrics.into(), save.into()])
        .with_min_successful_tools(2)
        .with_metadata(metadata)
}

pub fn system_prompt() -> String {
    "You are a performance analyst writing a weekly training report for an endurance athlete.\n\
     Work only through the tools. First call assess_week_data. If it says not to proceed, \
     stop and explain why in one sentence. Otherwise call compute_week_metrics, write the \
     report from its numbers, and save it with save_weekly_report. Never invent numbers."
        .into()
}

/// The opening instruction for a run over `context`.
pub fn instruction(context: &TaskContext) -> Result<String, ToolError> {
    let athlete: Athlete = context.get("athlete")?;
    let week: Week = context.get("week")?;
    Ok(format!(
        "Write the weekly performance report for {} (athlete {}) covering {} to {}. \
         Save it when done.",
        athlete.name, athlete.id, week.start, week.end
    ))
}

/// Success metadata for a finished report.
fn metadata(store: &ResultStore) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    if let Some(gate) = store.success(ReportTool::AssessWeekData.name()) {
        map.insert("activity_count".into(), gate.data["activity_count"].clone());
    }
    if let Some(metrics) = store.success(ReportTool::ComputeWeekMetrics.name()) {
        map.insert("sessions".into(), metrics.data["totals"]["sessions"].clone());
        map.insert("distance_km".into(), metrics.data["totals"]["distance_km"].clone());
    }
    if let Some(saved) = store.success(ReportTool::SaveWeeklyReport.name()) {
        map.insert("confidence".into(), saved.input["confidence"].clone());
    }
    let flags = store
        .gate_decision(ReportTool::AssessWeekData.name())
        .map(|d| d.flags)
        .unwrap_or_default();
    map.insert("flags".into(), serde_json::json!(flags));
    map
}

struct AssessWeekData {
    activities: Arc<dyn ActivitySource>,
    min_activities: usize,
}

#[async_trait]
impl Tool for AssessWeekData {
    fn name(&self) -> &str {
        ReportTool::AssessWeekData.name()
    }

    fn description(&self) -> &str {
        "Check whether the athlete's week has enough recorded activities to report on. \
         Returns proceed=true/false, a reason when false, and data-quality flags."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let athlete: Athlete = ctx.task.get("athlete")?;
        let week: Week = ctx.task.get("week")?;

        if week.end < week.start {
            let decision = GateDecision::block("invalid_week", vec!["week_end_before_start".into()]);
            return Ok(ToolOutput::json(gate_output(&decision, 0, 0)));
        }

        let activities = self.activities.activities(&athlete.id, week.start, week.end).await?;
        let without_hr = activities.iter().filter(|a| a.average_heart_rate.is_none()).count();

        let mut flags = Vec::new();
        let decision = if activities.len() < self.min_activities {
            flags.push("too_few_activities".to_string());
            if without_hr > 0 {
                flags.push("missing_heart_rate".into());
            }
            GateDecision::block("insufficient_data", flags)
        } else {
            if without_hr > 0 {
                flags.push("missing_heart_rate".into());
            }
            GateDecision::proceed(flags)
        };

        debug!(athlete = %athlete.id, activities = activities.len(), proceed = decision.proceed, "Assessed week");
        Ok(ToolOutput::json(gate_output(&decision, activities.len(), without_hr)))
    }
}

fn gate_output(decision: &GateDecision, activity_count: usize, without_hr: usize) -> serde_json::Value {
    serde_json::json!({
        "proceed": decision.proceed,
        "reason": decision.reason,
        "flags": decision.flags,
        "activity_count": activity_count,
        "activities_without_heart_rate": without_hr,
    })
}

struct ComputeWeekMetrics {
    activities: Arc<dyn ActivitySource>,
}

#[derive(Debug, Default, Serialize)]
struct SportTotals {
    sessions: usize,
    distance_km: f64,
    moving_minutes: f64,
}

#[async_trait]
impl Tool for ComputeWeekMetrics {
    fn name(&self) -> &str {
        ReportTool::ComputeWeekMetrics.name()
    }

    fn description(&self) -> &str {
        "Compute the week's training totals (sessions, distance, time, elevation, pace, load, \
         longest session) and a per-sport breakdown."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let athlete: Athlete = ctx.task.get("athlete")?;
        let week: Week = ctx.task.get("week")?;
        let activities = self.activities.activities(&athlete.id, week.start, week.end).await?;
        Ok(ToolOutput::json(week_metrics(&activities)))
    }
}

/// Aggregate a week of activities.
fn week_metrics(activities: &[Activity]) -> serde_json::Value {
    let distance_km: f64 = activities.iter().map(|a| a.distance_m).sum::<f64>() / 1000.0;
    let moving_minutes: f64 = activities.iter().map(|a| a.moving_time_s as f64).sum::<f64>() / 60.0;
    let elevation_m: f64 = activities.iter().map(|a| a.elevation_gain_m).sum();
    // Device load when reported, moving minutes otherwise
    let training_load: f64 = activities
        .iter()
        .map(|a| a.training_load.unwrap_or(a.moving_time_s as f64 / 60.0))
        .sum();
    let longest = activities.iter().max_by_key(|a| a.moving_time_s);

    let (run_km, run_min) = activities
        .iter()
        .filter(|a| a.sport == "run")
        .fold((0.0, 0.0), |(km, min), a| {
            (km + a.distance_m / 1000.0, min + a.moving_time_s as f64 / 60.0)
        });
    let average_pace = (run_km > 0.0).then(|| round1(run_min / run_km));

    let mut by_sport: BTreeMap<&str, SportTotals> = BTreeMap::new();
    for a in activities {
        let entry = by_sport.entry(a.sport.as_str()).or_default();
        entry.sessions += 1;
        entry.distance_km += a.distance_m / 1000.0;
        entry.moving_minutes += a.moving_time_s as f64 / 60.0;
    }
    for totals in by_sport.values_mut() {
        totals.distance_km = round1(totals.distance_km);
        totals.moving_minutes = round1(totals.moving_minutes);
    }

    serde_json::json!({
        "totals": {
            "sessions": activities.len(),
            "distance_km": round1(distance_km),
            "moving_minutes": round1(moving_minutes),
            "elevation_m": round1(elevation_m),
            "average_run_pace_min_per_km": average_pace,
            "training_load": round1(training_load),
            "longest_session": longest.map(|a| serde_json::json!({
                "id": a.id,
                "sport": a.sport,
                "minutes": round1(a.moving_time_s as f64 / 60.0),
                "distance_km": round1(a.distance_m / 1000.0),
            })),
        },
        "by_sport": by_sport,
    })
}

struct SaveWeeklyReport {
    artifacts: Arc<dyn ArtifactStore>,
}

/// The model's write-up.
#[derive(Debug, Deserialize, Serialize)]
struct ReportDraft {
    headline: String,
    summary: String,
    #[serde(default)]
    highlights: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    confidence: f64,
}

#[async_trait]
impl Tool for SaveWeeklyReport {
    fn name(&self) -> &str {
        ReportTool::SaveWeeklyReport.name()
    }

    fn description(&self) -> &str {
        "Save the finished weekly report. Requires compute_week_metrics to have run. \
         Returns the report_id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "headline": { "type": "string", "description": "One-line summary of the week" },
                "summary": { "type": "string", "description": "A short paragraph on how the week went" },
                "highlights": { "type": "array", "items": { "type": "string" } },
                "recommendations": { "type": "array", "items": { "type": "string" } },
                "confidence": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "How confident the analysis is, given the data quality"
                }
            },
            "required": ["headline", "summary", "confidence"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let draft: ReportDraft = parse_input(input)?;
        if !(0.0..=1.0).contains(&draft.confidence) {
            return Err(ToolError::InvalidArguments(format!(
                "confidence must be between 0 and 1, got {}",
                draft.confidence
            )));
        }

        let metrics_tool = ReportTool::ComputeWeekMetrics.name();
        let metrics = ctx
            .results
            .success(metrics_tool)
            .ok_or_else(|| ToolError::MissingUpstream {
                upstream: metrics_tool.into(),
                detail: "no week metrics stored for this run; call compute_week_metrics first".into(),
            })?;

        let athlete: Athlete = ctx.task.get("athlete")?;
        let week: Week = ctx.task.get("week")?;
        let flags = ctx
            .results
            .gate_decision(ReportTool::AssessWeekData.name())
            .map(|d| d.flags)
            .unwrap_or_default();

        let document = serde_json::json!({
            "run_id": ctx.run_id.to_string(),
            "athlete": athlete,
            "week": week,
            "report": draft,
            "metrics": metrics.data,
            "flags": flags,
        });
        let report_id = self.artifacts.save(WORKFLOW, &document).await?;
        Ok(ToolOutput::json(serde_json::json!({ "report_id": report_id })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryActivitySource, InMemoryArtifactStore};
    use chrono::Utc;
    use pacekeeper_core::context::RunId;
    use pacekeeper_core::store::{ResultStatus, StorageKey, StoredResult};

    fn activity(id: &str, sport: &str, date: &str, km: f64, minutes: u64, hr: Option<f64>) -> Activity {
        Activity {
            id: id.into(),
            sport: sport.into(),
            start_time: format!("{date}T07:00:00Z").parse().unwrap(),
            distance_m: km * 1000.0,
            moving_time_s: minutes * 60,
            elevation_gain_m: 50.0,
            average_heart_rate: hr,
            training_load: None,
        }
    }

    fn context() -> TaskContext {
        TaskContext::new()
            .with("athlete", serde_json::json!({"id": "ath-1", "name": "Sam"}))
            .unwrap()
            .with("week", serde_json::json!({"start": "2026-10-05", "end": "2026-10-11"}))
            .unwrap()
    }

    fn deps(activities: Vec<Activity>) -> (ReportDeps, Arc<InMemoryArtifactStore>) {
        let artifacts = Arc::new(InMemoryArtifactStore::new());
        let deps = ReportDeps {
            activities: Arc::new(InMemoryActivitySource::new().with_activities("ath-1", activities)),
            artifacts: artifacts.clone(),
            min_activities: 2,
        };
        (deps, artifacts)
    }

    async fn run(registry: &ToolRegistry, tool: ReportTool, input: serde_json::Value, store: &ResultStore) -> Result<ToolOutput, ToolError> {
        let run_id = RunId::from("run-1");
        let task = context();
        let ctx = ToolContext { run_id: &run_id, task: &task, results: store };
        registry.get(tool.name()).unwrap().execute(input, &ctx).await
    }

    fn stored(tool: ReportTool, data: serde_json::Value) -> StoredResult {
        StoredResult {
            key: StorageKey::for_tool(tool.name()),
            invocation_id: "c".into(),
            input: serde_json::json!({}),
            status: ResultStatus::Success,
            content: String::new(),
            data,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn registry_matches_blueprint() {
        let (deps, _) = deps(vec![]);
        let registry = registry(&deps);
        assert_eq!(registry.len(), ReportTool::ALL.len());
        blueprint().validate(&registry).unwrap();
    }

    #[tokio::test]
    async fn gate_blocks_sparse_week() {
        let (deps, _) = deps(vec![activity("a", "run", "2026-10-06", 8.0, 45, None)]);
        let output = run(&registry(&deps), ReportTool::AssessWeekData, serde_json::json!({}), &ResultStore::new())
            .await
            .unwrap();
        let decision: GateDecision = serde_json::from_value(output.data.clone()).unwrap();
        assert!(decision.is_blocked());
        assert_eq!(decision.reason.as_deref(), Some("insufficient_data"));
        assert_eq!(decision.flags, vec!["too_few_activities", "missing_heart_rate"]);
        assert_eq!(output.data["activity_count"], 1);
    }

    #[tokio::test]
    async fn gate_proceeds_with_non_blocking_flag() {
        let (deps, _) = deps(vec![
            activity("a", "run", "2026-10-06", 8.0, 45, Some(148.0)),
            activity("b", "ride", "2026-10-08", 40.0, 90, None),
        ]);
        let output = run(&registry(&deps), ReportTool::AssessWeekData, serde_json::json!({}), &ResultStore::new())
            .await
            .unwrap();
        let decision: GateDecision = serde_json::from_value(output.data).unwrap();
        assert!(decision.proceed);
        assert_eq!(decision.flags, vec!["missing_heart_rate"]);
    }

    #[test]
    fn metrics_totals_and_breakdown() {
        let metrics = week_metrics(&[
            activity("a", "run", "2026-10-06", 10.0, 50, Some(150.0)),
            activity("b", "run", "2026-10-08", 5.0, 25, Some(145.0)),
            activity("c", "ride", "2026-10-10", 40.0, 90, None),
        ]);
        assert_eq!(metrics["totals"]["sessions"], 3);
        assert_eq!(metrics["totals"]["distance_km"], 55.0);
        assert_eq!(metrics["totals"]["moving_minutes"], 165.0);
        assert_eq!(metrics["totals"]["average_run_pace_min_per_km"], 5.0);
        assert_eq!(metrics["totals"]["longest_session"]["id"], "c");
        assert_eq!(metrics["by_sport"]["run"]["sessions"], 2);
        assert_eq!(metrics["by_sport"]["ride"]["distance_km"], 40.0);
    }

    #[tokio::test]
    async fn save_without_metrics_is_missing_upstream() {
        let (deps, artifacts) = deps(vec![]);
        let err = run(
            &registry(&deps),
            ReportTool::SaveWeeklyReport,
            serde_json::json!({"headline": "h", "summary": "s", "confidence": 0.8}),
            &ResultStore::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::MissingUpstream { ref upstream, .. } if upstream == "compute_week_metrics"));
        assert!(artifacts.saved().is_empty());
    }

    #[tokio::test]
    async fn save_rejects_out_of_range_confidence() {
        let (deps, _) = deps(vec![]);
        let err = run(
            &registry(&deps),
            ReportTool::SaveWeeklyReport,
            serde_json::json!({"headline": "h", "summary": "s", "confidence": 1.5}),
            &ResultStore::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn save_persists_report_with_metrics() {
        let (deps, artifacts) = deps(vec![]);
        let mut store = ResultStore::new();
        store.record(stored(
            ReportTool::AssessWeekData,
            serde_json::to_value(GateDecision::proceed(vec!["missing_heart_rate".into()])).unwrap(),
        ));
        store.record(stored(ReportTool::ComputeWeekMetrics, serde_json::json!({"totals": {"sessions": 4}})));

        let output = run(
            &registry(&deps),
            ReportTool::SaveWeeklyReport,
            serde_json::json!({
                "headline": "Solid week",
                "summary": "Four sessions.",
                "highlights": ["Long run"],
                "confidence": 0.7
            }),
            &store,
        )
        .await
        .unwrap();
        assert_eq!(output.data["report_id"], "weekly_report-1");

        let saved = artifacts.saved();
        assert_eq!(saved[0].document["metrics"]["totals"]["sessions"], 4);
        assert_eq!(saved[0].document["flags"][0], "missing_heart_rate");
        assert_eq!(saved[0].document["report"]["recommendations"], serde_json::json!([]));
    }

    #[test]
    fn instruction_names_athlete_and_week() {
        let text = instruction(&context()).unwrap();
        assert!(text.contains("Sam"));
        assert!(text.contains("2026-10-05"));
        assert!(matches!(instruction(&TaskContext::new()), Err(ToolError::MissingContext(_))));
    }
}
