//! Multi-phase training program design.
//!
//! `validate_program_request` checks lead time and availability,
//! `plan_program_phases` splits the lead time into base / build / peak /
//! taper, `generate_phase_workouts` fills one phase with weekly sessions
//! (several phases run in parallel), and `save_training_program` persists
//! the assembled program.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use pacekeeper_core::blueprint::Blueprint;
use pacekeeper_core::context::{TaskContext, ToolContext};
use pacekeeper_core::error::ToolError;
use pacekeeper_core::store::{GateDecision, ResultStore, StorageKey};
use pacekeeper_core::tool::{Tool, ToolOutput, ToolRegistry};
use serde::{Deserialize, Serialize};

use crate::collaborators::ArtifactStore;
use crate::parse_input;

pub const WORKFLOW: &str = "training_program";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramTool {
    ValidateProgramRequest,
    PlanProgramPhases,
    GeneratePhaseWorkouts,
    SaveTrainingProgram,
}

impl ProgramTool {
    pub const ALL: [Self; 4] = [
        Self::ValidateProgramRequest,
        Self::PlanProgramPhases,
        Self::GeneratePhaseWorkouts,
        Self::SaveTrainingProgram,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ValidateProgramRequest => "validate_program_request",
            Self::PlanProgramPhases => "plan_program_phases",
            Self::GeneratePhaseWorkouts => "generate_phase_workouts",
            Self::SaveTrainingProgram => "save_training_program",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    Beginner,
    Intermediate,
    Advanced,
}

impl Experience {
    fn sessions_per_week(self) -> usize {
        match self {
            Self::Beginner => 3,
            Self::Intermediate => 4,
            Self::Advanced => 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    pub id: String,
    pub name: String,
    pub experience: Experience,
    pub weekly_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub event: String,
    pub event_date: NaiveDate,
    pub start_date: NaiveDate,
}

impl Goal {
    /// Whole weeks between the start date and the event.
    pub fn lead_weeks(&self) -> i64 {
        (self.event_date - self.start_date).num_days().max(0) / 7
    }
}

#[derive(Clone)]
pub struct ProgramDeps {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub min_weeks: u32,
    pub max_weeks: u32,
}

/// Register every program tool.
pub fn registry(deps: &ProgramDeps) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in ProgramTool::ALL {
        let boxed: Box<dyn Tool> = match tool {
            ProgramTool::ValidateProgramRequest => Box::new(ValidateProgramRequest {
                min_weeks: deps.min_weeks,
                max_weeks: deps.max_weeks,
            }),
            ProgramTool::PlanProgramPhases => Box::new(PlanProgramPhases),
            ProgramTool::GeneratePhaseWorkouts => Box::new(GeneratePhaseWorkouts),
            ProgramTool::SaveTrainingProgram => Box::new(SaveTrainingProgram {
                artifacts: deps.artifacts.clone(),
            }),
        };
        registry.register(boxed);
    }
    registry
}

pub fn blueprint() -> Blueprint {
    let steps: Vec<String> = ProgramTool::ALL.iter().map(|t| t.name().to_string()).collect();
    let guarded = steps[1..].to_vec();
    Blueprint::new(WORKFLOW, ProgramTool::SaveTrainingProgram.name(), "program_id")
        .with_gate(ProgramTool::ValidateProgramRequest.name(), guarded)
        .with_parallel(vec![ProgramTool::GeneratePhaseWorkouts.name().into()])
        .with_steps(steps)
        .with_min_successful_tools(3)
        .with_metadata(metadata)
}

pub fn system_prompt() -> String {
    "You are an endurance coach designing a periodized training program.\n\
     Work only through the tools. First call validate_program_request; if it says not to \
     proceed, stop and explain why. Otherwise call plan_program_phases, then call \
     generate_phase_workouts once per phase in a single turn, then save the program with \
     save_training_program. Do not ask the athlete questions."
        .into()
}

pub fn instruction(context: &TaskContext) -> Result<String, ToolError> {
    let athlete: Athlete = context.get("athlete")?;
    let goal: Goal = context.get("goal")?;
    Ok(format!(
        "Design a training program for {} (athlete {}) targeting {} on {}, starting {}. \
         Save it when done.",
        athlete.name, athlete.id, goal.event, goal.event_date, goal.start_date
    ))
}

fn metadata(store: &ResultStore) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    if let Some(plan) = store.success(ProgramTool::PlanProgramPhases.name()) {
        let phase_count = plan.data["phases"].as_array().map_or(0, Vec::len);
        map.insert("phase_count".into(), phase_count.into());
        map.insert("total_weeks".into(), plan.data["total_weeks"].clone());
    }
    let workout_count: u64 = store
        .for_tool(ProgramTool::GeneratePhaseWorkouts.name())
        .filter(|r| r.is_success())
        .filter_map(|r| r.data["workout_count"].as_u64())
        .sum();
    map.insert("workout_count".into(), workout_count.into());
    let flags = store
        .gate_decision(ProgramTool::ValidateProgramRequest.name())
        .map(|d| d.flags)
        .unwrap_or_default();
    map.insert("flags".into(), serde_json::json!(flags));
    map
}

struct ValidateProgramRequest {
    min_weeks: u32,
    max_weeks: u32,
}

#[async_trait]
impl Tool for ValidateProgramRequest {
    fn name(&self) -> &str {
        ProgramTool::ValidateProgramRequest.name()
    }

    fn description(&self) -> &str {
        "Check that the goal leaves a workable lead time and that the athlete has training \
         time available. Returns proceed=true/false, a reason when false, and flags."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let athlete: Athlete = ctx.task.get("athlete")?;
        let goal: Goal = ctx.task.get("goal")?;
        let weeks = goal.lead_weeks();

        let decision = if weeks < i64::from(self.min_weeks) {
            GateDecision::block("insufficient_lead_time", vec![format!("lead_time_below_{}_weeks", self.min_weeks)])
        } else if weeks > i64::from(self.max_weeks) {
            GateDecision::block("lead_time_too_long", vec![format!("lead_time_above_{}_weeks", self.max_weeks)])
        } else if athlete.weekly_hours <= 0.0 {
            GateDecision::block("invalid_availability", vec!["no_weekly_hours".into()])
        } else {
            let mut flags = Vec::new();
            if athlete.experience == Experience::Beginner && athlete.weekly_hours > 10.0 {
                flags.push("high_volume_for_beginner".to_string());
            }
            GateDecision::proceed(flags)
        };

        Ok(ToolOutput::json(serde_json::json!({
            "proceed": decision.proceed,
            "reason": decision.reason,
            "flags": decision.flags,
            "lead_weeks": weeks,
        })))
    }
}

/// One block of the program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub focus: String,
    /// 1-based program week the phase starts in
    pub start_week: u32,
    pub weeks: u32,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhasePlan {
    total_weeks: u32,
    phases: Vec<Phase>,
}

const PHASES: [(&str, &str); 4] = [
    ("base", "aerobic volume and consistency"),
    ("build", "threshold and race-specific strength"),
    ("peak", "race-pace sharpening"),
    ("taper", "freshness for race day"),
];

/// Weeks per phase. Short programs keep the phases closest to race day.
fn phase_weeks(total: u32) -> Vec<(usize, u32)> {
    if total < 4 {
        return (4 - total as usize..4).map(|i| (i, 1)).collect();
    }
    let share = |ratio: f64| ((f64::from(total) * ratio).round() as u32).max(1);
    let taper = share(0.10);
    let peak = share(0.15);
    let build = share(0.35);
    let base = total.saturating_sub(taper + peak + build).max(1);
    vec![(0, base), (1, build), (2, peak), (3, taper)]
}

fn plan_phases(total_weeks: u32, start: NaiveDate) -> PhasePlan {
    let mut week = 1;
    let phases = phase_weeks(total_weeks)
        .into_iter()
        .enumerate()
        .map(|(n, (kind, weeks))| {
            let (name, focus) = PHASES[kind];
            let phase = Phase {
                id: format!("phase-{}", n + 1),
                name: name.into(),
                focus: focus.into(),
                start_week: week,
                weeks,
                start_date: start + Duration::weeks(i64::from(week - 1)),
            };
            week += weeks;
            phase
        })
        .collect();
    PhasePlan { total_weeks, phases }
}

struct PlanProgramPhases;

#[async_trait]
impl Tool for PlanProgramPhases {
    fn name(&self) -> &str {
        ProgramTool::PlanProgramPhases.name()
    }

    fn description(&self) -> &str {
        "Split the lead time into base, build, peak and taper phases. Returns the phases \
         with their ids (phase-1, phase-2, ...)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: serde_json::Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let goal: Goal = ctx.task.get("goal")?;
        let weeks = u32::try_from(goal.lead_weeks())
            .map_err(|_| ToolError::InvalidArguments("lead time out of range".into()))?;
        if weeks == 0 {
            return Err(ToolError::InvalidArguments(
                "the event must be at least one week after the start date".into(),
            ));
        }
        let plan = plan_phases(weeks, goal.start_date);
        let data = serde_json::to_value(&plan)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        Ok(ToolOutput::json(data))
    }
}

/// Read the stored phase plan.
fn stored_plan(store: &ResultStore) -> Result<PhasePlan, ToolError> {
    let upstream = ProgramTool::PlanProgramPhases.name();
    let stored = store.success(upstream).ok_or_else(|| ToolError::MissingUpstream {
        upstream: upstream.into(),
        detail: "no phase plan stored for this run; call plan_program_phases first".into(),
    })?;
    serde_json::from_value(stored.data.clone()).map_err(|e| ToolError::MissingUpstream {
        upstream: upstream.into(),
        detail: format!("stored plan is unreadable: {e}"),
    })
}

#[derive(Debug, Deserialize)]
struct PhaseRequest {
    phase_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct Workout {
    day: u32,
    kind: &'static str,
    minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
struct WorkoutWeek {
    week: u32,
    workouts: Vec<Workout>,
}

fn session_kinds(phase: &str) -> [&'static str; 5] {
    match phase {
        "base" => ["easy", "long", "easy", "strength", "easy"],
        "build" => ["easy", "tempo", "long", "intervals", "easy"],
        "peak" => ["intervals", "easy", "race_pace", "long", "easy"],
        _ => ["easy", "race_pace", "easy", "shakeout", "easy"],
    }
}

fn kind_weight(kind: &str) -> f64 {
    match kind {
        "long" => 1.6,
        "tempo" | "race_pace" => 1.1,
        "strength" => 0.6,
        "shakeout" => 0.5,
        _ => 1.0,
    }
}

/// Load multiplier for week `i` (0-based) of a phase.
fn week_load(phase: &str, i: u32) -> f64 {
    match phase {
        "taper" => (1.0 - 0.2 * f64::from(i + 1)).max(0.4),
        "peak" => 1.05,
        // Every fourth week is a recovery week
        _ if i % 4 == 3 => 0.8,
        _ => 1.0 + 0.05 * f64::from(i % 4),
    }
}

fn phase_workouts(phase: &Phase, athlete: &Athlete) -> Vec<WorkoutWeek> {
    let all_kinds = session_kinds(&phase.name);
    let kinds = &all_kinds[..athlete.experience.sessions_per_week()];
    let total_weight: f64 = kinds.iter().map(|k| kind_weight(k)).sum();
    // Training days spread over the week, Monday = 1
    let days: &[u32] = match kinds.len() {
        3 => &[2, 4, 6],
        4 => &[2, 3, 5, 7],
        _ => &[1, 2, 4, 6, 7],
    };

    (0..phase.weeks)
        .map(|i| {
            let weekly_minutes = athlete.weekly_hours * 60.0 * week_load(&phase.name, i);
            let workouts = kinds
                .iter()
                .zip(days)
                .map(|(kind, &day)| {
                    let minutes = weekly_minutes * kind_weight(kind) / total_weight;
                    Workout {
                        day,
                        kind: *kind,
                        minutes: ((minutes / 5.0).round() as u32).max(2) * 5,
                    }
                })
                .collect();
            WorkoutWeek {
                week: phase.start_week + i,
                workouts,
            }
        })
        .collect()
}

struct GeneratePhaseWorkouts;

#[async_trait]
impl Tool for GeneratePhaseWorkouts {
    fn name(&self) -> &str {
        ProgramTool::GeneratePhaseWorkouts.name()
    }

    fn description(&self) -> &str {
        "Generate the weekly workouts for one phase of the stored plan. Call it once per \
         phase; calls for different phases may be made together."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "phase_id": { "type": "string", "description": "Phase id from plan_program_phases, e.g. phase-2" }
            },
            "required": ["phase_id"]
        })
    }

    fn storage_target(&self, input: &serde_json::Value) -> Option<String> {
        input["phase_id"].as_str().map(String::from)
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let request: PhaseRequest = parse_input(input)?;
        let plan = stored_plan(ctx.results)?;
        let phase = plan
            .phases
            .iter()
            .find(|p| p.id == request.phase_id)
            .ok_or_else(|| {
                let known: Vec<&str> = plan.phases.iter().map(|p| p.id.as_str()).collect();
                ToolError::InvalidArguments(format!(
                    "unknown phase '{}'; the plan has {}",
                    request.phase_id,
                    known.join(", ")
                ))
            })?;
        let athlete: Athlete = ctx.task.get("athlete")?;

        let weeks = phase_workouts(phase, &athlete);
        let workout_count: usize = weeks.iter().map(|w| w.workouts.len()).sum();
        Ok(ToolOutput::json(serde_json::json!({
            "phase_id": phase.id,
            "phase": phase.name,
            "weeks": weeks,
            "workout_count": workout_count,
        })))
    }
}

struct SaveTrainingProgram {
    artifacts: Arc<dyn ArtifactStore>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ProgramDraft {
    title: String,
    #[serde(default)]
    notes: String,
}

#[async_trait]
impl Tool for SaveTrainingProgram {
    fn name(&self) -> &str {
        ProgramTool::SaveTrainingProgram.name()
    }

    fn description(&self) -> &str {
        "Save the finished program once every phase has workouts. Returns the program_id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "notes": { "type": "string", "description": "Coaching notes for the athlete" }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext<'_>) -> Result<ToolOutput, ToolError> {
        let draft: ProgramDraft = parse_input(input)?;
        let plan = stored_plan(ctx.results)?;

        let generator = ProgramTool::GeneratePhaseWorkouts.name();
        let mut phases = Vec::with_capacity(plan.phases.len());
        for phase in &plan.phases {
            let workouts = ctx
                .results
                .get(&StorageKey::new(generator, Some(phase.id.clone())))
                .filter(|r| r.is_success())
                .ok_or_else(|| ToolError::MissingUpstream {
                    upstream: generator.into(),
                    detail: format!("no workouts stored for {}", phase.id),
                })?;
            phases.push(serde_json::json!({
                "phase": phase,
                "weeks": workouts.data["weeks"],
            }));
        }

        let athlete: Athlete = ctx.task.get("athlete")?;
        let goal: Goal = ctx.task.get("goal")?;
        let document = serde_json::json!({
            "run_id": ctx.run_id.to_string(),
            "title": draft.title,
            "notes": draft.notes,
            "athlete": athlete,
            "goal": goal,
            "total_weeks": plan.total_weeks,
            "phases": phases,
        });
        let program_id = self.artifacts.save(WORKFLOW, &document).await?;
        Ok(ToolOutput::json(serde_json::json!({ "program_id": program_id })))
    }
}
