//! Persistence collaborators the tools call through.
//!
//! Only tools talk to these; the engine never sees them. The in-memory
//! implementations back tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use pacekeeper_core::error::ToolError;
use serde::{Deserialize, Serialize};

/// One recorded training activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    /// e.g. "run", "ride", "swim"
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub distance_m: f64,
    pub moving_time_s: u64,
    #[serde(default)]
    pub elevation_gain_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_heart_rate: Option<f64>,
    /// Device-reported training load, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_load: Option<f64>,
}

impl Activity {
    pub fn date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }
}

/// Source of an athlete's recorded activities.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Activities that started between `start` and `end`, both inclusive.
    async fn activities(
        &self,
        athlete_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Activity>, ToolError>;
}

/// Durable storage for finished artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a document and return its id.
    async fn save(&self, kind: &str, document: &serde_json::Value) -> Result<String, ToolError>;
}

/// Activities held in memory, keyed by athlete.
#[derive(Default)]
pub struct InMemoryActivitySource {
    by_athlete: HashMap<String, Vec<Activity>>,
}

impl InMemoryActivitySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activities(mut self, athlete_id: impl Into<String>, activities: Vec<Activity>) -> Self {
        self.by_athlete.entry(athlete_id.into()).or_default().extend(activities);
        self
    }
}

#[async_trait]
impl ActivitySource for InMemoryActivitySource {
    async fn activities(
        &self,
        athlete_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Activity>, ToolError> {
        let mut found: Vec<Activity> = self
            .by_athlete
            .get(athlete_id)
            .map(|all| {
                all.iter()
                    .filter(|a| a.date() >= start && a.date() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by_key(|a| a.start_time);
        Ok(found)
    }
}

/// A saved artifact.
#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub id: String,
    pub kind: String,
    pub document: serde_json::Value,
}

/// Artifacts held in memory. Ids are `<kind>-<n>`.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    saved: Mutex<Vec<SavedArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<SavedArtifact> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, kind: &str, document: &serde_json::Value) -> Result<String, ToolError> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| ToolError::Collaborator("artifact store lock poisoned".into()))?;
        let id = format!("{kind}-{}", saved.len() + 1);
        saved.push(SavedArtifact {
            id: id.clone(),
            kind: kind.to_string(),
            document: document.clone(),
        });
        Ok(id)
    }
}
