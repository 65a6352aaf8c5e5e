//! SimulationRecord and its stage lifecycle
//!
//! Each stage (`bmp`, `cstr`) follows the same lifecycle:
//!
//! ```text
//! pending ──► running ──► finished
//!    ▲           │
//!    │           ▼
//!    └──────── failed ──► running (retry)
//! ```

use crate::codec::{BmpResult, CstrResult};
use crate::errors::SimError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Opaque simulation identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationId(String);

impl SimulationId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifiers double as file names in the file-system store, so only
    /// ASCII alphanumerics, `-` and `_` are accepted.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self.0.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SimulationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SimulationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pipeline stages driven by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Bmp,
    Cstr,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Bmp => "bmp",
            Stage::Cstr => "cstr",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage (also used for the upstream load-data stage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl StageStatus {
    /// Statuses from which a stage may be (re-)started
    pub const STARTABLE: [StageStatus; 2] = [StageStatus::Pending, StageStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Finished => "finished",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_startable(&self) -> bool {
        Self::STARTABLE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Finished | StageStatus::Failed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "running" => Ok(StageStatus::Running),
            "finished" => Ok(StageStatus::Finished),
            "failed" => Ok(StageStatus::Failed),
            other => Err(SimError::MalformedInput(format!("unknown stage status '{}'", other))),
        }
    }
}

/// One persisted simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub id: SimulationId,
    pub project_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// User-chosen parameters, immutable after creation. Decoded by
    /// [`crate::codec::Submission::parse`].
    pub submit_data: JsonValue,

    pub load_data_status: StageStatus,
    #[serde(default)]
    pub load_data_result: Option<JsonValue>,

    pub bmp_status: StageStatus,
    #[serde(default)]
    pub bmp_result: Option<BmpResult>,

    pub cstr_status: StageStatus,
    #[serde(default)]
    pub cstr_progress: Option<f64>,
    #[serde(default)]
    pub cstr_result: Option<CstrResult>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SimulationRecord {
    pub fn status_of(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Bmp => self.bmp_status,
            Stage::Cstr => self.cstr_status,
        }
    }

    /// Both stages settled
    pub fn is_complete(&self) -> bool {
        self.bmp_status.is_terminal() && self.cstr_status.is_terminal()
    }
}

/// Input for creating a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSimulation {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub submit_data: JsonValue,
    /// When present the load-data stage is recorded as already finished
    #[serde(default)]
    pub load_data_result: Option<JsonValue>,
}

impl NewSimulation {
    pub fn into_record(self, id: SimulationId, now: DateTime<Utc>) -> SimulationRecord {
        let load_data_status = if self.load_data_result.is_some() {
            StageStatus::Finished
        } else {
            StageStatus::Pending
        };

        SimulationRecord {
            id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            submit_data: self.submit_data,
            load_data_status,
            load_data_result: self.load_data_result,
            bmp_status: StageStatus::Pending,
            bmp_result: None,
            cstr_status: StageStatus::Pending,
            cstr_progress: None,
            cstr_result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Targeted partial update of a record
///
/// `None` leaves a field untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationPatch {
    pub load_data_status: Option<StageStatus>,
    pub load_data_result: Option<Option<JsonValue>>,
    pub bmp_status: Option<StageStatus>,
    pub bmp_result: Option<Option<BmpResult>>,
    pub cstr_status: Option<StageStatus>,
    pub cstr_progress: Option<Option<f64>>,
    pub cstr_result: Option<Option<CstrResult>>,
}

impl SimulationPatch {
    /// Set BMP status and result together
    pub fn bmp(status: StageStatus, result: Option<BmpResult>) -> Self {
        Self {
            bmp_status: Some(status),
            bmp_result: Some(result),
            ..Self::default()
        }
    }

    /// Set CSTR status and result together
    pub fn cstr(status: StageStatus, result: Option<CstrResult>) -> Self {
        Self {
            cstr_status: Some(status),
            cstr_result: Some(result),
            ..Self::default()
        }
    }

    /// Overwrite the CSTR progress fraction
    pub fn progress(value: f64) -> Self {
        Self {
            cstr_progress: Some(Some(value)),
            ..Self::default()
        }
    }

    /// Record the outcome of the upstream load-data stage
    pub fn load_data(status: StageStatus, result: Option<JsonValue>) -> Self {
        Self {
            load_data_status: Some(status),
            load_data_result: Some(result),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, value: Option<f64>) -> Self {
        self.cstr_progress = Some(value);
        self
    }

    pub fn apply(&self, record: &mut SimulationRecord, now: DateTime<Utc>) {
        if let Some(status) = self.load_data_status {
            record.load_data_status = status;
        }
        if let Some(result) = &self.load_data_result {
            record.load_data_result = result.clone();
        }
        if let Some(status) = self.bmp_status {
            record.bmp_status = status;
        }
        if let Some(result) = &self.bmp_result {
            record.bmp_result = result.clone();
        }
        if let Some(status) = self.cstr_status {
            record.cstr_status = status;
        }
        if let Some(progress) = self.cstr_progress {
            record.cstr_progress = progress;
        }
        if let Some(result) = &self.cstr_result {
            record.cstr_result = result.clone();
        }
        record.updated_at = now;
    }
}
