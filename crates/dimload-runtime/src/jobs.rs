//! Job outcomes and run reports

use chrono::{DateTime, Utc};
use dimload_core::LoadReport;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final state of one unit within a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The unit loaded its table
    Succeeded,
    /// Every attempt failed
    Failed,
    /// Not started because an upstream unit did not succeed
    Skipped,
}

/// What happened to one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Unit name
    pub unit: String,

    /// Final status
    pub status: JobStatus,

    /// Attempts made (0 when skipped)
    pub attempts: u32,

    /// Wall-clock time over all attempts
    pub duration_ms: u64,

    /// Load report of the successful attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<LoadReport>,

    /// Error of the last failed attempt, or why the unit was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    /// A unit that loaded its table
    pub fn succeeded(
        unit: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
        report: LoadReport,
    ) -> Self {
        Self {
            unit: unit.into(),
            status: JobStatus::Succeeded,
            attempts,
            duration_ms,
            report: Some(report),
            error: None,
        }
    }

    /// A unit whose every attempt failed
    pub fn failed(
        unit: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            unit: unit.into(),
            status: JobStatus::Failed,
            attempts,
            duration_ms,
            report: None,
            error: Some(error.into()),
        }
    }

    /// A unit that never started
    pub fn skipped(unit: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            status: JobStatus::Skipped,
            attempts: 0,
            duration_ms: 0,
            report: None,
            error: Some(reason.into()),
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier, also attached to every log line of the run
    pub run_id: Uuid,

    /// Pipeline owner from the configuration
    pub owner: String,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// One entry per unit, in execution order
    pub jobs: Vec<JobOutcome>,
}

impl RunReport {
    /// Start an empty report
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            owner: owner.into(),
            started_at: Utc::now(),
            jobs: Vec::new(),
        }
    }

    /// Whether every unit succeeded
    pub fn succeeded(&self) -> bool {
        self.jobs.iter().all(|j| j.status == JobStatus::Succeeded)
    }

    /// Outcome of a unit, if it was part of the run
    pub fn job(&self, unit: &str) -> Option<&JobOutcome> {
        self.jobs.iter().find(|j| j.unit == unit)
    }

    /// Units that did not succeed
    pub fn unsuccessful(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|j| j.status != JobStatus::Succeeded)
            .map(|j| j.unit.as_str())
            .collect()
    }
}
