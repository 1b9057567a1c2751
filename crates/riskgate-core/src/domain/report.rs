//! Run identity and the run report aggregate.
//!
//! A run is recorded through a [`ReportRecorder`], which is owned by the
//! orchestrator for the duration of the run. [`ReportRecorder::finish`]
//! consumes the recorder and is the only way to obtain a [`RunReport`], so
//! `completed_at` and `success` are set exactly once on every exit path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::assessment::{Assessment, BuildSummary};
use super::error::{ReportError, RunError, RunFailure};
use super::gate::GateDecision;
use super::stage::{StageKind, StageOutcome, StageResult};

/// Unique, time-sortable identifier of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable identity of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub run_id: RunId,
    pub repository: String,
    pub branch: String,
    pub started_at: DateTime<Utc>,
}

/// One committed stage: its result and the advisory assessment, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageEntry {
    #[serde(flatten)]
    pub result: StageResult,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<Assessment>,

    /// Why the assessment is absent, when the provider failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_error: Option<String>,
}

impl StageEntry {
    /// A stage entry without an assessment.
    pub fn bare(result: StageResult) -> Self {
        Self {
            result,
            assessment: None,
            assessment_error: None,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.result.stage_kind
    }

    pub fn outcome(&self) -> StageOutcome {
        self.result.outcome
    }
}

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Run-scoped structured log line kept on the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    pub message: String,
}

/// Finalized result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    #[serde(flatten)]
    pub identity: RunIdentity,

    pub completed_at: DateTime<Utc>,

    /// False on any fatal failure or any stage that ended `Failed`.
    pub success: bool,

    /// Committed stages in execution order.
    pub stages: Vec<StageEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateDecision>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<BuildSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,

    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl RunReport {
    pub fn run_id(&self) -> &RunId {
        &self.identity.run_id
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageEntry> {
        self.stages.iter().find(|s| s.kind() == kind)
    }

    pub fn outcome(&self, kind: StageKind) -> Option<StageOutcome> {
        self.stage(kind).map(StageEntry::outcome)
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.outcome() == StageOutcome::Passed)
            .count()
    }

    /// Number of stages that failed.
    pub fn failed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.outcome() == StageOutcome::Failed)
            .count()
    }

    /// Wall-clock duration of the run in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.completed_at - self.identity.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// SHA-256 of the report with run id and all timestamps removed.
    ///
    /// Two runs whose collaborators returned identical outputs have the same
    /// shape digest.
    pub fn shape_digest(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("run_id");
            obj.remove("started_at");
            obj.remove("completed_at");
            if let Some(serde_json::Value::Array(log)) = obj.get_mut("log") {
                for entry in log.iter_mut() {
                    if let Some(entry) = entry.as_object_mut() {
                        entry.remove("at");
                    }
                }
            }
        }
        let mut hasher = Sha256::new();
        hasher.update(value.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Single-writer accumulator for a run in progress.
#[derive(Debug)]
pub struct ReportRecorder {
    identity: RunIdentity,
    stages: Vec<StageEntry>,
    gate: Option<GateDecision>,
    ai_summary: Option<BuildSummary>,
    log: Vec<LogEntry>,
}

impl ReportRecorder {
    /// Start recording a run.
    pub fn start(identity: RunIdentity) -> Self {
        Self {
            identity,
            stages: Vec::new(),
            gate: None,
            ai_summary: None,
            log: Vec::new(),
        }
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Commit a stage entry. Each stage kind may be committed once, and only
    /// kinds that allow skipping may be committed as skipped.
    pub fn record_stage(&mut self, entry: StageEntry) -> Result<(), ReportError> {
        if self.stage(entry.kind()).is_some() {
            return Err(ReportError::DuplicateStage(entry.kind()));
        }
        if entry.outcome() == StageOutcome::Skipped && !entry.kind().may_skip() {
            return Err(ReportError::IllegalSkip(entry.kind()));
        }
        self.stages.push(entry);
        Ok(())
    }

    pub fn stages(&self) -> &[StageEntry] {
        &self.stages
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageEntry> {
        self.stages.iter().find(|s| s.kind() == kind)
    }

    pub fn record_gate(&mut self, decision: GateDecision) {
        self.gate = Some(decision);
    }

    pub fn set_summary(&mut self, summary: BuildSummary) {
        self.ai_summary = Some(summary);
    }

    /// Append to the run-scoped log.
    pub fn log(
        &mut self,
        at: DateTime<Utc>,
        level: LogLevel,
        stage: Option<StageKind>,
        message: impl Into<String>,
    ) {
        self.log.push(LogEntry {
            at,
            level,
            stage,
            message: message.into(),
        });
    }

    /// JSON view of the run so far (input to the summary assessment).
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.identity.run_id,
            "repository": self.identity.repository,
            "branch": self.identity.branch,
            "stages": self.stages,
            "gate": self.gate,
        })
    }

    /// Finalize the run.
    pub fn finish(
        mut self,
        completed_at: DateTime<Utc>,
        failure: Option<&RunFailure>,
    ) -> RunReport {
        if let Some(failure) = failure {
            self.log.push(LogEntry {
                at: completed_at,
                level: LogLevel::Error,
                stage: failure.stage(),
                message: failure.to_string(),
            });
        }
        let any_failed = self
            .stages
            .iter()
            .any(|s| s.outcome() == StageOutcome::Failed);
        RunReport {
            identity: self.identity,
            completed_at,
            success: failure.is_none() && !any_failed,
            stages: self.stages,
            gate: self.gate,
            ai_summary: self.ai_summary,
            error: failure.map(RunFailure::to_run_error),
            log: self.log,
        }
    }
}
