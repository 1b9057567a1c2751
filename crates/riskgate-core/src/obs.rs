//! Structured lifecycle events for pipeline runs.
//!
//! Every run executes inside a `riskgate.run` span carrying its `run_id`;
//! the `emit_*` functions log one `event = "..."` record per lifecycle step.

use tracing::{info, warn};

use crate::domain::{GateDecision, StageKind, StageOutcome};

/// Span for one run. Attach it with `tracing::Instrument::instrument` so it
/// follows the run future across await points.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("riskgate.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, repository: &str, branch: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        repository = %repository,
        branch = %branch,
    );
}

pub fn emit_stage_completed(run_id: &str, stage: StageKind, outcome: StageOutcome, assessed: bool) {
    info!(
        event = "stage.completed",
        run_id = %run_id,
        stage = %stage,
        outcome = %outcome,
        assessed = assessed,
    );
}

/// Advisory assessment failure (warning level).
pub fn emit_assessment_failed(
    run_id: &str,
    stage: Option<StageKind>,
    error: &dyn std::fmt::Display,
) {
    let stage = stage.map(|s| s.name()).unwrap_or("summary");
    warn!(event = "assessment.failed", run_id = %run_id, stage = %stage, error = %error);
}

pub fn emit_gate_evaluated(run_id: &str, decision: &GateDecision) {
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        approved = decision.approved(),
        detail = %decision.describe(),
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, stages: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        stages = stages,
        success = success,
    );
}

/// Fatal run failure (warning level; the report carries the detail).
pub fn emit_run_failed(run_id: &str, code: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, code = %code, error = %error);
}
