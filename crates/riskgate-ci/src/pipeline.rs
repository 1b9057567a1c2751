//! Pipeline orchestration.
//!
//! A run acquires the source, executes the fixed stage sequence, consults the
//! deployment gate, requests a summary, and always returns a finalized
//! [`RunReport`]. Failures never propagate out of [`Pipeline::run`]; they are
//! captured in the report's `error` and `success` fields.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use riskgate_core::controls::call_with_policy;
use riskgate_core::domain::{
    Assessment, CollaboratorError, ConfigError, GateDecision, LogLevel, ReportRecorder,
    RunFailure, RunIdentity, RunReport, StageEntry, StageKind, StageOutcome, StageResult,
};
use riskgate_core::{
    metrics::METRICS, obs, AssessmentBackend, AssessmentProvider, Clock, CodeAnalyzer, Deployer,
    InfraValidator, PipelineConfig, RepositoryAcquirer, RunIdGenerator, SecurityScanner,
    SourceHandle, SystemClock, TestRunner, UuidRunIds,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, Instrument};

use crate::gate::DeploymentGate;
use crate::stage::{
    deployment_blocked, deployment_executed, AnalysisStage, InfraStage, SecurityStage,
    StageExecutor, TestingStage,
};

/// External collaborators of a run.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn RepositoryAcquirer>,
    pub analyzer: Arc<dyn CodeAnalyzer>,
    pub scanner: Arc<dyn SecurityScanner>,
    pub tests: Arc<dyn TestRunner>,
    pub infra: Arc<dyn InfraValidator>,
    pub deployer: Arc<dyn Deployer>,
    pub assessment: Arc<dyn AssessmentBackend>,
}

/// One entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub repository: String,
    pub branch: String,
}

impl RunRequest {
    pub fn new(repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
        }
    }
}

/// The pipeline orchestrator.
///
/// Holds no per-run state: each [`run`](Pipeline::run) owns its recorder, so
/// one pipeline can serve concurrent runs.
pub struct Pipeline {
    collaborators: Collaborators,
    config: PipelineConfig,
    executors: Vec<Arc<dyn StageExecutor>>,
    provider: AssessmentProvider,
    gate: DeploymentGate,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn RunIdGenerator>,
}

/// Fallback when `now + run_deadline` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

impl Pipeline {
    /// Validate `config`, then build the pipeline.
    pub fn try_new(
        collaborators: Collaborators,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(collaborators, config))
    }

    /// Build the pipeline without validating `config`.
    ///
    /// An out-of-range `risk_threshold` is clamped to the top of the scale.
    /// Use [`try_new`](Self::try_new) to reject invalid configs instead.
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        let policy = &config.policy;
        let executors: Vec<Arc<dyn StageExecutor>> = vec![
            Arc::new(AnalysisStage::new(collaborators.analyzer.clone(), policy)),
            Arc::new(SecurityStage::new(collaborators.scanner.clone(), policy)),
            Arc::new(TestingStage::new(
                collaborators.tests.clone(),
                collaborators.analyzer.clone(),
                policy,
            )),
            Arc::new(InfraStage::new(collaborators.infra.clone(), policy)),
        ];
        let provider = AssessmentProvider::new(
            collaborators.assessment.clone(),
            config.calls.assessment.clone(),
        );
        let gate = DeploymentGate::new(config.risk_threshold());

        Self {
            collaborators,
            config,
            executors,
            provider,
            gate,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidRunIds),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn RunIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for `repository` at `branch`.
    pub async fn run(&self, repository: &str, branch: &str) -> RunReport {
        let identity = RunIdentity {
            run_id: self.ids.next_id(),
            repository: repository.to_string(),
            branch: branch.to_string(),
            started_at: self.clock.now(),
        };
        let span = obs::run_span(identity.run_id.as_str());
        self.execute(identity).instrument(span).await
    }

    /// Run several independent pipelines, at most `max_concurrent` at a time.
    ///
    /// Reports are returned in request order.
    pub async fn run_batch(
        &self,
        requests: Vec<RunRequest>,
        max_concurrent: usize,
    ) -> Vec<RunReport> {
        stream::iter(requests)
            .map(|request| async move { self.run(&request.repository, &request.branch).await })
            .buffered(max_concurrent.max(1))
            .collect()
            .await
    }

    async fn execute(&self, identity: RunIdentity) -> RunReport {
        let run_id = identity.run_id.to_string();
        METRICS.inc_runs_started();
        obs::emit_run_started(&run_id, &identity.repository, &identity.branch);

        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(self.config.run_deadline())
            .unwrap_or_else(|| now + FAR_FUTURE);
        let mut recorder = ReportRecorder::start(identity);

        let failure = match tokio::time::timeout_at(deadline, self.drive(&mut recorder)).await {
            Ok(Ok(())) => None,
            Ok(Err(failure)) => Some(failure),
            Err(_elapsed) => Some(RunFailure::DeadlineExceeded {
                limit_ms: self.config.run_deadline().as_millis() as u64,
            }),
        };

        match &failure {
            None => self.summarize(&mut recorder, deadline).await,
            Some(failure) => obs::emit_run_failed(&run_id, failure.code(), failure),
        }

        let report = recorder.finish(self.clock.now(), failure.as_ref());
        if !report.success {
            METRICS.inc_runs_failed();
        }
        obs::emit_run_finished(
            &run_id,
            report.duration_ms(),
            report.stages.len(),
            report.success,
        );
        report
    }

    /// Acquisition, the four checked stages, then the gated deployment.
    async fn drive(&self, recorder: &mut ReportRecorder) -> Result<(), RunFailure> {
        let repository = recorder.identity().repository.clone();
        let branch = recorder.identity().branch.clone();

        let acquirer = &self.collaborators.repository;
        let source = call_with_policy(&self.config.calls.acquisition, "acquire", || {
            acquirer.acquire(&repository, &branch)
        })
        .await?;
        info!(repository = %repository, commit = ?source.commit(), "source acquired");

        for executor in &self.executors {
            self.run_stage(recorder, executor.as_ref(), &source).await?;
        }
        self.run_deployment(recorder, &source).await
    }

    async fn run_stage(
        &self,
        recorder: &mut ReportRecorder,
        executor: &dyn StageExecutor,
        source: &SourceHandle,
    ) -> Result<(), RunFailure> {
        let kind = executor.kind();
        let result = match call_with_policy(&self.config.calls.stages, kind.name(), || {
            executor.execute(source)
        })
        .await
        {
            Ok(result) => result,
            Err(err) => {
                let entry = StageEntry::bare(StageResult::errored(kind, &err));
                return self.fail_stage(recorder, entry, err);
            }
        };

        let entry = self.assess(recorder, result).await;
        self.commit(recorder, entry)
    }

    /// Attach the advisory assessment. Skipped stages and stages without a
    /// payload are not assessed; a provider failure leaves the outcome alone.
    async fn assess(&self, recorder: &mut ReportRecorder, result: StageResult) -> StageEntry {
        if result.outcome == StageOutcome::Skipped || result.raw_payload.is_null() {
            return StageEntry::bare(result);
        }
        let kind = result.stage_kind;
        match self.provider.assess_stage(&result).await {
            Ok(assessment) => StageEntry {
                result,
                assessment: Some(assessment),
                assessment_error: None,
            },
            Err(err) => {
                self.note_assessment_failure(recorder, Some(kind), &err);
                StageEntry {
                    result,
                    assessment: None,
                    assessment_error: Some(err.to_string()),
                }
            }
        }
    }

    async fn run_deployment(
        &self,
        recorder: &mut ReportRecorder,
        source: &SourceHandle,
    ) -> Result<(), RunFailure> {
        let kind = StageKind::Deployment;
        let threshold = self.gate.threshold();

        if let Some(decision) = self.gate.check_upstream(recorder.stages()) {
            let reason = decision.reason().unwrap_or_default();
            self.record_gate(recorder, decision.clone());
            let result = deployment_blocked(StageOutcome::Skipped, reason, None, threshold);
            return self.commit(recorder, StageEntry::bare(result));
        }

        let deployer = &self.collaborators.deployer;
        let plan = match call_with_policy(&self.config.calls.stages, "create_plan", || {
            deployer.create_plan(source)
        })
        .await
        {
            Ok(plan) => plan,
            Err(err) => {
                let entry = StageEntry::bare(StageResult::errored(kind, &err));
                return self.fail_stage(recorder, entry, err);
            }
        };

        let risk_input = json!({
            "plan": plan,
            "testing": recorder.stage(StageKind::Testing),
            "infra_validation": recorder.stage(StageKind::InfraValidation),
        });
        let risk = self.provider.deployment_risk(risk_input).await;
        if let Err(err) = &risk {
            self.note_assessment_failure(recorder, Some(kind), err);
        }

        let decision = self.gate.evaluate(&risk);
        self.record_gate(recorder, decision.clone());

        let (assessment, assessment_error) = match risk {
            Ok(risk) => (Some(Assessment::DeploymentRisk(risk)), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let risk_level = assessment
            .as_ref()
            .and_then(Assessment::as_deployment_risk)
            .map(|r| r.risk_level);

        let approved_level = match (&decision, risk_level) {
            (GateDecision::Approved { risk_level, .. }, _) => *risk_level,
            (_, level) => {
                METRICS.inc_gate_rejections();
                let reason = decision.reason().unwrap_or_default();
                let result = deployment_blocked(StageOutcome::Failed, reason, level, threshold)
                    .with_payload(json!({ "plan": plan }));
                return self.commit(
                    recorder,
                    StageEntry {
                        result,
                        assessment,
                        assessment_error,
                    },
                );
            }
        };

        // Irreversible: one attempt, bounded by the stage timeout.
        let deploy_policy = self.config.calls.stages.without_retries();
        let deployed = call_with_policy(&deploy_policy, "deploy", || deployer.deploy(&plan)).await;
        let plan_value = json!(plan);
        match deployed {
            Ok(output) => {
                METRICS.inc_deployments();
                let result = deployment_executed(&output, plan_value, approved_level, threshold);
                self.commit(
                    recorder,
                    StageEntry {
                        result,
                        assessment,
                        assessment_error,
                    },
                )
            }
            Err(err) => {
                let entry = StageEntry {
                    result: StageResult::errored(kind, &err)
                        .with_metric("risk_level", approved_level.value())
                        .with_metric("risk_threshold", threshold.value())
                        .with_metric("executed", true),
                    assessment,
                    assessment_error,
                };
                self.fail_stage(recorder, entry, err)
            }
        }
    }

    /// Best-effort summary over the finished stages. Never changes `success`.
    async fn summarize(&self, recorder: &mut ReportRecorder, deadline: tokio::time::Instant) {
        let snapshot = recorder.snapshot();
        let summary = tokio::time::timeout_at(deadline, self.provider.summary(snapshot)).await;
        let err = match summary {
            Ok(Ok(summary)) => {
                recorder.set_summary(summary);
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(_elapsed) => "run deadline reached before summary completed".to_string(),
        };
        METRICS.inc_assessment_failures();
        let run_id = recorder.identity().run_id.to_string();
        obs::emit_assessment_failed(&run_id, None, &err);
        recorder.log(
            self.clock.now(),
            LogLevel::Warn,
            None,
            format!("summary unavailable: {err}"),
        );
    }

    fn commit(&self, recorder: &mut ReportRecorder, entry: StageEntry) -> Result<(), RunFailure> {
        let run_id = recorder.identity().run_id.to_string();
        obs::emit_stage_completed(
            &run_id,
            entry.kind(),
            entry.outcome(),
            entry.assessment.is_some(),
        );
        recorder.record_stage(entry)?;
        Ok(())
    }

    /// Commit a stage whose collaborator failed and end the run.
    fn fail_stage(
        &self,
        recorder: &mut ReportRecorder,
        entry: StageEntry,
        err: CollaboratorError,
    ) -> Result<(), RunFailure> {
        let stage = entry.kind();
        self.commit(recorder, entry)?;
        Err(RunFailure::Stage { stage, source: err })
    }

    fn record_gate(&self, recorder: &mut ReportRecorder, decision: GateDecision) {
        let run_id = recorder.identity().run_id.to_string();
        obs::emit_gate_evaluated(&run_id, &decision);
        let level = if decision.approved() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        recorder.log(
            self.clock.now(),
            level,
            Some(StageKind::Deployment),
            decision.describe(),
        );
        recorder.record_gate(decision);
    }

    fn note_assessment_failure(
        &self,
        recorder: &mut ReportRecorder,
        stage: Option<StageKind>,
        err: &dyn std::fmt::Display,
    ) {
        METRICS.inc_assessment_failures();
        let run_id = recorder.identity().run_id.to_string();
        obs::emit_assessment_failed(&run_id, stage, err);
        recorder.log(
            self.clock.now(),
            LogLevel::Warn,
            stage,
            format!("assessment unavailable: {err}"),
        );
    }
}
