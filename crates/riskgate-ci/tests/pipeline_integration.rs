//! Integration tests for the pipeline orchestrator with in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use riskgate_ci::{Collaborators, Pipeline, RunRequest, REASON_NO_IAC};
use riskgate_core::domain::gate::{
    REASON_RISK_EXCEEDED, REASON_RISK_UNAVAILABLE, REASON_UPSTREAM_FAILED,
};
use riskgate_core::domain::{
    AnalysisOutput, Assessment, AssessmentError, AssessmentTask, CodeIssue, CollaboratorError,
    DeploymentOutput, DeploymentPlan, GateDecision, LogLevel, RepositoryError, RunReport,
    SecurityFinding, SecurityScanOutput, Severity, StageKind, StageOutcome, TestOutput,
};
use riskgate_core::fakes::{
    FailingRepository, FakeAnalyzer, FakeInfra, FakeScanner, FakeTestRunner, Script,
    ScriptedAssessmentBackend, SpyDeployer, StaticRepository,
};
use riskgate_core::{load_config, CallPolicy, PipelineConfig, RepositoryAcquirer};
use serde_json::json;

const REPO: &str = "https://git.example.com/shop/checkout.git";

/// Collaborators for one test, kept as concrete types for call counting.
struct Harness {
    repository: Arc<dyn RepositoryAcquirer>,
    analyzer: Arc<FakeAnalyzer>,
    scanner: Arc<FakeScanner>,
    tests: Arc<FakeTestRunner>,
    infra: Arc<FakeInfra>,
    deployer: Arc<SpyDeployer>,
    backend: Arc<ScriptedAssessmentBackend>,
    config: PipelineConfig,
}

impl Harness {
    /// Clean repository, no IaC, deployment risk `risk`.
    fn clean(risk: u8) -> Self {
        Self {
            repository: Arc::new(StaticRepository::default()),
            analyzer: Arc::new(FakeAnalyzer::clean()),
            scanner: Arc::new(FakeScanner::clean()),
            tests: Arc::new(FakeTestRunner::passing(42, 0.87)),
            infra: Arc::new(FakeInfra::none()),
            deployer: Arc::new(SpyDeployer::succeeding("production")),
            backend: Arc::new(ScriptedAssessmentBackend::healthy(risk)),
            config: fast_config(),
        }
    }

    fn pipeline(&self) -> Pipeline {
        let collaborators = Collaborators {
            repository: self.repository.clone(),
            analyzer: self.analyzer.clone(),
            scanner: self.scanner.clone(),
            tests: self.tests.clone(),
            infra: self.infra.clone(),
            deployer: self.deployer.clone(),
            assessment: self.backend.clone(),
        };
        Pipeline::new(collaborators, self.config.clone())
    }

    async fn run(&self) -> RunReport {
        self.pipeline().run(REPO, "main").await
    }
}

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.calls.acquisition = CallPolicy::new(5_000, 2, 1);
    config.calls.stages = CallPolicy::new(5_000, 2, 1);
    config.calls.assessment = CallPolicy::new(5_000, 1, 1);
    config
}

fn high_finding() -> SecurityFinding {
    SecurityFinding {
        id: "CVE-2025-1234".into(),
        title: "request smuggling".into(),
        severity: Severity::High,
        package: Some("http-parser".into()),
    }
}

fn outcome(report: &RunReport, kind: StageKind) -> StageOutcome {
    report
        .outcome(kind)
        .unwrap_or_else(|| panic!("stage {kind} missing from report"))
}

fn reason(report: &RunReport, kind: StageKind) -> Option<String> {
    report.stage(kind).and_then(|s| s.result.reason.clone())
}

fn assert_finalized(report: &RunReport) {
    assert!(report.completed_at >= report.identity.started_at);
    let json = serde_json::to_value(report).unwrap();
    assert!(json["completed_at"].is_string());
    assert!(json["success"].is_boolean());
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Clean repository, risk 1: every stage passes, infra skipped, deployed once.
#[tokio::test]
async fn test_clean_repository_deploys() {
    let h = Harness::clean(1);
    let report = h.run().await;

    assert!(report.success, "report: {report:#?}");
    assert!(report.error.is_none());
    assert_eq!(outcome(&report, StageKind::Analysis), StageOutcome::Passed);
    assert_eq!(outcome(&report, StageKind::SecurityScan), StageOutcome::Passed);
    assert_eq!(outcome(&report, StageKind::Testing), StageOutcome::Passed);
    assert_eq!(
        outcome(&report, StageKind::InfraValidation),
        StageOutcome::Skipped
    );
    assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Passed);
    assert_eq!(h.deployer.deploy_calls(), 1);

    let kinds: Vec<StageKind> = report.stages.iter().map(|s| s.kind()).collect();
    assert_eq!(kinds, StageKind::ORDER.to_vec());

    assert!(matches!(report.gate, Some(GateDecision::Approved { .. })));
    let deployment = report.stage(StageKind::Deployment).unwrap();
    assert_eq!(deployment.result.metric_u64("risk_level"), Some(1));
    assert_eq!(deployment.result.metric_u64("risk_threshold"), Some(3));
    assert!(report.ai_summary.is_some());
    assert_finalized(&report);
}

/// One high finding passes the scan, but risk 4 exceeds the default threshold.
#[tokio::test]
async fn test_high_risk_blocks_deployment() {
    let mut h = Harness::clean(4);
    h.scanner = Arc::new(FakeScanner::returning(SecurityScanOutput {
        findings: vec![high_finding()],
    }));
    let report = h.run().await;

    assert_eq!(outcome(&report, StageKind::Analysis), StageOutcome::Passed);
    assert_eq!(outcome(&report, StageKind::SecurityScan), StageOutcome::Passed);
    assert_eq!(outcome(&report, StageKind::Testing), StageOutcome::Passed);
    assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Failed);
    assert_eq!(
        reason(&report, StageKind::Deployment).as_deref(),
        Some(REASON_RISK_EXCEEDED)
    );
    assert!(!report.success);
    assert!(report.error.is_none(), "gate rejection is not a fatal error");
    assert_eq!(h.deployer.deploy_calls(), 0);
    assert_eq!(h.backend.calls(AssessmentTask::SecurityReview), 1);
    assert_finalized(&report);
}

/// Testing keeps failing transiently: the run aborts with a fatal error.
#[tokio::test]
async fn test_transient_testing_failure_is_fatal() {
    let mut h = Harness::clean(0);
    h.tests = Arc::new(FakeTestRunner::failing(CollaboratorError::transient(
        "pytest",
        "connection reset by peer",
    )));
    let report = h.run().await;

    assert!(!report.success);
    let error = report.error.as_ref().expect("fatal error recorded");
    assert_eq!(error.code, "stage_failed");
    assert_eq!(error.stage, Some(StageKind::Testing));
    assert!(error.detail.contains("pytest"));

    // Initial attempt plus two retries.
    assert_eq!(h.tests.calls(), 3);

    let testing = report.stage(StageKind::Testing).unwrap();
    assert_eq!(testing.outcome(), StageOutcome::Failed);
    assert!(testing.assessment.is_none());
    assert!(testing.result.error.as_deref().unwrap().contains("connection reset"));

    assert!(report.stage(StageKind::InfraValidation).is_none());
    assert!(report.stage(StageKind::Deployment).is_none());
    assert_eq!(h.deployer.plan_calls(), 0);
    assert_eq!(h.deployer.deploy_calls(), 0);
    assert!(report.ai_summary.is_none());
    assert!(report.log.iter().any(|l| l.level == LogLevel::Error));
    assert_finalized(&report);
}

// ---------------------------------------------------------------------------
// Gate properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_risk_threshold_sweep() {
    for threshold in 0..=5u8 {
        for risk in 0..=5u8 {
            let mut h = Harness::clean(risk);
            h.config.risk_threshold = threshold;
            let report = h.run().await;

            if risk <= threshold {
                assert_eq!(
                    h.deployer.deploy_calls(),
                    1,
                    "risk {risk} threshold {threshold}"
                );
                assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Passed);
                assert!(report.success);
            } else {
                assert_eq!(
                    h.deployer.deploy_calls(),
                    0,
                    "risk {risk} threshold {threshold}"
                );
                assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Failed);
                assert!(!report.success);
            }
        }
    }
}

/// A failed required stage blocks deployment even at risk 0.
#[tokio::test]
async fn test_failed_stage_blocks_deployment_at_zero_risk() {
    let failing_stages: Vec<Box<dyn Fn(&mut Harness)>> = vec![
        Box::new(|h: &mut Harness| {
            h.analyzer = Arc::new(FakeAnalyzer::returning(AnalysisOutput {
                issues: vec![CodeIssue {
                    rule: "E999".into(),
                    message: "syntax error".into(),
                    path: Some("app.py".into()),
                    line: Some(1),
                    severity: Severity::Critical,
                }],
            }))
        }),
        Box::new(|h: &mut Harness| {
            h.scanner = Arc::new(FakeScanner::returning(SecurityScanOutput {
                findings: vec![SecurityFinding {
                    severity: Severity::Critical,
                    ..high_finding()
                }],
            }))
        }),
        Box::new(|h: &mut Harness| {
            h.tests = Arc::new(FakeTestRunner::returning(TestOutput {
                passed: 40,
                failed: 2,
                coverage: 0.8,
            }))
        }),
    ];

    for make_failing in failing_stages {
        let mut h = Harness::clean(0);
        make_failing(&mut h);
        let report = h.run().await;

        assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Skipped);
        assert_eq!(
            reason(&report, StageKind::Deployment).as_deref(),
            Some(REASON_UPSTREAM_FAILED)
        );
        assert!(matches!(
            report.gate,
            Some(GateDecision::UpstreamFailed { .. })
        ));
        assert!(!report.success);
        assert!(report.error.is_none());
        assert_eq!(h.deployer.deploy_calls(), 0);
        assert_eq!(h.deployer.plan_calls(), 0);
        assert_eq!(h.backend.calls(AssessmentTask::DeploymentRiskReview), 0);
    }
}

/// A response without `risk_level` blocks deployment; nothing is defaulted.
#[tokio::test]
async fn test_malformed_risk_blocks_deployment() {
    let mut h = Harness::clean(0);
    h.backend = Arc::new(ScriptedAssessmentBackend::healthy(0).only(
        AssessmentTask::DeploymentRiskReview,
        Ok(json!({"concerns": [], "analysis": "looks fine"})),
    ));
    let report = h.run().await;

    assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Failed);
    assert_eq!(
        reason(&report, StageKind::Deployment).as_deref(),
        Some(REASON_RISK_UNAVAILABLE)
    );
    match &report.gate {
        Some(GateDecision::RiskUnavailable { detail }) => {
            assert!(detail.contains("malformed"), "detail: {detail}")
        }
        other => panic!("unexpected gate decision: {other:?}"),
    }
    let deployment = report.stage(StageKind::Deployment).unwrap();
    assert!(deployment.assessment.is_none());
    assert!(deployment.result.metric_u64("risk_level").is_none());
    assert_eq!(h.deployer.deploy_calls(), 0);
    // Malformed responses are not retried.
    assert_eq!(h.backend.calls(AssessmentTask::DeploymentRiskReview), 1);
    assert!(!report.success);
}

#[tokio::test]
async fn test_out_of_range_risk_blocks_deployment() {
    let mut h = Harness::clean(0);
    h.backend = Arc::new(ScriptedAssessmentBackend::healthy(0).only(
        AssessmentTask::DeploymentRiskReview,
        Ok(json!({"risk_level": 2.5})),
    ));
    let report = h.run().await;
    assert_eq!(
        reason(&report, StageKind::Deployment).as_deref(),
        Some(REASON_RISK_UNAVAILABLE)
    );
    assert_eq!(h.deployer.deploy_calls(), 0);
}

/// Backend outage at the gate blocks deployment after the retry budget.
#[tokio::test]
async fn test_provider_outage_at_gate_blocks_deployment() {
    let mut h = Harness::clean(0);
    h.backend = Arc::new(ScriptedAssessmentBackend::healthy(0).only(
        AssessmentTask::DeploymentRiskReview,
        Err(AssessmentError::BackendUnavailable("503".into())),
    ));
    let report = h.run().await;

    assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Failed);
    assert_eq!(h.deployer.deploy_calls(), 0);
    assert_eq!(h.backend.calls(AssessmentTask::DeploymentRiskReview), 2);
    assert!(report
        .log
        .iter()
        .any(|l| l.level == LogLevel::Warn && l.stage == Some(StageKind::Deployment)));
}

#[tokio::test]
async fn test_deployer_reported_failure() {
    let mut h = Harness::clean(1);
    h.deployer = Arc::new(SpyDeployer::reporting_failure("production"));
    let report = h.run().await;

    assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Failed);
    assert!(reason(&report, StageKind::Deployment)
        .unwrap()
        .starts_with("deployment reported failure"));
    assert_eq!(h.deployer.deploy_calls(), 1);
    assert!(!report.success);
    assert!(report.error.is_none());
}

/// `deploy()` is irreversible and never retried, even on transient errors.
#[tokio::test]
async fn test_deploy_error_not_retried() {
    let mut h = Harness::clean(1);
    h.deployer = Arc::new(SpyDeployer::new(
        Script::always(Ok(DeploymentPlan {
            environment: "production".into(),
            ..Default::default()
        })),
        Script::always(Err(CollaboratorError::transient(
            "kubectl",
            "connection refused",
        ))),
    ));
    let report = h.run().await;

    assert_eq!(h.deployer.deploy_calls(), 1);
    let error = report.error.as_ref().unwrap();
    assert_eq!(error.code, "stage_failed");
    assert_eq!(error.stage, Some(StageKind::Deployment));
    let deployment = report.stage(StageKind::Deployment).unwrap();
    assert_eq!(deployment.outcome(), StageOutcome::Failed);
    assert!(deployment.assessment.is_some());
    assert!(!report.success);
}

#[tokio::test]
async fn test_plan_failure_is_fatal_before_risk_request() {
    let mut h = Harness::clean(1);
    h.deployer = Arc::new(SpyDeployer::new(
        Script::always(Err(CollaboratorError::permanent(
            "helm",
            "chart not found",
        ))),
        Script::always(Ok(DeploymentOutput {
            success: true,
            environment: "production".into(),
            detail: None,
        })),
    ));
    let report = h.run().await;

    assert_eq!(report.error.as_ref().unwrap().code, "stage_failed");
    assert_eq!(h.deployer.plan_calls(), 1);
    assert_eq!(h.deployer.deploy_calls(), 0);
    assert_eq!(h.backend.calls(AssessmentTask::DeploymentRiskReview), 0);
    assert!(report.gate.is_none());
}

/// The risk request sees the plan and the testing/infra entries.
#[tokio::test]
async fn test_risk_request_includes_plan_and_evidence() {
    let h = Harness::clean(1);
    h.run().await;
    let request = h
        .backend
        .last_request(AssessmentTask::DeploymentRiskReview)
        .unwrap();
    assert_eq!(request.input["plan"]["environment"], "production");
    assert_eq!(request.input["testing"]["stage_kind"], "testing");
    assert_eq!(request.input["infra_validation"]["outcome"], "skipped");
}

// ---------------------------------------------------------------------------
// Infrastructure validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_no_iac_skips_without_assessment() {
    let h = Harness::clean(1);
    let report = h.run().await;

    let infra = report.stage(StageKind::InfraValidation).unwrap();
    assert_eq!(infra.outcome(), StageOutcome::Skipped);
    assert_eq!(infra.result.reason.as_deref(), Some(REASON_NO_IAC));
    assert!(infra.assessment.is_none());
    assert_eq!(h.backend.calls(AssessmentTask::InfraReview), 0);
    assert_eq!(h.infra.validate_calls(), 0);
}

#[tokio::test]
async fn test_iac_present_is_validated_and_reviewed() {
    let mut h = Harness::clean(1);
    h.infra = Arc::new(FakeInfra::valid(&["infra/main.tf", "k8s/deploy.yaml"]));
    let report = h.run().await;

    let infra = report.stage(StageKind::InfraValidation).unwrap();
    assert_eq!(infra.outcome(), StageOutcome::Passed);
    assert_eq!(infra.result.metric_u64("iac_files"), Some(2));
    assert!(matches!(infra.assessment, Some(Assessment::InfraReview(_))));
    assert_eq!(h.infra.validate_calls(), 1);
    assert_eq!(h.backend.calls(AssessmentTask::InfraReview), 1);
    assert!(report.success);
}

#[tokio::test]
async fn test_missing_iac_fails_when_skip_forbidden() {
    let mut h = Harness::clean(0);
    h.config.policy.allow_infra_skip = false;
    let report = h.run().await;

    assert_eq!(
        outcome(&report, StageKind::InfraValidation),
        StageOutcome::Failed
    );
    assert_eq!(outcome(&report, StageKind::Deployment), StageOutcome::Skipped);
    assert_eq!(h.deployer.deploy_calls(), 0);
}

// ---------------------------------------------------------------------------
// Advisory assessments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_provider_outage_on_stage_is_advisory() {
    let mut h = Harness::clean(1);
    h.analyzer = Arc::new(FakeAnalyzer::returning(AnalysisOutput {
        issues: vec![CodeIssue {
            rule: "W291".into(),
            message: "trailing whitespace".into(),
            path: None,
            line: None,
            severity: Severity::Low,
        }],
    }));
    h.backend = Arc::new(ScriptedAssessmentBackend::healthy(1).only(
        AssessmentTask::CodeReview,
        Err(AssessmentError::Timeout { limit_ms: 5_000 }),
    ));
    let report = h.run().await;

    let analysis = report.stage(StageKind::Analysis).unwrap();
    assert_eq!(analysis.outcome(), StageOutcome::Passed);
    assert!(analysis.assessment.is_none());
    assert!(analysis.assessment_error.as_deref().unwrap().contains("timed out"));
    assert!(report
        .log
        .iter()
        .any(|l| l.level == LogLevel::Warn && l.stage == Some(StageKind::Analysis)));

    assert!(report.success);
    assert_eq!(h.deployer.deploy_calls(), 1);
}

#[tokio::test]
async fn test_zero_findings_skip_backend_reviews() {
    let h = Harness::clean(1);
    let report = h.run().await;

    assert_eq!(h.backend.calls(AssessmentTask::CodeReview), 0);
    assert_eq!(h.backend.calls(AssessmentTask::SecurityReview), 0);
    match &report.stage(StageKind::SecurityScan).unwrap().assessment {
        Some(Assessment::SecurityReview(review)) => {
            assert_eq!(review.risk_level.map(|r| r.value()), Some(0));
        }
        other => panic!("unexpected assessment: {other:?}"),
    }
}

#[tokio::test]
async fn test_summary_failure_keeps_success() {
    let mut h = Harness::clean(1);
    h.backend = Arc::new(ScriptedAssessmentBackend::healthy(1).only(
        AssessmentTask::Summary,
        Err(AssessmentError::BackendUnavailable("overloaded".into())),
    ));
    let report = h.run().await;

    assert!(report.success);
    assert!(report.ai_summary.is_none());
    assert!(report
        .log
        .iter()
        .any(|l| l.level == LogLevel::Warn && l.message.contains("summary unavailable")));
}

// ---------------------------------------------------------------------------
// Retries, acquisition and deadline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_transient_stage_error_recovers_within_budget() {
    let mut h = Harness::clean(1);
    h.tests = Arc::new(FakeTestRunner::new(Script::new(vec![
        Err(CollaboratorError::transient("pytest", "worker lost")),
        Ok(TestOutput {
            passed: 12,
            failed: 0,
            coverage: 0.9,
        }),
    ])));
    let report = h.run().await;

    assert!(report.success);
    assert_eq!(h.tests.calls(), 2);
    assert_eq!(outcome(&report, StageKind::Testing), StageOutcome::Passed);
}

#[tokio::test]
async fn test_permanent_stage_error_not_retried() {
    let mut h = Harness::clean(1);
    h.scanner = Arc::new(FakeScanner::failing(CollaboratorError::permanent(
        "trivy",
        "unsupported lockfile",
    )));
    let report = h.run().await;

    assert_eq!(h.scanner.calls(), 1);
    assert_eq!(report.error.as_ref().unwrap().stage, Some(StageKind::SecurityScan));
    assert_eq!(h.tests.calls(), 0);
}

#[tokio::test]
async fn test_acquisition_failure_runs_no_stages() {
    let mut h = Harness::clean(1);
    let repository = Arc::new(FailingRepository::new(RepositoryError::AuthFailure(
        REPO.into(),
    )));
    h.repository = repository.clone();
    let report = h.run().await;

    assert!(!report.success);
    assert!(report.stages.is_empty());
    assert_eq!(report.error.as_ref().unwrap().code, "acquisition_failed");
    assert_eq!(repository.attempts(), 1);
    assert_eq!(h.analyzer.calls(), 0);
    assert_eq!(h.backend.total_calls(), 0);
    assert_finalized(&report);
}

#[tokio::test]
async fn test_acquisition_network_error_retried() {
    let mut h = Harness::clean(1);
    let repository = Arc::new(FailingRepository::new(RepositoryError::NetworkError(
        "connection timed out".into(),
    )));
    h.repository = repository.clone();
    let report = h.run().await;

    assert_eq!(repository.attempts(), 3);
    assert_eq!(report.error.as_ref().unwrap().code, "acquisition_failed");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_still_finalizes() {
    let mut h = Harness::clean(1);
    h.config = h.config.clone().with_run_deadline(Duration::from_secs(2));
    h.config.calls.stages = CallPolicy::new(60_000, 0, 1);
    h.tests = Arc::new(FakeTestRunner::new(
        Script::always(Ok(TestOutput {
            passed: 1,
            failed: 0,
            coverage: 1.0,
        }))
        .with_delay(Duration::from_secs(30)),
    ));
    let report = h.run().await;

    assert!(!report.success);
    assert_eq!(report.error.as_ref().unwrap().code, "deadline_exceeded");
    // Stages completed before the deadline stay committed; the interrupted
    // one is absent rather than half-written.
    assert_eq!(outcome(&report, StageKind::Analysis), StageOutcome::Passed);
    assert!(report.stage(StageKind::Testing).is_none());
    assert_eq!(h.deployer.deploy_calls(), 0);
    assert_finalized(&report);
}

/// A deadline too large for `Instant` still yields a finalized report.
#[tokio::test]
async fn test_oversized_deadline_still_finalizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("riskgate.toml");
    std::fs::write(&path, "run_deadline_secs = 9223372036854775807\n").unwrap();
    assert!(load_config(&path).is_err());

    let mut h = Harness::clean(1);
    h.config.run_deadline_secs = u64::MAX;
    assert!(Pipeline::try_new(
        Collaborators {
            repository: h.repository.clone(),
            analyzer: h.analyzer.clone(),
            scanner: h.scanner.clone(),
            tests: h.tests.clone(),
            infra: h.infra.clone(),
            deployer: h.deployer.clone(),
            assessment: h.backend.clone(),
        },
        h.config.clone(),
    )
    .is_err());

    let report = h.run().await;
    assert!(report.success, "report: {report:#?}");
    assert!(report.error.is_none());
    assert_eq!(h.deployer.deploy_calls(), 1);
    assert_finalized(&report);
}

// ---------------------------------------------------------------------------
// Report shape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_identical_outputs_yield_identical_shape() {
    let first = Harness::clean(2).run().await;
    let second = Harness::clean(2).run().await;

    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(first.stages, second.stages);
    assert_eq!(first.gate, second.gate);
    assert_eq!(first.success, second.success);
    assert_eq!(first.shape_digest(), second.shape_digest());
}

#[tokio::test]
async fn test_batch_runs_are_isolated() {
    let h = Harness::clean(1);
    let pipeline = h.pipeline();
    let reports = pipeline
        .run_batch(
            vec![
                RunRequest::new(REPO, "main"),
                RunRequest::new(REPO, "release/1.2"),
                RunRequest::new(REPO, "feature/cart"),
            ],
            3,
        )
        .await;

    assert_eq!(reports.len(), 3);
    let branches: Vec<&str> = reports.iter().map(|r| r.identity.branch.as_str()).collect();
    assert_eq!(branches, vec!["main", "release/1.2", "feature/cart"]);
    for report in &reports {
        assert_eq!(report.stages.len(), 5);
        assert!(report.success);
    }
    assert_eq!(h.deployer.deploy_calls(), 3);
}
