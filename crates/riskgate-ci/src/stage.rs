//! Stage executors.
//!
//! Each executor wraps one collaborator call and normalizes its output into a
//! [`StageResult`]. A stage that ran and found problems is a `Failed` result;
//! only a collaborator that could not run at all returns an error.

use std::sync::Arc;

use async_trait::async_trait;
use riskgate_core::domain::{
    AnalysisOutput, CollaboratorError, DeploymentOutput, InfraEvidence, RiskLevel,
    SecurityScanOutput, Severity, StageKind, StageOutcome, StageResult, TestEvidence,
};
use riskgate_core::{
    CodeAnalyzer, InfraValidator, SecurityScanner, SourceHandle, StagePolicy, TestRunner,
};

/// Reason recorded when InfraValidation has nothing to validate.
pub const REASON_NO_IAC: &str = "no infrastructure-as-code files found";

/// Reason recorded when the deployer reports an unsuccessful rollout.
pub const REASON_DEPLOY_FAILED: &str = "deployment reported failure";

/// One pre-deployment stage.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn execute(&self, source: &SourceHandle) -> Result<StageResult, CollaboratorError>;
}

fn payload<T: serde::Serialize>(
    kind: StageKind,
    value: &T,
) -> Result<serde_json::Value, CollaboratorError> {
    serde_json::to_value(value)
        .map_err(|e| CollaboratorError::permanent(kind.name(), format!("encode payload: {e}")))
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

pub struct AnalysisStage {
    analyzer: Arc<dyn CodeAnalyzer>,
    max_errors: u32,
}

impl AnalysisStage {
    pub fn new(analyzer: Arc<dyn CodeAnalyzer>, policy: &StagePolicy) -> Self {
        Self {
            analyzer,
            max_errors: policy.max_analysis_errors,
        }
    }

    pub fn normalize(&self, output: &AnalysisOutput) -> Result<StageResult, CollaboratorError> {
        let errors = output.issues.iter().filter(|i| i.is_error()).count();
        let warnings = output.issues.len() - errors;

        let mut result = StageResult::new(StageKind::Analysis, StageOutcome::Passed)
            .with_metric("issues_found", output.issues.len())
            .with_metric("errors", errors)
            .with_metric("warnings", warnings)
            .with_payload(payload(StageKind::Analysis, output)?);

        if errors > self.max_errors as usize {
            result.outcome = StageOutcome::Failed;
            result.reason = Some(format!(
                "{errors} error-severity issues exceed limit of {}",
                self.max_errors
            ));
        }
        Ok(result)
    }
}

#[async_trait]
impl StageExecutor for AnalysisStage {
    fn kind(&self) -> StageKind {
        StageKind::Analysis
    }

    async fn execute(&self, source: &SourceHandle) -> Result<StageResult, CollaboratorError> {
        let output = self.analyzer.analyze(source).await?;
        self.normalize(&output)
    }
}

// ---------------------------------------------------------------------------
// Security scan
// ---------------------------------------------------------------------------

pub struct SecurityStage {
    scanner: Arc<dyn SecurityScanner>,
    fail_severity: Severity,
}

impl SecurityStage {
    pub fn new(scanner: Arc<dyn SecurityScanner>, policy: &StagePolicy) -> Self {
        Self {
            scanner,
            fail_severity: policy.security_fail_severity,
        }
    }

    pub fn normalize(&self, output: &SecurityScanOutput) -> Result<StageResult, CollaboratorError> {
        let mut result = StageResult::new(StageKind::SecurityScan, StageOutcome::Passed)
            .with_metric("vulnerabilities", output.findings.len())
            .with_metric("critical", output.count(Severity::Critical))
            .with_metric("high", output.count(Severity::High))
            .with_metric("medium", output.count(Severity::Medium))
            .with_metric("low", output.count(Severity::Low))
            .with_payload(payload(StageKind::SecurityScan, output)?);

        let blocking = output
            .findings
            .iter()
            .filter(|f| f.severity >= self.fail_severity)
            .count();
        if blocking > 0 {
            result.outcome = StageOutcome::Failed;
            result.reason = Some(format!(
                "{blocking} findings at or above {} severity",
                self.fail_severity
            ));
        }
        Ok(result)
    }
}

#[async_trait]
impl StageExecutor for SecurityStage {
    fn kind(&self) -> StageKind {
        StageKind::SecurityScan
    }

    async fn execute(&self, source: &SourceHandle) -> Result<StageResult, CollaboratorError> {
        let output = self.scanner.scan(source).await?;
        self.normalize(&output)
    }
}

// ---------------------------------------------------------------------------
// Testing
// ---------------------------------------------------------------------------

pub struct TestingStage {
    runner: Arc<dyn TestRunner>,
    analyzer: Arc<dyn CodeAnalyzer>,
    min_coverage: f64,
}

impl TestingStage {
    /// `analyzer` supplies the recent changes forwarded to the test-gap review.
    pub fn new(
        runner: Arc<dyn TestRunner>,
        analyzer: Arc<dyn CodeAnalyzer>,
        policy: &StagePolicy,
    ) -> Self {
        Self {
            runner,
            analyzer,
            min_coverage: policy.min_coverage,
        }
    }

    pub fn normalize(&self, evidence: &TestEvidence) -> Result<StageResult, CollaboratorError> {
        let results = &evidence.results;
        if !(0.0..=1.0).contains(&results.coverage) {
            return Err(CollaboratorError::permanent(
                "test-runner",
                format!("coverage {} outside [0, 1]", results.coverage),
            ));
        }

        let mut result = StageResult::new(StageKind::Testing, StageOutcome::Passed)
            .with_metric("passed", results.passed)
            .with_metric("failed", results.failed)
            .with_metric("coverage", results.coverage)
            .with_payload(payload(StageKind::Testing, evidence)?);

        if results.failed > 0 {
            result.outcome = StageOutcome::Failed;
            result.reason = Some(format!("{} tests failed", results.failed));
        } else if results.coverage < self.min_coverage {
            result.outcome = StageOutcome::Failed;
            result.reason = Some(format!(
                "coverage {:.2} below minimum {:.2}",
                results.coverage, self.min_coverage
            ));
        }
        Ok(result)
    }
}

#[async_trait]
impl StageExecutor for TestingStage {
    fn kind(&self) -> StageKind {
        StageKind::Testing
    }

    async fn execute(&self, source: &SourceHandle) -> Result<StageResult, CollaboratorError> {
        let results = self.runner.run_tests(source).await?;
        let changes = self.analyzer.recent_changes(source).await?;
        self.normalize(&TestEvidence { results, changes })
    }
}

// ---------------------------------------------------------------------------
// Infrastructure validation
// ---------------------------------------------------------------------------

pub struct InfraStage {
    validator: Arc<dyn InfraValidator>,
    allow_skip: bool,
}

impl InfraStage {
    pub fn new(validator: Arc<dyn InfraValidator>, policy: &StagePolicy) -> Self {
        Self {
            validator,
            allow_skip: policy.allow_infra_skip,
        }
    }
}

#[async_trait]
impl StageExecutor for InfraStage {
    fn kind(&self) -> StageKind {
        StageKind::InfraValidation
    }

    async fn execute(&self, source: &SourceHandle) -> Result<StageResult, CollaboratorError> {
        let kind = StageKind::InfraValidation;
        let files = self.validator.find_iac_files(source).await?;
        if files.is_empty() {
            // No payload: nothing for the provider to review.
            let result = if self.allow_skip {
                StageResult::skipped(kind, REASON_NO_IAC)
            } else {
                StageResult::new(kind, StageOutcome::Failed).with_reason(REASON_NO_IAC)
            };
            return Ok(result.with_metric("iac_files", 0));
        }

        let validation = self.validator.validate(source, &files).await?;
        let evidence = InfraEvidence {
            files: files.iter().map(|f| f.display().to_string()).collect(),
            validation,
        };

        let mut result = StageResult::new(kind, StageOutcome::Passed)
            .with_metric("iac_files", files.len())
            .with_metric("valid", evidence.validation.valid)
            .with_metric("errors", evidence.validation.errors.len())
            .with_payload(payload(kind, &evidence)?);
        if !evidence.validation.valid {
            result.outcome = StageOutcome::Failed;
            result.reason = Some("infrastructure validation failed".to_string());
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Deployment stage result for a gate rejection or an upstream skip.
pub fn deployment_blocked(
    outcome: StageOutcome,
    reason: &str,
    risk_level: Option<RiskLevel>,
    threshold: RiskLevel,
) -> StageResult {
    let mut result = StageResult::new(StageKind::Deployment, outcome)
        .with_reason(reason)
        .with_metric("risk_threshold", threshold.value())
        .with_metric("executed", false);
    if let Some(level) = risk_level {
        result = result.with_metric("risk_level", level.value());
    }
    result
}

/// Deployment stage result after the deployer ran.
pub fn deployment_executed(
    output: &DeploymentOutput,
    plan: serde_json::Value,
    risk_level: RiskLevel,
    threshold: RiskLevel,
) -> StageResult {
    let outcome = if output.success {
        StageOutcome::Passed
    } else {
        StageOutcome::Failed
    };
    let mut result = StageResult::new(StageKind::Deployment, outcome)
        .with_metric("risk_level", risk_level.value())
        .with_metric("risk_threshold", threshold.value())
        .with_metric("executed", true)
        .with_payload(serde_json::json!({ "plan": plan, "output": output }));
    if !output.success {
        result.reason = Some(match &output.detail {
            Some(detail) => format!("{REASON_DEPLOY_FAILED}: {detail}"),
            None => REASON_DEPLOY_FAILED.to_string(),
        });
    }
    result
}
