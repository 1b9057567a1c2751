//! Assessment provider: task-typed access to the language-model backend.
//!
//! Every operation builds a structured [`AssessmentRequest`], sends it through
//! the backend under the assessment [`CallPolicy`], and validates the JSON
//! response against the schema of the task. A response that does not match
//! is a [`AssessmentError::MalformedResponse`]; nothing is defaulted.

pub mod http;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::collaborators::AssessmentBackend;
use crate::controls::{call_with_policy, CallPolicy};
use crate::domain::{
    AnalysisOutput, Assessment, AssessmentError, AssessmentRequest, AssessmentTask, BuildSummary,
    ChangeSet, CodeReview, DeploymentRisk, InfraEvidence, InfraReview, InfraValidationOutput,
    RiskLevel, SecurityReview, SecurityScanOutput, Severity, StageKind, StageResult, TestEvidence,
    TestGapReview, TestOutput,
};

pub use http::HttpAssessmentBackend;

pub type Result<T> = std::result::Result<T, AssessmentError>;

/// Analysis recorded when a scan produced no findings.
pub const NO_SECURITY_ISSUES: &str = "No security issues found.";

/// Typed front end over an [`AssessmentBackend`].
#[derive(Clone)]
pub struct AssessmentProvider {
    backend: Arc<dyn AssessmentBackend>,
    policy: CallPolicy,
}

impl std::fmt::Debug for AssessmentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssessmentProvider")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl AssessmentProvider {
    pub fn new(backend: Arc<dyn AssessmentBackend>, policy: CallPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Suggest improvements for analysis issues.
    ///
    /// With no issues there is nothing to review and the backend is not called.
    pub async fn code_review(&self, analysis: &AnalysisOutput) -> Result<CodeReview> {
        if analysis.issues.is_empty() {
            return Ok(CodeReview {
                suggestions: Vec::new(),
            });
        }
        self.request(
            AssessmentTask::CodeReview,
            json!({ "issues": analysis.issues }),
        )
        .await
    }

    /// Prioritize security findings.
    ///
    /// With no findings the review is risk 0 and the backend is not called.
    pub async fn security_review(&self, scan: &SecurityScanOutput) -> Result<SecurityReview> {
        if scan.findings.is_empty() {
            return Ok(SecurityReview {
                risk_level: Some(RiskLevel::ZERO),
                critical_issues: 0,
                high_issues: 0,
                medium_issues: 0,
                analysis: NO_SECURITY_ISSUES.to_string(),
            });
        }
        self.request(
            AssessmentTask::SecurityReview,
            json!({
                "findings": scan.findings,
                "counts": {
                    "critical": scan.count(Severity::Critical),
                    "high": scan.count(Severity::High),
                    "medium": scan.count(Severity::Medium),
                    "low": scan.count(Severity::Low),
                },
            }),
        )
        .await
    }

    /// Suggest tests missing for the recent changes.
    pub async fn test_gap_review(
        &self,
        changes: &ChangeSet,
        results: &TestOutput,
    ) -> Result<TestGapReview> {
        self.request(
            AssessmentTask::TestGapReview,
            json!({ "changes": changes, "test_results": results }),
        )
        .await
    }

    /// Review infrastructure-as-code files and their validation result.
    pub async fn infra_review(
        &self,
        files: &[PathBuf],
        validation: &InfraValidationOutput,
    ) -> Result<InfraReview> {
        let files: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
        self.request(
            AssessmentTask::InfraReview,
            json!({ "files": files, "validation": validation }),
        )
        .await
    }

    /// Score deployment risk. Always calls the backend; `risk_level` is
    /// required in the response.
    pub async fn deployment_risk(&self, input: Value) -> Result<DeploymentRisk> {
        self.request(AssessmentTask::DeploymentRiskReview, input).await
    }

    /// Summarize a run from its JSON snapshot.
    pub async fn summary(&self, snapshot: Value) -> Result<BuildSummary> {
        self.request(AssessmentTask::Summary, snapshot).await
    }

    /// Assess a committed stage from its raw payload.
    pub async fn assess_stage(&self, result: &StageResult) -> Result<Assessment> {
        let payload = &result.raw_payload;
        match result.stage_kind {
            StageKind::Analysis => {
                let analysis: AnalysisOutput = payload_as(result.stage_kind, payload)?;
                self.code_review(&analysis).await.map(Assessment::CodeReview)
            }
            StageKind::SecurityScan => {
                let scan: SecurityScanOutput = payload_as(result.stage_kind, payload)?;
                self.security_review(&scan)
                    .await
                    .map(Assessment::SecurityReview)
            }
            StageKind::Testing => {
                let evidence: TestEvidence = payload_as(result.stage_kind, payload)?;
                self.test_gap_review(&evidence.changes, &evidence.results)
                    .await
                    .map(Assessment::TestGapReview)
            }
            StageKind::InfraValidation => {
                let evidence: InfraEvidence = payload_as(result.stage_kind, payload)?;
                let files: Vec<PathBuf> = evidence.files.iter().map(PathBuf::from).collect();
                self.infra_review(&files, &evidence.validation)
                    .await
                    .map(Assessment::InfraReview)
            }
            StageKind::Deployment => self
                .deployment_risk(payload.clone())
                .await
                .map(Assessment::DeploymentRisk),
        }
    }

    async fn request<T: DeserializeOwned>(&self, task: AssessmentTask, input: Value) -> Result<T> {
        let request = AssessmentRequest::new(task, input);
        let backend = &self.backend;
        let response =
            call_with_policy(&self.policy, task.name(), || backend.complete(&request)).await?;
        debug!(task = %task, backend = %backend.name(), "assessment response received");
        validate(task, response)
    }
}

/// Check a backend response against the schema of `task`.
pub fn validate<T: DeserializeOwned>(task: AssessmentTask, response: Value) -> Result<T> {
    serde_json::from_value(response)
        .map_err(|e| AssessmentError::MalformedResponse(format!("{task}: {e}")))
}

fn payload_as<T: DeserializeOwned>(stage: StageKind, payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| AssessmentError::MalformedResponse(format!("{stage} payload: {e}")))
}

/// Backend used when no endpoint is configured.
///
/// Every call fails with `BackendUnavailable`, so stage assessments are
/// absent and the deployment gate stays closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredBackend;

#[async_trait]
impl AssessmentBackend for UnconfiguredBackend {
    async fn complete(&self, _request: &AssessmentRequest) -> Result<Value> {
        Err(AssessmentError::BackendUnavailable(
            "no assessment endpoint configured".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CodeIssue, SecurityFinding, StageOutcome};
    use crate::fakes::ScriptedAssessmentBackend;

    fn provider(backend: Arc<ScriptedAssessmentBackend>) -> AssessmentProvider {
        AssessmentProvider::new(backend, CallPolicy::new(1_000, 1, 1))
    }

    fn issue() -> CodeIssue {
        CodeIssue {
            rule: "W0612".into(),
            message: "unused variable".into(),
            path: Some("app.py".into()),
            line: Some(3),
            severity: Severity::Low,
        }
    }

    #[tokio::test]
    async fn code_review_without_issues_skips_backend() {
        let backend = Arc::new(ScriptedAssessmentBackend::new());
        let review = provider(backend.clone())
            .code_review(&AnalysisOutput::default())
            .await
            .unwrap();
        assert!(review.suggestions.is_empty());
        assert_eq!(backend.calls(AssessmentTask::CodeReview), 0);
    }

    #[tokio::test]
    async fn code_review_with_issues_calls_backend() {
        let backend = Arc::new(ScriptedAssessmentBackend::new().respond(
            AssessmentTask::CodeReview,
            json!({"suggestions": ["Remove the unused variable"]}),
        ));
        let analysis = AnalysisOutput {
            issues: vec![issue()],
        };
        let review = provider(backend.clone())
            .code_review(&analysis)
            .await
            .unwrap();
        assert_eq!(review.suggestions, vec!["Remove the unused variable"]);
        assert_eq!(backend.calls(AssessmentTask::CodeReview), 1);
    }

    #[tokio::test]
    async fn security_review_without_findings_is_risk_zero() {
        let backend = Arc::new(ScriptedAssessmentBackend::new());
        let review = provider(backend.clone())
            .security_review(&SecurityScanOutput::default())
            .await
            .unwrap();
        assert_eq!(review.risk_level, Some(RiskLevel::ZERO));
        assert_eq!(review.analysis, NO_SECURITY_ISSUES);
        assert_eq!(backend.calls(AssessmentTask::SecurityReview), 0);
    }

    #[tokio::test]
    async fn deployment_risk_requires_risk_level() {
        let backend = Arc::new(ScriptedAssessmentBackend::new().respond(
            AssessmentTask::DeploymentRiskReview,
            json!({"concerns": ["schema migration"], "analysis": "moderate"}),
        ));
        let err = provider(backend.clone())
            .deployment_risk(json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::MalformedResponse(_)));
        // Malformed responses are not retried.
        assert_eq!(backend.calls(AssessmentTask::DeploymentRiskReview), 1);
    }

    #[tokio::test]
    async fn backend_outage_is_retried_then_surfaced() {
        let backend = Arc::new(ScriptedAssessmentBackend::new().fail(
            AssessmentTask::Summary,
            AssessmentError::BackendUnavailable("503".into()),
        ));
        let err = provider(backend.clone())
            .summary(json!({"stages": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, AssessmentError::BackendUnavailable(_)));
        assert_eq!(backend.calls(AssessmentTask::Summary), 2);
    }

    #[tokio::test]
    async fn assess_stage_dispatches_by_kind() {
        let backend = Arc::new(ScriptedAssessmentBackend::new().respond(
            AssessmentTask::TestGapReview,
            json!({"suggested_tests": ["test_refund_rounding"], "analysis": "gap in refunds"}),
        ));
        let evidence = TestEvidence {
            results: TestOutput {
                passed: 10,
                failed: 0,
                coverage: 0.9,
            },
            changes: ChangeSet {
                files: vec!["billing/refund.py".into()],
                summary: None,
            },
        };
        let result = StageResult::new(StageKind::Testing, StageOutcome::Passed)
            .with_payload(serde_json::to_value(&evidence).unwrap());

        let assessment = provider(backend).assess_stage(&result).await.unwrap();
        match assessment {
            Assessment::TestGapReview(review) => {
                assert_eq!(review.suggested_tests, vec!["test_refund_rounding"]);
            }
            other => panic!("unexpected assessment: {other:?}"),
        }
    }

    #[tokio::test]
    async fn security_payload_with_findings_reaches_backend() {
        let backend = Arc::new(ScriptedAssessmentBackend::new().respond(
            AssessmentTask::SecurityReview,
            json!({"risk_level": 3, "high_issues": 1, "analysis": "patch openssl"}),
        ));
        let scan = SecurityScanOutput {
            findings: vec![SecurityFinding {
                id: "CVE-2024-0001".into(),
                title: "heap overflow".into(),
                severity: Severity::High,
                package: Some("openssl".into()),
            }],
        };
        let result = StageResult::new(StageKind::SecurityScan, StageOutcome::Passed)
            .with_payload(serde_json::to_value(&scan).unwrap());

        let assessment = provider(backend.clone()).assess_stage(&result).await.unwrap();
        let Assessment::SecurityReview(review) = assessment else {
            panic!("expected security review");
        };
        assert_eq!(review.high_issues, 1);
        assert_eq!(review.risk_level, RiskLevel::new(3));
        let sent = backend.last_request(AssessmentTask::SecurityReview).unwrap();
        assert_eq!(sent.input["counts"]["high"], 1);
    }

    #[tokio::test]
    async fn unconfigured_backend_is_unavailable() {
        let provider =
            AssessmentProvider::new(Arc::new(UnconfiguredBackend), CallPolicy::new(100, 0, 1));
        let err = provider.deployment_risk(json!({})).await.unwrap_err();
        assert!(matches!(err, AssessmentError::BackendUnavailable(_)));
    }
}
