//! Pipeline stages and their normalized results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Static code analysis.
    Analysis,
    /// Dependency and source security scan.
    SecurityScan,
    /// Test suite execution.
    Testing,
    /// Infrastructure-as-code validation (conditional).
    InfraValidation,
    /// Deployment (gated).
    Deployment,
}

impl StageKind {
    /// All stages in execution order.
    pub const ORDER: [StageKind; 5] = [
        StageKind::Analysis,
        StageKind::SecurityScan,
        StageKind::Testing,
        StageKind::InfraValidation,
        StageKind::Deployment,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Analysis => "analysis",
            StageKind::SecurityScan => "security_scan",
            StageKind::Testing => "testing",
            StageKind::InfraValidation => "infra_validation",
            StageKind::Deployment => "deployment",
        }
    }

    /// Whether the stage may legitimately end up `Skipped`.
    pub fn may_skip(&self) -> bool {
        matches!(self, StageKind::InfraValidation | StageKind::Deployment)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Stage-specific counters keyed by name (`issues_found`, `coverage`, ...).
pub type StageMetrics = BTreeMap<String, serde_json::Value>;

/// Normalized result of one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageResult {
    pub stage_kind: StageKind,

    pub outcome: StageOutcome,

    pub metrics: StageMetrics,

    /// Structured collaborator output forwarded to the assessment provider.
    #[serde(default)]
    pub raw_payload: serde_json::Value,

    /// Why the stage was skipped or failed by policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Collaborator error detail when the executor itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    /// Create a new stage result with an empty payload.
    pub fn new(stage_kind: StageKind, outcome: StageOutcome) -> Self {
        Self {
            stage_kind,
            outcome,
            metrics: StageMetrics::new(),
            raw_payload: serde_json::Value::Null,
            reason: None,
            error: None,
        }
    }

    /// A skipped stage with its reason.
    pub fn skipped(stage_kind: StageKind, reason: impl Into<String>) -> Self {
        Self::new(stage_kind, StageOutcome::Skipped).with_reason(reason)
    }

    /// A stage whose executor failed outright.
    pub fn errored(stage_kind: StageKind, error: impl std::fmt::Display) -> Self {
        let mut result = Self::new(stage_kind, StageOutcome::Failed);
        result.error = Some(error.to_string());
        result
    }

    /// Add a metric.
    pub fn with_metric(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(name.to_string(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.raw_payload = payload;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Whether this stage passed.
    pub fn passed(&self) -> bool {
        self.outcome == StageOutcome::Passed
    }

    /// Read an integer metric.
    pub fn metric_u64(&self, name: &str) -> Option<u64> {
        self.metrics.get(name).and_then(|v| v.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(StageKind::Analysis.name(), "analysis");
        assert_eq!(StageKind::SecurityScan.name(), "security_scan");
        assert_eq!(StageKind::Testing.name(), "testing");
        assert_eq!(StageKind::InfraValidation.name(), "infra_validation");
        assert_eq!(StageKind::Deployment.name(), "deployment");
    }

    #[test]
    fn test_stage_order_matches_ordering() {
        let mut sorted = StageKind::ORDER;
        sorted.sort();
        assert_eq!(sorted, StageKind::ORDER);
    }

    #[test]
    fn test_only_infra_and_deployment_may_skip() {
        let skippable: Vec<_> = StageKind::ORDER.iter().filter(|k| k.may_skip()).collect();
        assert_eq!(
            skippable,
            vec![&StageKind::InfraValidation, &StageKind::Deployment]
        );
    }

    #[test]
    fn test_stage_result_builders() {
        let result = StageResult::new(StageKind::Testing, StageOutcome::Passed)
            .with_metric("passed", 12)
            .with_metric("coverage", 0.81);
        assert!(result.passed());
        assert_eq!(result.metric_u64("passed"), Some(12));
        assert!(result.reason.is_none());

        let skipped = StageResult::skipped(StageKind::InfraValidation, "no iac");
        assert_eq!(skipped.outcome, StageOutcome::Skipped);
        assert_eq!(skipped.reason.as_deref(), Some("no iac"));

        let errored = StageResult::errored(StageKind::Analysis, "boom");
        assert_eq!(errored.outcome, StageOutcome::Failed);
        assert_eq!(errored.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_stage_result_serializes_snake_case() {
        let result = StageResult::new(StageKind::SecurityScan, StageOutcome::Failed);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stage_kind"], "security_scan");
        assert_eq!(json["outcome"], "failed");
        assert!(json.get("reason").is_none());
    }
}
