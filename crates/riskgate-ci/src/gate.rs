//! Deployment gate.
//!
//! Fail-closed rules:
//! - every stage before Deployment must be present and not `Failed`
//!   (`Skipped` InfraValidation counts as clean);
//! - a valid deployment-risk assessment must exist;
//! - its `risk_level` must be `<= threshold`.
//!
//! Anything else rejects the deployment.

use riskgate_core::domain::{
    AssessmentError, DeploymentRisk, GateDecision, RiskLevel, StageEntry, StageKind, StageOutcome,
};

#[derive(Debug, Clone, Copy)]
pub struct DeploymentGate {
    threshold: RiskLevel,
}

impl DeploymentGate {
    pub fn new(threshold: RiskLevel) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> RiskLevel {
        self.threshold
    }

    /// `Some(UpstreamFailed)` unless every pre-deployment stage is clean.
    ///
    /// A stage missing from `stages` counts as failed.
    pub fn check_upstream(&self, stages: &[StageEntry]) -> Option<GateDecision> {
        let failed: Vec<StageKind> = StageKind::ORDER
            .iter()
            .copied()
            .filter(|kind| *kind != StageKind::Deployment)
            .filter(|kind| match stages.iter().find(|s| s.kind() == *kind) {
                Some(entry) => entry.outcome() == StageOutcome::Failed,
                None => true,
            })
            .collect();

        if failed.is_empty() {
            None
        } else {
            Some(GateDecision::UpstreamFailed { stages: failed })
        }
    }

    /// Decide on the assessed deployment risk.
    pub fn evaluate(&self, risk: &Result<DeploymentRisk, AssessmentError>) -> GateDecision {
        match risk {
            Ok(risk) if risk.risk_level <= self.threshold => GateDecision::Approved {
                risk_level: risk.risk_level,
                threshold: self.threshold,
            },
            Ok(risk) => GateDecision::RiskExceeded {
                risk_level: risk.risk_level,
                threshold: self.threshold,
            },
            Err(err) => GateDecision::RiskUnavailable {
                detail: err.to_string(),
            },
        }
    }
}
