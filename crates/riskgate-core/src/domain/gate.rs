//! Recorded deployment gate decisions.
//!
//! A rejection is a policy decision, not an error. The decision is stored on
//! the run report and mirrored into the deployment stage's `reason`.

use serde::{Deserialize, Serialize};

use super::assessment::RiskLevel;
use super::stage::StageKind;

pub const REASON_UPSTREAM_FAILED: &str = "upstream stage failed";
pub const REASON_RISK_EXCEEDED: &str = "risk threshold exceeded";
pub const REASON_RISK_UNAVAILABLE: &str = "risk assessment unavailable";

/// Outcome of the deployment gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// Risk is within the threshold; deployment may run.
    Approved {
        risk_level: RiskLevel,
        threshold: RiskLevel,
    },
    /// One or more earlier stages did not pass. No risk was requested.
    UpstreamFailed { stages: Vec<StageKind> },
    /// The assessed risk is above the threshold.
    RiskExceeded {
        risk_level: RiskLevel,
        threshold: RiskLevel,
    },
    /// No trustworthy risk score could be obtained.
    RiskUnavailable { detail: String },
}

impl GateDecision {
    pub fn approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// Short reason recorded on the deployment stage. `None` when approved.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Approved { .. } => None,
            Self::UpstreamFailed { .. } => Some(REASON_UPSTREAM_FAILED),
            Self::RiskExceeded { .. } => Some(REASON_RISK_EXCEEDED),
            Self::RiskUnavailable { .. } => Some(REASON_RISK_UNAVAILABLE),
        }
    }

    /// Reason plus detail, for the stage entry and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Approved {
                risk_level,
                threshold,
            } => format!("deployment approved: risk {risk_level} <= threshold {threshold}"),
            Self::UpstreamFailed { stages } => {
                let names: Vec<&str> = stages.iter().map(|s| s.name()).collect();
                format!("{REASON_UPSTREAM_FAILED}: [{}]", names.join(", "))
            }
            Self::RiskExceeded {
                risk_level,
                threshold,
            } => format!("{REASON_RISK_EXCEEDED}: {risk_level} > {threshold}"),
            Self::RiskUnavailable { detail } => format!("{REASON_RISK_UNAVAILABLE}: {detail}"),
        }
    }
}
