//! Task-typed assessments returned by the language-model provider.
//!
//! Every task has its own schema. Responses are validated by deserializing
//! into the task struct; required fields have no serde default, so a missing
//! field surfaces as a malformed response instead of a silent fallback.

use serde::{Deserialize, Serialize};

/// Highest value on the deployment risk scale.
pub const MAX_RISK_LEVEL: u8 = 5;

/// Deployment risk on the inclusive `0..=5` scale.
///
/// Only integers are accepted on the wire; `2.5`, `"3"` or `7` are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RiskLevel(u8);

impl RiskLevel {
    pub const ZERO: RiskLevel = RiskLevel(0);

    pub fn new(value: u8) -> Option<Self> {
        (value <= MAX_RISK_LEVEL).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RiskLevel {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(RiskLevel::new)
            .ok_or_else(|| format!("risk_level {value} outside 0..={MAX_RISK_LEVEL}"))
    }
}

impl From<RiskLevel> for u8 {
    fn from(level: RiskLevel) -> Self {
        level.0
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, MAX_RISK_LEVEL)
    }
}

/// The kinds of assessment the provider can perform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentTask {
    CodeReview,
    SecurityReview,
    TestGapReview,
    InfraReview,
    DeploymentRiskReview,
    Summary,
}

impl AssessmentTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CodeReview => "code_review",
            Self::SecurityReview => "security_review",
            Self::TestGapReview => "test_gap_review",
            Self::InfraReview => "infra_review",
            Self::DeploymentRiskReview => "deployment_risk_review",
            Self::Summary => "summary",
        }
    }
}

impl std::fmt::Display for AssessmentTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured request handed to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentRequest {
    pub task: AssessmentTask,
    pub input: serde_json::Value,
}

impl AssessmentRequest {
    pub fn new(task: AssessmentTask, input: serde_json::Value) -> Self {
        Self { task, input }
    }
}

/// Suggested code improvements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeReview {
    pub suggestions: Vec<String>,
}

/// Prioritized security risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub critical_issues: u32,
    #[serde(default)]
    pub high_issues: u32,
    #[serde(default)]
    pub medium_issues: u32,
    pub analysis: String,
}

/// Tests that should be added given recent changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestGapReview {
    pub suggested_tests: Vec<String>,
    #[serde(default)]
    pub analysis: String,
}

/// Review of infrastructure-as-code changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfraReview {
    pub findings: Vec<String>,
    #[serde(default)]
    pub analysis: String,
}

/// Deployment risk. `risk_level` is mandatory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentRisk {
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub analysis: String,
}

/// Executive summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSummary {
    pub conclusion: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

/// An assessment of any task kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Assessment {
    CodeReview(CodeReview),
    SecurityReview(SecurityReview),
    TestGapReview(TestGapReview),
    InfraReview(InfraReview),
    DeploymentRisk(DeploymentRisk),
    Summary(BuildSummary),
}

impl Assessment {
    pub fn task(&self) -> AssessmentTask {
        match self {
            Self::CodeReview(_) => AssessmentTask::CodeReview,
            Self::SecurityReview(_) => AssessmentTask::SecurityReview,
            Self::TestGapReview(_) => AssessmentTask::TestGapReview,
            Self::InfraReview(_) => AssessmentTask::InfraReview,
            Self::DeploymentRisk(_) => AssessmentTask::DeploymentRiskReview,
            Self::Summary(_) => AssessmentTask::Summary,
        }
    }

    pub fn as_deployment_risk(&self) -> Option<&DeploymentRisk> {
        match self {
            Self::DeploymentRisk(risk) => Some(risk),
            _ => None,
        }
    }
}
