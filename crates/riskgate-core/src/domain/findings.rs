//! Output schemas of the stage collaborators.
//!
//! These are what analyzers, scanners, test runners, infra validators and
//! deployers hand back. Stage executors normalize them into
//! [`StageResult`](super::stage::StageResult)s.

use serde::{Deserialize, Serialize};

/// Severity of a code issue or security finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A single static-analysis issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeIssue {
    pub rule: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
}

impl CodeIssue {
    /// Errors are issues at `high` severity or above.
    pub fn is_error(&self) -> bool {
        self.severity >= Severity::High
    }
}

/// Output of the code analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisOutput {
    #[serde(default)]
    pub issues: Vec<CodeIssue>,
}

/// Recent changes in the source tree, used to suggest missing tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSet {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A single security finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityFinding {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

/// Output of the security scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityScanOutput {
    #[serde(default)]
    pub findings: Vec<SecurityFinding>,
}

impl SecurityScanOutput {
    /// Number of findings at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }
}

/// Output of the test runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestOutput {
    pub passed: u32,
    pub failed: u32,
    /// Line coverage as a fraction in `[0, 1]`.
    pub coverage: f64,
}

/// Payload of the Testing stage: test results plus the recent changes they
/// are reviewed against.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestEvidence {
    pub results: TestOutput,
    #[serde(default)]
    pub changes: ChangeSet,
}

/// Output of the infrastructure validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfraValidationOutput {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Payload of the InfraValidation stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfraEvidence {
    /// IaC files, relative to the source root.
    pub files: Vec<String>,
    pub validation: InfraValidationOutput,
}

/// A deployment plan produced before the risk gate is consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeploymentPlan {
    pub environment: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Result reported by the deployer after executing a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentOutput {
    pub success: bool,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_code_issue_is_error() {
        let mut issue = CodeIssue {
            rule: "E501".into(),
            message: "line too long".into(),
            path: None,
            line: None,
            severity: Severity::Low,
        };
        assert!(!issue.is_error());
        issue.severity = Severity::High;
        assert!(issue.is_error());
    }

    #[test]
    fn test_security_count_by_severity() {
        let out = SecurityScanOutput {
            findings: vec![
                SecurityFinding {
                    id: "CVE-1".into(),
                    title: "a".into(),
                    severity: Severity::High,
                    package: None,
                },
                SecurityFinding {
                    id: "CVE-2".into(),
                    title: "b".into(),
                    severity: Severity::Medium,
                    package: Some("openssl".into()),
                },
            ],
        };
        assert_eq!(out.count(Severity::High), 1);
        assert_eq!(out.count(Severity::Critical), 0);
    }

    #[test]
    fn test_outputs_accept_missing_lists() {
        let analysis: AnalysisOutput = serde_json::from_str("{}").unwrap();
        assert!(analysis.issues.is_empty());

        let infra: InfraValidationOutput = serde_json::from_str(r#"{"valid": true}"#).unwrap();
        assert!(infra.valid);
        assert!(infra.errors.is_empty());
    }
}
