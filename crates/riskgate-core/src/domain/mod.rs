//! Domain models for riskgate.
//!
//! Canonical definitions for the core entities:
//! - `StageResult`: Normalized output of one pipeline stage
//! - `Assessment`: Task-typed advisory output of the language model
//! - `GateDecision`: Recorded deployment gate outcome
//! - `RunReport`: Aggregate result of one pipeline run

pub mod assessment;
pub mod error;
pub mod findings;
pub mod gate;
pub mod report;
pub mod stage;

// Re-export main types and errors
pub use assessment::{
    Assessment, AssessmentRequest, AssessmentTask, BuildSummary, CodeReview, DeploymentRisk,
    InfraReview, RiskLevel, SecurityReview, TestGapReview, MAX_RISK_LEVEL,
};
pub use error::{
    AssessmentError, CollaboratorError, ConfigError, ReportError, RepositoryError, RunError,
    RunFailure,
};
pub use findings::{
    AnalysisOutput, ChangeSet, CodeIssue, DeploymentOutput, DeploymentPlan, InfraEvidence,
    InfraValidationOutput, SecurityFinding, SecurityScanOutput, Severity, TestEvidence,
    TestOutput,
};
pub use gate::GateDecision;
pub use report::{
    LogEntry, LogLevel, ReportRecorder, RunId, RunIdentity, RunReport, StageEntry,
};
pub use stage::{StageKind, StageMetrics, StageOutcome, StageResult};
