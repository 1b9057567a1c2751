//! riskgate core library
//!
//! Domain model, collaborator contracts, call controls and the assessment
//! provider shared by the pipeline orchestrator (`riskgate-ci`) and the CLI.

pub mod assessment;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod controls;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod iac;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod telemetry;

pub use assessment::{AssessmentProvider, HttpAssessmentBackend, UnconfiguredBackend};

pub use clock::{Clock, FixedClock, RunIdGenerator, SequentialRunIds, SystemClock, UuidRunIds};

pub use collaborators::{
    AssessmentBackend, CodeAnalyzer, Deployer, InfraValidator, RepositoryAcquirer,
    SecurityScanner, SourceHandle, TestRunner,
};

pub use config::{
    load_config, render_config, PipelineConfig, StagePolicy, MAX_RUN_DEADLINE_SECS,
};

pub use controls::{call_with_policy, CallPolicy, RetryClass};

pub use domain::{
    AnalysisOutput, Assessment, AssessmentError, AssessmentRequest, AssessmentTask, BuildSummary,
    ChangeSet, CodeIssue, CollaboratorError, ConfigError, DeploymentOutput, DeploymentPlan,
    DeploymentRisk, GateDecision, InfraEvidence, InfraValidationOutput, LogEntry, LogLevel,
    ReportRecorder, RepositoryError, RiskLevel, RunError, RunFailure, RunId, RunIdentity,
    RunReport, SecurityFinding, SecurityScanOutput, Severity, StageEntry, StageKind,
    StageOutcome, StageResult, TestEvidence, TestOutput,
};

pub use git::GitRepository;

pub use iac::discover_iac_files;

pub use metrics::METRICS;
