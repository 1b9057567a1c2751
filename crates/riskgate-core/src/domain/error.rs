//! Error taxonomy for riskgate.
//!
//! Collaborator failures are split into transient and permanent so the call
//! controls know what may be retried. A stage that ran and found problems is
//! not an error: it is a `Failed` [`StageResult`](super::stage::StageResult).

use serde::{Deserialize, Serialize};

use super::stage::StageKind;

/// Failure raised by a stage collaborator (analyzer, scanner, test runner,
/// infra validator, deployer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Infrastructure hiccup (network, busy backend). Retryable.
    #[error("{collaborator} transient failure: {message}")]
    Transient {
        collaborator: String,
        message: String,
    },

    /// The collaborator cannot produce a result for this input. Not retried.
    #[error("{collaborator} failed: {message}")]
    Permanent {
        collaborator: String,
        message: String,
    },

    /// A single attempt exceeded its time budget. Retryable.
    #[error("{collaborator} timed out after {limit_ms}ms")]
    Timeout { collaborator: String, limit_ms: u64 },
}

impl CollaboratorError {
    pub fn transient(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn permanent(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Name of the collaborator that failed.
    pub fn collaborator(&self) -> &str {
        match self {
            Self::Transient { collaborator, .. }
            | Self::Permanent { collaborator, .. }
            | Self::Timeout { collaborator, .. } => collaborator,
        }
    }
}

/// Failure raised while acquiring the repository under test.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("authentication failed for {0}")]
    AuthFailure(String),

    #[error("network error: {0}")]
    NetworkError(String),
}

/// Failure raised by the assessment provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssessmentError {
    #[error("assessment timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// The response did not match the schema of the requested task.
    #[error("malformed assessment response: {0}")]
    MalformedResponse(String),

    #[error("assessment backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend refused the request itself (bad credentials, bad input).
    #[error("assessment request rejected: {0}")]
    Rejected(String),
}

/// Fatal, run-level failure. Any of these ends the run with `success = false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunFailure {
    #[error("repository acquisition failed: {0}")]
    Acquisition(#[from] RepositoryError),

    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: CollaboratorError,
    },

    #[error("run deadline of {limit_ms}ms exceeded")]
    DeadlineExceeded { limit_ms: u64 },

    #[error("internal pipeline error: {0}")]
    Internal(String),
}

impl RunFailure {
    /// Short machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Acquisition(_) => "acquisition_failed",
            Self::Stage { .. } => "stage_failed",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Internal(_) => "internal",
        }
    }

    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Serializable form stored in the run report.
    pub fn to_run_error(&self) -> RunError {
        RunError {
            code: self.code().to_string(),
            stage: self.stage(),
            detail: self.to_string(),
        }
    }
}

/// The `error` field of a finalized run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Machine-readable reason (`acquisition_failed`, `stage_failed`, ...).
    pub code: String,
    /// Stage that failed, when the failure is attributable to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    /// Human-readable detail naming the collaborator involved.
    pub detail: String,
}

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised while assembling a run report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("stage {0} already recorded")]
    DuplicateStage(StageKind),

    #[error("stage {0} may not be skipped")]
    IllegalSkip(StageKind),
}

impl From<ReportError> for RunFailure {
    fn from(err: ReportError) -> Self {
        RunFailure::Internal(err.to_string())
    }
}
