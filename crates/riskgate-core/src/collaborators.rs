//! Contracts for the external collaborators of a pipeline run.
//!
//! The orchestrator only talks to these traits. Reference adapters live in
//! [`crate::git`], [`crate::assessment::http`] and the `riskgate-ci` command
//! runner; deterministic doubles live in [`crate::fakes`].
//!
//! All traits are `Send + Sync` so one set of collaborators can serve many
//! concurrent runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    AnalysisOutput, AssessmentError, AssessmentRequest, ChangeSet, CollaboratorError,
    DeploymentOutput, DeploymentPlan, InfraValidationOutput, RepositoryError,
    SecurityScanOutput, TestOutput,
};

/// Handle to an acquired source tree.
///
/// When the tree lives in a temporary directory the handle keeps it alive;
/// the directory is removed once the last clone of the handle is dropped.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    root: PathBuf,
    repository: String,
    git_ref: String,
    commit: Option<String>,
    _workdir: Option<Arc<tempfile::TempDir>>,
}

impl SourceHandle {
    /// A source tree at an existing local path.
    pub fn local(root: impl Into<PathBuf>, repository: &str, git_ref: &str) -> Self {
        Self {
            root: root.into(),
            repository: repository.to_string(),
            git_ref: git_ref.to_string(),
            commit: None,
            _workdir: None,
        }
    }

    /// A source tree inside `workdir`, which is removed with the handle.
    pub fn in_workdir(
        workdir: tempfile::TempDir,
        root: PathBuf,
        repository: &str,
        git_ref: &str,
    ) -> Self {
        Self {
            root,
            repository: repository.to_string(),
            git_ref: git_ref.to_string(),
            commit: None,
            _workdir: Some(Arc::new(workdir)),
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    pub fn commit(&self) -> Option<&str> {
        self.commit.as_deref()
    }
}

/// Acquires (clones/checks out) the repository under test.
#[async_trait]
pub trait RepositoryAcquirer: Send + Sync {
    async fn acquire(&self, url: &str, git_ref: &str) -> Result<SourceHandle, RepositoryError>;
}

/// Static code analysis.
#[async_trait]
pub trait CodeAnalyzer: Send + Sync {
    async fn analyze(&self, source: &SourceHandle) -> Result<AnalysisOutput, CollaboratorError>;

    /// Recent changes, used to suggest missing tests.
    async fn recent_changes(&self, _source: &SourceHandle) -> Result<ChangeSet, CollaboratorError> {
        Ok(ChangeSet::default())
    }
}

/// Dependency and source security scanning.
#[async_trait]
pub trait SecurityScanner: Send + Sync {
    async fn scan(&self, source: &SourceHandle) -> Result<SecurityScanOutput, CollaboratorError>;
}

/// Test suite execution.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(&self, source: &SourceHandle) -> Result<TestOutput, CollaboratorError>;
}

/// Infrastructure-as-code discovery and validation.
#[async_trait]
pub trait InfraValidator: Send + Sync {
    /// IaC files in the source tree, relative to its root.
    ///
    /// Defaults to the filesystem discovery in [`crate::iac`].
    async fn find_iac_files(
        &self,
        source: &SourceHandle,
    ) -> Result<Vec<PathBuf>, CollaboratorError> {
        let root = source.root().to_path_buf();
        tokio::task::spawn_blocking(move || crate::iac::discover_iac_files(&root))
            .await
            .map_err(|e| CollaboratorError::permanent("iac-discovery", e.to_string()))?
            .map_err(|e| CollaboratorError::permanent("iac-discovery", e.to_string()))
    }

    async fn validate(
        &self,
        source: &SourceHandle,
        files: &[PathBuf],
    ) -> Result<InfraValidationOutput, CollaboratorError>;
}

/// Deployment planning and execution.
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn create_plan(&self, source: &SourceHandle) -> Result<DeploymentPlan, CollaboratorError>;

    /// Execute a plan. Irreversible; callers never retry it.
    async fn deploy(&self, plan: &DeploymentPlan) -> Result<DeploymentOutput, CollaboratorError>;
}

/// Language-model backend behind the assessment provider.
///
/// Returns the raw JSON response; schema validation happens in the provider.
#[async_trait]
pub trait AssessmentBackend: Send + Sync {
    async fn complete(
        &self,
        request: &AssessmentRequest,
    ) -> Result<serde_json::Value, AssessmentError>;

    /// Backend name for logs.
    fn name(&self) -> &str {
        "assessment-backend"
    }
}
