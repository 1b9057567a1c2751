//! Repository acquisition with the `git` CLI.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::collaborators::{RepositoryAcquirer, SourceHandle};
use crate::domain::RepositoryError;

/// Shallow-clones `url` at `git_ref` into a run-scoped temporary directory.
///
/// The checkout is removed when the last [`SourceHandle`] clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct GitRepository {
    depth: Option<u32>,
}

impl GitRepository {
    pub fn new() -> Self {
        Self { depth: Some(1) }
    }

    /// Clone full history instead of a single commit.
    pub fn full_history(mut self) -> Self {
        self.depth = None;
        self
    }
}

#[async_trait]
impl RepositoryAcquirer for GitRepository {
    async fn acquire(&self, url: &str, git_ref: &str) -> Result<SourceHandle, RepositoryError> {
        let workdir = tempfile::Builder::new()
            .prefix("riskgate-src-")
            .tempdir()
            .map_err(|e| RepositoryError::NetworkError(format!("create workdir: {e}")))?;
        let checkout = workdir.path().join("src");

        let mut cmd = Command::new("git");
        cmd.arg("clone").arg("--quiet");
        if let Some(depth) = self.depth {
            cmd.arg("--depth").arg(depth.to_string());
        }
        cmd.arg("--branch")
            .arg(git_ref)
            .arg("--")
            .arg(url)
            .arg(&checkout)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        debug!(url = %url, git_ref = %git_ref, "cloning repository");
        let output = cmd
            .output()
            .await
            .map_err(|e| RepositoryError::NetworkError(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_clone_failure(url, git_ref, &stderr));
        }

        let commit = capture_head_sha(&checkout).await?;
        info!(url = %url, git_ref = %git_ref, commit = %commit, "repository acquired");
        Ok(SourceHandle::in_workdir(workdir, checkout, url, git_ref).with_commit(commit))
    }
}

/// Map `git clone` stderr onto the repository error taxonomy.
///
/// Anything not recognisably "missing" or "denied" is treated as a network
/// problem, which the call controls may retry.
pub fn classify_clone_failure(url: &str, git_ref: &str, stderr: &str) -> RepositoryError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied")
        || lower.contains("access denied")
    {
        return RepositoryError::AuthFailure(url.to_string());
    }
    if lower.contains("remote branch") && lower.contains("not found") {
        return RepositoryError::NotFound(format!("{url}@{git_ref}"));
    }
    if lower.contains("repository not found")
        || lower.contains("does not exist")
        || lower.contains("not a git repository")
        || lower.contains("does not appear to be a git repository")
    {
        return RepositoryError::NotFound(url.to_string());
    }
    RepositoryError::NetworkError(format!("git clone {url}: {}", stderr.trim()))
}

/// HEAD commit SHA of the checkout at `repo_dir`.
pub async fn capture_head_sha(repo_dir: &Path) -> Result<String, RepositoryError> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .await
        .map_err(|e| RepositoryError::NetworkError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RepositoryError::NotFound(format!(
            "git rev-parse HEAD failed: {}",
            stderr.trim()
        )));
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(RepositoryError::NotFound(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}
