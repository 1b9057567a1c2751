//! External tool execution.
//!
//! [`CommandTool`] backs every stage collaborator with a configured command.
//! The command runs inside the acquired source tree and prints the stage's
//! JSON output schema on stdout.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use riskgate_core::config::ToolsConfig;
use riskgate_core::domain::{
    AnalysisOutput, ChangeSet, CollaboratorError, DeploymentOutput, DeploymentPlan,
    InfraValidationOutput, SecurityScanOutput, TestOutput,
};
use riskgate_core::{
    CodeAnalyzer, Deployer, InfraValidator, SecurityScanner, SourceHandle, TestRunner,
};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Raw output of one command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub tool: String,

    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Parse stdout as `T`.
    ///
    /// Many tools exit non-zero when they find problems, so a non-zero exit
    /// is only an error when stdout is not valid output.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, CollaboratorError> {
        match serde_json::from_str(self.stdout.trim()) {
            Ok(value) => Ok(value),
            Err(e) if self.success() => Err(CollaboratorError::permanent(
                &self.tool,
                format!("invalid output: {e}"),
            )),
            Err(_) => Err(CollaboratorError::permanent(
                &self.tool,
                format!("exited with code {}: {}", self.exit_code, tail(&self.stderr)),
            )),
        }
    }
}

fn tail(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().rev().nth(499) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Runs external commands in a source tree.
pub struct CommandRunner;

impl CommandRunner {
    /// Execute `command` in `cwd`, optionally feeding `stdin`.
    ///
    /// The child is killed if the timeout fires or the returned future is
    /// dropped.
    pub async fn execute(
        tool: &str,
        command: &[String],
        cwd: &Path,
        env: &[(&str, &str)],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<CommandOutput, CollaboratorError> {
        let start = Instant::now();

        let Some((exe, args)) = command.split_first() else {
            return Err(CollaboratorError::permanent(tool, "no command configured"));
        };

        let mut cmd = Command::new(exe);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        debug!(tool = %tool, command = ?command, "spawning tool");
        let mut child = cmd
            .spawn()
            .map_err(|e| CollaboratorError::permanent(tool, format!("spawn {exe}: {e}")))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input)
                .await
                .map_err(|e| CollaboratorError::transient(tool, format!("write stdin: {e}")))?;
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorError::Timeout {
                collaborator: tool.to_string(),
                limit_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| CollaboratorError::transient(tool, format!("wait: {e}")))?;

        Ok(CommandOutput {
            tool: tool.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Stage collaborators backed by the `[tools]` commands.
///
/// Commands see `RISKGATE_REPOSITORY`, `RISKGATE_REF` and (when known)
/// `RISKGATE_COMMIT` in their environment. The infra validator receives the
/// IaC file paths as extra arguments; the deployer receives the plan as JSON
/// on stdin.
#[derive(Debug, Clone)]
pub struct CommandTool {
    tools: ToolsConfig,
    timeout: Duration,
}

impl CommandTool {
    pub fn new(tools: ToolsConfig, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    async fn run_json<T: DeserializeOwned>(
        &self,
        tool: &str,
        command: &[String],
        source: &SourceHandle,
        extra_args: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<T, CollaboratorError> {
        let full: Vec<String> = command.iter().chain(extra_args).cloned().collect();
        let commit = source.commit().unwrap_or_default();
        let env = [
            ("RISKGATE_REPOSITORY", source.repository()),
            ("RISKGATE_REF", source.git_ref()),
            ("RISKGATE_COMMIT", commit),
        ];
        let output =
            CommandRunner::execute(tool, &full, source.root(), &env, stdin, self.timeout).await?;
        debug!(
            tool = %tool,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "tool finished"
        );
        output.parse()
    }
}

#[async_trait]
impl CodeAnalyzer for CommandTool {
    async fn analyze(&self, source: &SourceHandle) -> Result<AnalysisOutput, CollaboratorError> {
        self.run_json("analyzer", &self.tools.analyzer, source, &[], None)
            .await
    }

    async fn recent_changes(&self, source: &SourceHandle) -> Result<ChangeSet, CollaboratorError> {
        if self.tools.recent_changes.is_empty() {
            return Ok(ChangeSet::default());
        }
        self.run_json("recent-changes", &self.tools.recent_changes, source, &[], None)
            .await
    }
}

#[async_trait]
impl SecurityScanner for CommandTool {
    async fn scan(&self, source: &SourceHandle) -> Result<SecurityScanOutput, CollaboratorError> {
        self.run_json("security-scanner", &self.tools.security_scanner, source, &[], None)
            .await
    }
}

#[async_trait]
impl TestRunner for CommandTool {
    async fn run_tests(&self, source: &SourceHandle) -> Result<TestOutput, CollaboratorError> {
        self.run_json("test-runner", &self.tools.test_runner, source, &[], None)
            .await
    }
}

#[async_trait]
impl InfraValidator for CommandTool {
    async fn validate(
        &self,
        source: &SourceHandle,
        files: &[std::path::PathBuf],
    ) -> Result<InfraValidationOutput, CollaboratorError> {
        let args: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
        self.run_json("infra-validator", &self.tools.infra_validator, source, &args, None)
            .await
    }
}

#[async_trait]
impl Deployer for CommandTool {
    async fn create_plan(
        &self,
        source: &SourceHandle,
    ) -> Result<DeploymentPlan, CollaboratorError> {
        self.run_json("deploy-plan", &self.tools.deploy_plan, source, &[], None)
            .await
    }

    async fn deploy(&self, plan: &DeploymentPlan) -> Result<DeploymentOutput, CollaboratorError> {
        let Some((exe, args)) = self.tools.deploy.split_first() else {
            return Err(CollaboratorError::permanent("deployer", "no command configured"));
        };
        let input = serde_json::to_vec(plan)
            .map_err(|e| CollaboratorError::permanent("deployer", format!("encode plan: {e}")))?;
        let command: Vec<String> = std::iter::once(exe.clone())
            .chain(args.iter().cloned())
            .collect();
        let cwd = std::env::current_dir()
            .map_err(|e| CollaboratorError::permanent("deployer", format!("working dir: {e}")))?;
        let output =
            CommandRunner::execute("deployer", &command, &cwd, &[], Some(&input), self.timeout)
                .await?;
        output.parse()
    }
}
