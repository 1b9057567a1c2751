//! Deterministic in-memory collaborators (testing only).
//!
//! Each fake replays a script of replies: reply `n` answers call `n`, and the
//! last reply repeats once the script is exhausted. Every fake counts its
//! calls so tests can assert what the pipeline did and did not invoke.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::collaborators::{
    AssessmentBackend, CodeAnalyzer, Deployer, InfraValidator, RepositoryAcquirer,
    SecurityScanner, SourceHandle, TestRunner,
};
use crate::domain::{
    AnalysisOutput, AssessmentError, AssessmentRequest, AssessmentTask, ChangeSet,
    CollaboratorError, DeploymentOutput, DeploymentPlan, InfraValidationOutput, RepositoryError,
    SecurityScanOutput, TestOutput,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Replies for one collaborator operation.
#[derive(Debug)]
pub struct Script<T, E> {
    replies: Vec<Result<T, E>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl<T: Clone, E: Clone> Script<T, E> {
    pub fn new(replies: Vec<Result<T, E>>) -> Self {
        Self {
            replies,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(reply: Result<T, E>) -> Self {
        Self::new(vec![reply])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Next reply, or `None` for an empty script.
    pub async fn next(&self) -> Option<Result<T, E>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let last = self.replies.len().checked_sub(1)?;
        self.replies.get(n.min(last)).cloned()
    }
}

impl<T: Clone> Script<T, CollaboratorError> {
    async fn reply(&self, collaborator: &str) -> Result<T, CollaboratorError> {
        self.next()
            .await
            .unwrap_or_else(|| Err(CollaboratorError::permanent(collaborator, "no scripted reply")))
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Hands out a handle to a fixed path without touching the network.
#[derive(Debug)]
pub struct StaticRepository {
    root: PathBuf,
    acquisitions: AtomicUsize,
}

impl StaticRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            acquisitions: AtomicUsize::new(0),
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl Default for StaticRepository {
    fn default() -> Self {
        Self::new("fake-src")
    }
}

#[async_trait]
impl RepositoryAcquirer for StaticRepository {
    async fn acquire(&self, url: &str, git_ref: &str) -> Result<SourceHandle, RepositoryError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(SourceHandle::local(self.root.clone(), url, git_ref).with_commit("0".repeat(40)))
    }
}

/// Fails every acquisition with the same error.
#[derive(Debug)]
pub struct FailingRepository {
    error: RepositoryError,
    attempts: AtomicUsize,
}

impl FailingRepository {
    pub fn new(error: RepositoryError) -> Self {
        Self {
            error,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryAcquirer for FailingRepository {
    async fn acquire(&self, _url: &str, _git_ref: &str) -> Result<SourceHandle, RepositoryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

// ---------------------------------------------------------------------------
// Stage collaborators
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeAnalyzer {
    analysis: Script<AnalysisOutput, CollaboratorError>,
    changes: ChangeSet,
}

impl FakeAnalyzer {
    pub fn new(script: Script<AnalysisOutput, CollaboratorError>) -> Self {
        Self {
            analysis: script,
            changes: ChangeSet::default(),
        }
    }

    /// No issues.
    pub fn clean() -> Self {
        Self::returning(AnalysisOutput::default())
    }

    pub fn returning(output: AnalysisOutput) -> Self {
        Self::new(Script::always(Ok(output)))
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self::new(Script::always(Err(error)))
    }

    pub fn with_changes(mut self, changes: ChangeSet) -> Self {
        self.changes = changes;
        self
    }

    pub fn calls(&self) -> usize {
        self.analysis.calls()
    }
}

#[async_trait]
impl CodeAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _source: &SourceHandle) -> Result<AnalysisOutput, CollaboratorError> {
        self.analysis.reply("fake-analyzer").await
    }

    async fn recent_changes(&self, _source: &SourceHandle) -> Result<ChangeSet, CollaboratorError> {
        Ok(self.changes.clone())
    }
}

#[derive(Debug)]
pub struct FakeScanner {
    scan: Script<SecurityScanOutput, CollaboratorError>,
}

impl FakeScanner {
    pub fn new(script: Script<SecurityScanOutput, CollaboratorError>) -> Self {
        Self { scan: script }
    }

    pub fn clean() -> Self {
        Self::returning(SecurityScanOutput::default())
    }

    pub fn returning(output: SecurityScanOutput) -> Self {
        Self::new(Script::always(Ok(output)))
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self::new(Script::always(Err(error)))
    }

    pub fn calls(&self) -> usize {
        self.scan.calls()
    }
}

#[async_trait]
impl SecurityScanner for FakeScanner {
    async fn scan(&self, _source: &SourceHandle) -> Result<SecurityScanOutput, CollaboratorError> {
        self.scan.reply("fake-scanner").await
    }
}

#[derive(Debug)]
pub struct FakeTestRunner {
    results: Script<TestOutput, CollaboratorError>,
}

impl FakeTestRunner {
    pub fn new(script: Script<TestOutput, CollaboratorError>) -> Self {
        Self { results: script }
    }

    /// `passed` tests, none failing, at the given coverage.
    pub fn passing(passed: u32, coverage: f64) -> Self {
        Self::returning(TestOutput {
            passed,
            failed: 0,
            coverage,
        })
    }

    pub fn returning(output: TestOutput) -> Self {
        Self::new(Script::always(Ok(output)))
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self::new(Script::always(Err(error)))
    }

    pub fn calls(&self) -> usize {
        self.results.calls()
    }
}

#[async_trait]
impl TestRunner for FakeTestRunner {
    async fn run_tests(&self, _source: &SourceHandle) -> Result<TestOutput, CollaboratorError> {
        self.results.reply("fake-test-runner").await
    }
}

/// Infra validator with a fixed IaC file list.
#[derive(Debug)]
pub struct FakeInfra {
    files: Vec<PathBuf>,
    validation: Script<InfraValidationOutput, CollaboratorError>,
}

impl FakeInfra {
    /// No IaC files; validation must never be reached.
    pub fn none() -> Self {
        Self {
            files: Vec::new(),
            validation: Script::new(Vec::new()),
        }
    }

    /// The given files, all valid.
    pub fn valid(files: &[&str]) -> Self {
        Self::with_files(
            files,
            Script::always(Ok(InfraValidationOutput {
                valid: true,
                errors: Vec::new(),
            })),
        )
    }

    pub fn with_files(
        files: &[&str],
        validation: Script<InfraValidationOutput, CollaboratorError>,
    ) -> Self {
        Self {
            files: files.iter().map(PathBuf::from).collect(),
            validation,
        }
    }

    pub fn validate_calls(&self) -> usize {
        self.validation.calls()
    }
}

#[async_trait]
impl InfraValidator for FakeInfra {
    async fn find_iac_files(
        &self,
        _source: &SourceHandle,
    ) -> Result<Vec<PathBuf>, CollaboratorError> {
        Ok(self.files.clone())
    }

    async fn validate(
        &self,
        _source: &SourceHandle,
        _files: &[PathBuf],
    ) -> Result<InfraValidationOutput, CollaboratorError> {
        self.validation.reply("fake-infra-validator").await
    }
}

/// Deployer that records how often it was asked to plan and deploy.
#[derive(Debug)]
pub struct SpyDeployer {
    plan: Script<DeploymentPlan, CollaboratorError>,
    outcome: Script<DeploymentOutput, CollaboratorError>,
}

impl SpyDeployer {
    pub fn new(
        plan: Script<DeploymentPlan, CollaboratorError>,
        outcome: Script<DeploymentOutput, CollaboratorError>,
    ) -> Self {
        Self { plan, outcome }
    }

    /// Plans for `environment` and reports every deployment as successful.
    pub fn succeeding(environment: &str) -> Self {
        Self::new(
            Script::always(Ok(DeploymentPlan {
                environment: environment.to_string(),
                artifacts: vec!["app:latest".to_string()],
                steps: vec!["rollout".to_string()],
                metadata: Value::Null,
            })),
            Script::always(Ok(DeploymentOutput {
                success: true,
                environment: environment.to_string(),
                detail: None,
            })),
        )
    }

    /// Plans fine but the deployment reports failure.
    pub fn reporting_failure(environment: &str) -> Self {
        let ok = Self::succeeding(environment);
        Self::new(
            ok.plan,
            Script::always(Ok(DeploymentOutput {
                success: false,
                environment: environment.to_string(),
                detail: Some("rollout health check failed".to_string()),
            })),
        )
    }

    pub fn plan_calls(&self) -> usize {
        self.plan.calls()
    }

    pub fn deploy_calls(&self) -> usize {
        self.outcome.calls()
    }
}

#[async_trait]
impl Deployer for SpyDeployer {
    async fn create_plan(
        &self,
        _source: &SourceHandle,
    ) -> Result<DeploymentPlan, CollaboratorError> {
        self.plan.reply("spy-deployer").await
    }

    async fn deploy(&self, _plan: &DeploymentPlan) -> Result<DeploymentOutput, CollaboratorError> {
        self.outcome.reply("spy-deployer").await
    }
}

// ---------------------------------------------------------------------------
// Assessment backend
// ---------------------------------------------------------------------------

type Reply = Result<Value, AssessmentError>;

/// Assessment backend answering from per-task scripts.
///
/// Tasks without a script fail with `BackendUnavailable`.
#[derive(Debug, Default)]
pub struct ScriptedAssessmentBackend {
    scripts: Mutex<HashMap<AssessmentTask, Vec<Reply>>>,
    calls: Mutex<HashMap<AssessmentTask, usize>>,
    requests: Mutex<Vec<AssessmentRequest>>,
    delay: Option<Duration>,
}

impl ScriptedAssessmentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid responses for every task, with the given deployment risk.
    pub fn healthy(risk_level: u8) -> Self {
        Self::new()
            .respond(
                AssessmentTask::CodeReview,
                json!({"suggestions": ["Consider extracting the retry helper"]}),
            )
            .respond(
                AssessmentTask::SecurityReview,
                json!({"risk_level": 1, "high_issues": 0, "analysis": "Low exposure."}),
            )
            .respond(
                AssessmentTask::TestGapReview,
                json!({"suggested_tests": ["cover the error path"], "analysis": "Minor gaps."}),
            )
            .respond(
                AssessmentTask::InfraReview,
                json!({"findings": [], "analysis": "Infrastructure looks sound."}),
            )
            .respond(
                AssessmentTask::DeploymentRiskReview,
                json!({"risk_level": risk_level, "concerns": [], "analysis": "Scripted risk."}),
            )
            .respond(
                AssessmentTask::Summary,
                json!({"conclusion": "Build reviewed.", "highlights": ["all stages assessed"]}),
            )
    }

    /// Append a successful reply to the task's script.
    pub fn respond(self, task: AssessmentTask, response: Value) -> Self {
        self.push(task, Ok(response))
    }

    /// Append a failing reply to the task's script.
    pub fn fail(self, task: AssessmentTask, error: AssessmentError) -> Self {
        self.push(task, Err(error))
    }

    /// Replace the task's script with a single reply.
    pub fn only(self, task: AssessmentTask, reply: Reply) -> Self {
        lock(&self.scripts).insert(task, vec![reply]);
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, task: AssessmentTask, reply: Reply) -> Self {
        lock(&self.scripts).entry(task).or_default().push(reply);
        self
    }

    pub fn calls(&self, task: AssessmentTask) -> usize {
        lock(&self.calls).get(&task).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    pub fn last_request(&self, task: AssessmentTask) -> Option<AssessmentRequest> {
        lock(&self.requests)
            .iter()
            .rev()
            .find(|r| r.task == task)
            .cloned()
    }
}

#[async_trait]
impl AssessmentBackend for ScriptedAssessmentBackend {
    async fn complete(&self, request: &AssessmentRequest) -> Result<Value, AssessmentError> {
        let n = {
            let mut calls = lock(&self.calls);
            let count = calls.entry(request.task).or_insert(0);
            *count += 1;
            *count - 1
        };
        lock(&self.requests).push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripts = lock(&self.scripts);
        match scripts.get(&request.task) {
            Some(replies) if !replies.is_empty() => replies[n.min(replies.len() - 1)].clone(),
            _ => Err(AssessmentError::BackendUnavailable(format!(
                "no scripted response for {}",
                request.task
            ))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
