//! Pipeline configuration (TOML).
//!
//! Missing fields default to the values below; a missing file yields
//! `PipelineConfig::default()`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controls::CallPolicy;
use crate::domain::{ConfigError, RiskLevel, Severity, MAX_RISK_LEVEL};

/// Upper bound for `run_deadline_secs` (7 days).
pub const MAX_RUN_DEADLINE_SECS: u64 = 7 * 24 * 60 * 60;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Highest deployment risk (0..=5) that still allows deployment.
    pub risk_threshold: u8,

    /// Wall-clock budget for a whole run in seconds.
    pub run_deadline_secs: u64,

    pub policy: StagePolicy,

    pub calls: CallPolicies,

    pub assessment: AssessmentConfig,

    pub tools: ToolsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 3,
            run_deadline_secs: 60 * 60,
            policy: StagePolicy::default(),
            calls: CallPolicies::default(),
            assessment: AssessmentConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Outcome rules applied when normalizing collaborator output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StagePolicy {
    /// Error-severity analysis issues tolerated before Analysis fails.
    pub max_analysis_errors: u32,

    /// Security findings at or above this severity fail the scan.
    pub security_fail_severity: Severity,

    /// Minimum coverage fraction for Testing to pass.
    pub min_coverage: f64,

    /// Whether InfraValidation may be skipped when no IaC files exist.
    pub allow_infra_skip: bool,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            max_analysis_errors: 0,
            security_fail_severity: Severity::Critical,
            min_coverage: 0.0,
            allow_infra_skip: true,
        }
    }
}

/// Call budgets per class of external call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CallPolicies {
    pub acquisition: CallPolicy,
    pub stages: CallPolicy,
    pub assessment: CallPolicy,
}

impl Default for CallPolicies {
    fn default() -> Self {
        Self {
            acquisition: CallPolicy::new(120_000, 2, 1_000),
            stages: CallPolicy::new(15 * 60_000, 2, 1_000),
            assessment: CallPolicy::new(60_000, 2, 500),
        }
    }
}

/// Language-model backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssessmentConfig {
    /// HTTP endpoint accepting `{model, task, input}` requests.
    pub endpoint: Option<String>,

    pub model: String,

    /// Environment variable holding the bearer token, if any.
    pub api_key_env: Option<String>,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "amazon-bedrock-claude-3-sonnet".to_string(),
            api_key_env: Some("RISKGATE_ASSESSMENT_API_KEY".to_string()),
        }
    }
}

/// Commands backing the reference collaborators (first element is the
/// executable). Each command prints its stage's JSON output on stdout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub analyzer: Vec<String>,
    pub recent_changes: Vec<String>,
    pub security_scanner: Vec<String>,
    pub test_runner: Vec<String>,
    pub infra_validator: Vec<String>,
    pub deploy_plan: Vec<String>,
    pub deploy: Vec<String>,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.risk_threshold > MAX_RISK_LEVEL {
            return Err(ConfigError::Invalid(format!(
                "risk_threshold must be within 0..={MAX_RISK_LEVEL}, got {}",
                self.risk_threshold
            )));
        }
        if self.run_deadline_secs == 0 || self.run_deadline_secs > MAX_RUN_DEADLINE_SECS {
            return Err(ConfigError::Invalid(format!(
                "run_deadline_secs must be within 1..={MAX_RUN_DEADLINE_SECS}, got {}",
                self.run_deadline_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.policy.min_coverage) {
            return Err(ConfigError::Invalid(format!(
                "policy.min_coverage must be within [0, 1], got {}",
                self.policy.min_coverage
            )));
        }
        for (name, policy) in [
            ("acquisition", &self.calls.acquisition),
            ("stages", &self.calls.stages),
            ("assessment", &self.calls.assessment),
        ] {
            if policy.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "calls.{name}.timeout_ms must be > 0"
                )));
            }
        }
        if let Some(endpoint) = &self.assessment.endpoint {
            if endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "assessment.endpoint must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The risk threshold as a [`RiskLevel`].
    ///
    /// Out-of-range values are clamped to the scale maximum; call
    /// [`validate`](Self::validate) first to reject them instead.
    pub fn risk_threshold(&self) -> RiskLevel {
        RiskLevel::new(self.risk_threshold.min(MAX_RISK_LEVEL)).unwrap_or(RiskLevel::ZERO)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    /// Override the risk threshold.
    pub fn with_risk_threshold(mut self, threshold: u8) -> Self {
        self.risk_threshold = threshold;
        self
    }

    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline_secs = deadline.as_secs().max(1);
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let cfg: PipelineConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Render a config as TOML.
pub fn render_config(cfg: &PipelineConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(cfg).map_err(|e| ConfigError::Invalid(e.to_string()))
}
