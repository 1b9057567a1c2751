//! riskgate - risk-gated CI/CD pipeline runner
//!
//! ## Commands
//!
//! - `run`: Run the pipeline against a repository and write the report
//! - `config check`: Load and validate a config file
//! - `config default`: Print the default config as TOML

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use riskgate_ci::{Collaborators, CommandTool, Pipeline};
use riskgate_core::reporting::{write_report_json, write_report_md};
use riskgate_core::{
    load_config, render_config, AssessmentBackend, GitRepository, HttpAssessmentBackend,
    PipelineConfig, RunReport, UnconfiguredBackend, METRICS,
};

#[derive(Parser)]
#[command(name = "riskgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Risk-gated CI/CD pipeline runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for a repository and branch
    Run {
        /// Repository URL (or local path) to clone
        #[arg(long)]
        repo: String,

        /// Branch or tag to check out
        #[arg(long, default_value = "main")]
        branch: String,

        /// Pipeline config file (TOML)
        #[arg(short, long, env = "RISKGATE_CONFIG", default_value = "riskgate.toml")]
        config: PathBuf,

        /// Where to write the JSON run report
        #[arg(short, long, default_value = "riskgate-report.json")]
        output: PathBuf,

        /// Also write a markdown report
        #[arg(long)]
        markdown: Option<PathBuf>,

        /// Override the configured risk threshold (0-5)
        #[arg(long)]
        risk_threshold: Option<u8>,
    },

    /// Inspect pipeline configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate a config file
    Check {
        /// Config file to check
        file: PathBuf,
    },

    /// Print the default config as TOML
    Default,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    riskgate_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            repo,
            branch,
            config,
            output,
            markdown,
            risk_threshold,
        } => {
            let report = cmd_run(
                &repo,
                &branch,
                &config,
                &output,
                markdown.as_deref(),
                risk_threshold,
            )
            .await?;
            Ok(if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Check { file } => cmd_config_check(&file)?,
                ConfigAction::Default => print!("{}", cmd_config_default()?),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_run(
    repo: &str,
    branch: &str,
    config_path: &Path,
    output: &Path,
    markdown: Option<&Path>,
    risk_threshold: Option<u8>,
) -> Result<RunReport> {
    let mut config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    if let Some(threshold) = risk_threshold {
        config = config.with_risk_threshold(threshold);
        config.validate().context("Invalid --risk-threshold")?;
    }

    let pipeline = build_pipeline(config)?;
    info!(repo = %repo, branch = %branch, "starting pipeline run");
    let report = pipeline.run(repo, branch).await;

    write_report_json(output, &report)
        .with_context(|| format!("Failed to write report to {:?}", output))?;
    if let Some(path) = markdown {
        write_report_md(path, &report)
            .with_context(|| format!("Failed to write markdown report to {:?}", path))?;
    }
    METRICS.flush();

    print_outcome(&report, output);
    Ok(report)
}

/// Wire the reference adapters described by `config`.
fn build_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    let tool = Arc::new(CommandTool::new(
        config.tools.clone(),
        config.calls.stages.timeout(),
    ));
    let assessment = assessment_backend(&config)?;

    let collaborators = Collaborators {
        repository: Arc::new(GitRepository::new()),
        analyzer: tool.clone(),
        scanner: tool.clone(),
        tests: tool.clone(),
        infra: tool.clone(),
        deployer: tool,
        assessment,
    };
    Pipeline::try_new(collaborators, config).context("Invalid pipeline config")
}

fn assessment_backend(config: &PipelineConfig) -> Result<Arc<dyn AssessmentBackend>> {
    let backend = HttpAssessmentBackend::from_config(
        &config.assessment,
        config.calls.assessment.timeout(),
    )
    .context("Failed to build assessment backend")?;

    Ok(match backend {
        Some(backend) => {
            info!(
                endpoint = %backend.endpoint(),
                model = %backend.model(),
                "assessment backend configured"
            );
            Arc::new(backend)
        }
        None => {
            warn!("no assessment endpoint configured; deployments will be blocked");
            Arc::new(UnconfiguredBackend)
        }
    })
}

fn print_outcome(report: &RunReport, output: &Path) {
    let status = if report.success { "SUCCESS" } else { "FAILED" };
    println!("Pipeline run complete: {}", status);
    println!("Run ID: {}", report.run_id());
    println!("Duration: {}ms", report.duration_ms());
    println!();

    for stage in &report.stages {
        let mark = match stage.outcome() {
            riskgate_core::StageOutcome::Passed => "✓",
            riskgate_core::StageOutcome::Failed => "✗",
            riskgate_core::StageOutcome::Skipped => "-",
        };
        match &stage.result.reason {
            Some(reason) => println!("  {} {} ({})", mark, stage.kind(), reason),
            None => println!("  {} {}", mark, stage.kind()),
        }
    }

    if let Some(gate) = &report.gate {
        println!();
        println!("Gate: {}", gate.describe());
    }
    if let Some(error) = &report.error {
        println!("Error: [{}] {}", error.code, error.detail);
    }
    if let Some(summary) = &report.ai_summary {
        println!();
        println!("{}", summary.conclusion);
    }
    println!();
    println!("Report written to {:?}", output);
}

fn cmd_config_check(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file {:?} does not exist", path);
    }
    let config = load_config(path).with_context(|| format!("Invalid config file {:?}", path))?;
    println!("✓ {:?} is valid", path);
    println!("  risk_threshold: {}", config.risk_threshold);
    println!("  run_deadline_secs: {}", config.run_deadline_secs);
    match &config.assessment.endpoint {
        Some(endpoint) => println!("  assessment endpoint: {}", endpoint),
        None => println!("  assessment endpoint: (none, deployments blocked)"),
    }
    Ok(())
}

fn cmd_config_default() -> Result<String> {
    render_config(&PipelineConfig::default()).context("Failed to render default config")
}
