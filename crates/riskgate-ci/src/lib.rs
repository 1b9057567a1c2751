//! riskgate pipeline orchestrator
//!
//! Drives the fixed stage sequence:
//! - Analysis, SecurityScan and Testing always run
//! - InfraValidation runs when infrastructure-as-code files exist
//! - Deployment runs only through the fail-closed risk gate
//!
//! and always returns a finalized `RunReport`.

pub mod gate;
pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use gate::DeploymentGate;
pub use pipeline::{Collaborators, Pipeline, RunRequest};
pub use runner::{CommandOutput, CommandRunner, CommandTool};
pub use stage::{
    AnalysisStage, InfraStage, SecurityStage, StageExecutor, TestingStage, REASON_DEPLOY_FAILED,
    REASON_NO_IAC,
};
