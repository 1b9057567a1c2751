use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::{RunReport, StageEntry};

/// Write the run report as pretty JSON.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Read a run report written by [`write_report_json`].
pub fn read_report_json(path: &Path) -> Result<RunReport> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parse run report {:?}", path))
}

/// Render a markdown summary for PR comments and CI job summaries.
pub fn render_report_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Pipeline Run `{}`\n\n", report.run_id()));
    out.push_str(&format!(
        "- repository: {}\n- branch: {}\n- result: {}\n- duration: {} ms\n\n",
        report.identity.repository,
        report.identity.branch,
        if report.success { "SUCCESS" } else { "FAILED" },
        report.duration_ms()
    ));

    out.push_str("## Stages\n\n");
    if report.stages.is_empty() {
        out.push_str("No stages ran.\n\n");
    } else {
        out.push_str("| Stage | Outcome | Metrics | Detail |\n");
        out.push_str("|---|---|---|---|\n");
        for entry in &report.stages {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                entry.kind(),
                entry.outcome(),
                metrics_cell(entry),
                detail_cell(entry)
            ));
        }
        out.push('\n');
    }

    if let Some(gate) = &report.gate {
        out.push_str("## Deployment Gate\n\n");
        out.push_str(&format!("- {}\n\n", gate.describe()));
    }

    if let Some(summary) = &report.ai_summary {
        out.push_str("## Summary\n\n");
        out.push_str(&summary.conclusion);
        out.push('\n');
        for highlight in &summary.highlights {
            out.push_str(&format!("- {}\n", highlight));
        }
        out.push('\n');
    }

    if let Some(error) = &report.error {
        out.push_str("## Error\n\n");
        out.push_str(&format!("- `{}`: {}\n", error.code, error.detail));
    }
    out
}

/// Write the markdown summary.
pub fn write_report_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_report_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

fn metrics_cell(entry: &StageEntry) -> String {
    if entry.result.metrics.is_empty() {
        return "-".to_string();
    }
    entry
        .result
        .metrics
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn detail_cell(entry: &StageEntry) -> String {
    let detail = entry
        .result
        .error
        .as_deref()
        .or(entry.result.reason.as_deref())
        .or(entry.assessment_error.as_deref())
        .unwrap_or("-");
    detail.replace('|', "\\|")
}
