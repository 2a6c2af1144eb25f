//! Review pipeline: Claude implements, Codex reviews the resulting diff.

use crate::config::MeshConfig;
use agent_mesh_runner::{AgentKind, AgentMesh, AgentResult, OutputMode, RunnerError};
use serde::Serialize;
use std::path::Path;

/// Pipeline stage a report ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// The implementation run failed; no review happened.
    Implementation,
    /// Both runs happened.
    Complete,
}

/// Output of `pipeline review`.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    /// Where the pipeline stopped.
    pub stage: Stage,
    /// Whether the implementation succeeded and a review was produced.
    pub success: bool,
    /// Implementation stderr when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Workspace diff handed to the reviewer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// The implementation run.
    pub claude_result: AgentResult,
    /// The review run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex_result: Option<AgentResult>,
}

/// Builds the reviewer prompt around a diff.
#[must_use]
pub fn review_prompt(diff: &str) -> String {
    format!(
        "Review the following code changes and provide feedback:\n\n\
         ```diff\n{diff}\n```\n\n\
         Provide your review as JSON with fields:\n\
         - issues: list of {{description, severity, file, line}}\n\
         - summary: brief overall assessment\n\
         - approved: boolean\n"
    )
}

/// Runs Claude on `prompt`, then Codex on the diff Claude left behind.
///
/// # Errors
/// Propagates [`RunnerError`] when either agent cannot be launched or the
/// configuration is invalid.
#[tracing::instrument(skip(mesh, config, prompt), fields(cwd = %cwd.display()))]
pub async fn run_review(
    mesh: &AgentMesh,
    config: &MeshConfig,
    prompt: &str,
    cwd: &Path,
) -> Result<ReviewReport, RunnerError> {
    let implement = config.run_configuration(prompt, cwd, None, Some(OutputMode::Json), &[])?;
    let claude_result = mesh.runner(AgentKind::Claude).run(&implement).await?;

    if !claude_result.ok() {
        tracing::warn!(exit_code = ?claude_result.exit_code(), "Implementation failed, skipping review");
        return Ok(ReviewReport {
            stage: Stage::Implementation,
            success: false,
            error: Some(claude_result.stderr().to_string()),
            diff: None,
            claude_result,
            codex_result: None,
        });
    }

    let diff = claude_result.artifacts().git_diff.clone();
    let review = config.run_configuration(&review_prompt(&diff), cwd, None, Some(OutputMode::JsonlEvents), &[])?;
    let codex_result = mesh.runner(AgentKind::Codex).run(&review).await?;

    Ok(ReviewReport {
        stage: Stage::Complete,
        success: true,
        error: None,
        diff: Some(diff),
        claude_result,
        codex_result: Some(codex_result),
    })
}
