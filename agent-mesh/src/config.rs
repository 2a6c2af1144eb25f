//! Command-line configuration shared by every subcommand.

use agent_mesh_runner::{AgentKind, AgentMesh, OutputMode, RunConfiguration, RunnerError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default agent timeout for `run` and the review pipeline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Settings collected from global flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshConfig {
    /// Timeout used when a command does not set its own.
    pub timeout_secs: u64,
    /// Explicit executables, bypassing discovery.
    pub binaries: BTreeMap<AgentKind, PathBuf>,
    /// Extra environment for every agent process.
    pub env: Vec<(String, String)>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            binaries: BTreeMap::new(),
            env: Vec::new(),
        }
    }
}

impl MeshConfig {
    /// Pins the executable for `kind` when `path` is set.
    #[must_use]
    pub fn with_binary(mut self, kind: AgentKind, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.binaries.insert(kind, path);
        }
        self
    }

    /// Adds child environment overrides.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Builds the dispatcher with default collaborators and the pinned binaries.
    #[must_use]
    pub fn mesh(&self) -> AgentMesh {
        self.binaries
            .iter()
            .fold(AgentMesh::builder(), |builder, (kind, path)| builder.program(*kind, path.clone()))
            .build()
    }

    /// Starts a run configuration carrying the shared environment.
    ///
    /// # Errors
    /// Returns [`RunnerError::InvalidConfig`] for an empty prompt or an
    /// out-of-range timeout.
    pub fn run_configuration(
        &self,
        prompt: &str,
        cwd: &Path,
        timeout: Option<Duration>,
        mode: Option<OutputMode>,
        extra_arguments: &[String],
    ) -> Result<RunConfiguration, RunnerError> {
        let mut builder = RunConfiguration::builder(prompt)
            .working_directory(cwd)
            .timeout(timeout.unwrap_or(Duration::from_secs(self.timeout_secs)))
            .extra_arguments(extra_arguments.iter().cloned());
        if let Some(mode) = mode {
            builder = builder.output_mode(mode);
        }
        for (key, value) in &self.env {
            builder = builder.env(key.clone(), value.clone());
        }
        builder.build()
    }
}

/// Parses a `KEY=VALUE` pair.
///
/// # Errors
/// Returns a message when there is no `=` or the key is empty.
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

/// Parses agent identifiers, failing on the first unknown one.
///
/// An empty list selects every agent.
///
/// # Errors
/// Returns [`RunnerError::InvalidAgent`] for an unknown identifier.
pub fn parse_agents(raw: &[String]) -> Result<Vec<AgentKind>, RunnerError> {
    if raw.is_empty() {
        return Ok(AgentKind::ALL.to_vec());
    }
    raw.iter().map(|name| name.parse()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_env_pairs() {
        assert_eq!(parse_env_pair("A=b=c").unwrap(), ("A".to_string(), "b=c".to_string()));
        assert_eq!(parse_env_pair("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=x").is_err());
    }

    #[test]
    fn test_agent_selection() {
        assert_eq!(parse_agents(&[]).unwrap(), AgentKind::ALL.to_vec());
        assert_eq!(
            parse_agents(&["gemini".to_string(), "Codex".to_string()]).unwrap(),
            vec![AgentKind::Gemini, AgentKind::Codex]
        );
        assert!(matches!(
            parse_agents(&["claude".to_string(), "llama".to_string()]),
            Err(RunnerError::InvalidAgent(name)) if name == "llama"
        ));
    }

    #[test]
    fn test_run_configuration_carries_shared_env() {
        let dir = tempfile::tempdir().unwrap();
        let config = MeshConfig::default()
            .with_env(vec![("HTTPS_PROXY".to_string(), "http://proxy:3128".to_string())])
            .run_configuration("hi", dir.path(), None, Some(OutputMode::Text), &["--model".to_string(), "x".to_string()])
            .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.env(), [("HTTPS_PROXY".to_string(), "http://proxy:3128".to_string())]);
        assert_eq!(config.extra_arguments(), ["--model", "x"]);
        assert_eq!(config.output_mode(), Some(OutputMode::Text));
    }
}
