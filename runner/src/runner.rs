//! Per-agent runners and the identifier-keyed dispatcher.

use crate::agents::{profile, AgentProfile};
use crate::discovery::resolve_program;
use crate::error::{LaunchFailureKind, RunnerError};
use crate::normalize::normalize;
use crate::process::{ExecRequest, Executor, ProcessExecutor};
use crate::types::{AgentKind, AgentResult, RunConfiguration};
use crate::workspace::{GitWorkspace, WorkspaceProbe};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Drives one agent CLI through execute, parse and normalize.
///
/// A runner holds no per-call state; clones share the executor and
/// workspace probe and may run concurrently.
#[derive(Clone)]
pub struct Runner {
    profile: &'static AgentProfile,
    program: PathBuf,
    executor: Arc<dyn Executor>,
    workspace: Arc<dyn WorkspaceProbe>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("agent", &self.profile.kind)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner for `kind` with a discovered executable, the process
    /// executor and git workspace capture.
    #[must_use]
    pub fn new(kind: AgentKind) -> Self {
        Self::with_parts(
            kind,
            resolve_program(kind, None),
            Arc::new(ProcessExecutor::new()),
            Arc::new(GitWorkspace),
        )
    }

    /// Creates a runner from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        kind: AgentKind,
        program: PathBuf,
        executor: Arc<dyn Executor>,
        workspace: Arc<dyn WorkspaceProbe>,
    ) -> Self {
        Self {
            profile: profile(kind),
            program,
            executor,
            workspace,
        }
    }

    /// The agent this runner drives.
    #[must_use]
    pub const fn agent(&self) -> AgentKind {
        self.profile.kind
    }

    /// The executable that will be spawned.
    #[must_use]
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Runs one headless invocation.
    ///
    /// Non-zero exits, timeouts and unparseable output come back as a
    /// result with `ok == false`. The workspace snapshot is attached on
    /// every path that produced an execution.
    ///
    /// # Errors
    /// Returns [`RunnerError::LaunchFailure`] when the working directory is
    /// unusable or the process could not be started.
    #[tracing::instrument(
        skip(self, config),
        fields(agent = %self.profile.kind, cwd = %config.working_directory().display())
    )]
    pub async fn run(&self, config: &RunConfiguration) -> Result<AgentResult, RunnerError> {
        let cwd = config.working_directory().canonicalize().map_err(|source| RunnerError::LaunchFailure {
            program: self.program.display().to_string(),
            kind: LaunchFailureKind::WorkingDirectory,
            stage: "resolve working directory".to_string(),
            source,
        })?;

        let mode = self.profile.resolve_mode(config.output_mode());
        let request = ExecRequest {
            program: self.program.clone(),
            args: self.profile.build_args(mode, config),
            cwd: cwd.clone(),
            env: config.env().to_vec(),
            timeout: config.timeout(),
        };

        tracing::info!(%mode, timeout_s = config.timeout().as_secs(), "Starting agent run");

        let raw = self.executor.execute(&request).await?;
        if raw.timed_out {
            tracing::warn!(duration_ms = raw.duration_ms, "Agent run timed out");
        }

        let parsed = AgentProfile::style_for(mode).parse(&raw.stdout);
        let snapshot = self.workspace.capture(&cwd).await;
        let result = normalize(self.profile, &cwd, raw, parsed, snapshot);

        tracing::info!(
            ok = result.ok(),
            exit_code = ?result.exit_code(),
            duration_ms = result.duration_ms(),
            "Agent run finished"
        );

        Ok(result)
    }
}

/// Dispatches runs by agent identifier over shared collaborators.
#[derive(Clone)]
pub struct AgentMesh {
    executor: Arc<dyn Executor>,
    workspace: Arc<dyn WorkspaceProbe>,
    programs: HashMap<AgentKind, PathBuf>,
}

impl std::fmt::Debug for AgentMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentMesh")
            .field("programs", &self.programs)
            .finish_non_exhaustive()
    }
}

impl Default for AgentMesh {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AgentMesh {
    /// Creates a dispatcher with default collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a dispatcher.
    #[must_use]
    pub fn builder() -> AgentMeshBuilder {
        AgentMeshBuilder::default()
    }

    /// Builds the runner for `kind`, resolving its executable.
    #[must_use]
    pub fn runner(&self, kind: AgentKind) -> Runner {
        let program = resolve_program(kind, self.programs.get(&kind).cloned());
        Runner::with_parts(kind, program, self.executor.clone(), self.workspace.clone())
    }

    /// Shared executor, for collaborators such as capability probing.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }

    /// Runs `configuration` on the agent named `agent`.
    ///
    /// # Errors
    /// Returns [`RunnerError::InvalidAgent`] before anything is spawned when
    /// `agent` is not `claude`, `codex` or `gemini`, and
    /// [`RunnerError::LaunchFailure`] when the process could not start.
    pub async fn run(&self, agent: &str, configuration: &RunConfiguration) -> Result<AgentResult, RunnerError> {
        let kind: AgentKind = agent.parse()?;
        self.runner(kind).run(configuration).await
    }
}

/// Builder for [`AgentMesh`].
#[derive(Default)]
pub struct AgentMeshBuilder {
    executor: Option<Arc<dyn Executor>>,
    workspace: Option<Arc<dyn WorkspaceProbe>>,
    programs: HashMap<AgentKind, PathBuf>,
}

impl AgentMeshBuilder {
    /// Replaces the process executor.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replaces the workspace probe.
    #[must_use]
    pub fn workspace(mut self, workspace: Arc<dyn WorkspaceProbe>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Pins the executable used for `kind`, skipping discovery.
    #[must_use]
    pub fn program(mut self, kind: AgentKind, path: impl Into<PathBuf>) -> Self {
        self.programs.insert(kind, path.into());
        self
    }

    /// Finishes the dispatcher.
    #[must_use]
    pub fn build(self) -> AgentMesh {
        AgentMesh {
            executor: self.executor.unwrap_or_else(|| Arc::new(ProcessExecutor::new())),
            workspace: self.workspace.unwrap_or_else(|| Arc::new(GitWorkspace)),
            programs: self.programs,
        }
    }
}

/// Runs `configuration` on `agent` with default collaborators.
///
/// # Errors
/// See [`AgentMesh::run`].
pub async fn run_agent(agent: &str, configuration: &RunConfiguration) -> Result<AgentResult, RunnerError> {
    AgentMesh::new().run(agent, configuration).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::RawExecution;
    use crate::workspace::NoWorkspace;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<ExecRequest>>,
        stdout: String,
    }

    #[async_trait]
    impl Executor for Recorder {
        async fn execute(&self, request: &ExecRequest) -> Result<RawExecution, RunnerError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(RawExecution::from_elapsed(
                Utc::now(),
                Duration::from_millis(12),
                Some(0),
                self.stdout.clone(),
                String::new(),
                false,
            ))
        }
    }

    fn mesh(recorder: Arc<Recorder>) -> AgentMesh {
        AgentMesh::builder()
            .executor(recorder)
            .workspace(Arc::new(NoWorkspace))
            .program(AgentKind::Claude, "/opt/agents/claude")
            .build()
    }

    #[tokio::test]
    async fn test_claude_request_and_result() {
        let recorder = Arc::new(Recorder {
            stdout: r#"{"result":"4","usage":{"input_tokens":3,"output_tokens":1}}"#.to_string(),
            ..Recorder::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfiguration::builder("What is 2+2?")
            .working_directory(dir.path())
            .timeout_secs(30)
            .env("FOO", "bar")
            .build()
            .unwrap();

        let result = mesh(recorder.clone()).run("Claude", &config).await.unwrap();
        assert!(result.ok());
        assert_eq!(result.response(), "4");
        assert_eq!(result.usage().input_tokens, Some(3));
        assert_eq!(result.cwd(), dir.path().canonicalize().unwrap());

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.program, PathBuf::from("/opt/agents/claude"));
        assert_eq!(request.timeout, Duration::from_secs(30));
        assert_eq!(request.env, vec![("FOO".to_string(), "bar".to_string())]);
        let args: Vec<_> = request.args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["--print", "--output-format", "json", "What is 2+2?"]);
    }

    #[tokio::test]
    async fn test_unknown_agent_never_reaches_executor() {
        let recorder = Arc::new(Recorder::default());
        let config = RunConfiguration::builder("hi").build().unwrap();
        let err = mesh(recorder.clone()).run("gpt", &config).await.unwrap_err();
        assert!(matches!(err, RunnerError::InvalidAgent(ref name) if name == "gpt"));
        assert!(recorder.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_working_directory_never_reaches_executor() {
        let recorder = Arc::new(Recorder::default());
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfiguration::builder("hi")
            .working_directory(dir.path().join("gone"))
            .build()
            .unwrap();
        let err = mesh(recorder.clone()).run("codex", &config).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::LaunchFailure { kind: LaunchFailureKind::WorkingDirectory, .. }
        ));
        assert!(recorder.requests.lock().unwrap().is_empty());
    }
}
