//! Shared data types for run configuration, raw process capture, and the
//! canonical result record.

use crate::error::RunnerError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default wall-clock budget for one run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Largest accepted timeout (two hours).
pub const MAX_TIMEOUT_SECS: u64 = 7200;

/// The external command-line assistants this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Anthropic Claude Code (`claude`).
    Claude,
    /// OpenAI Codex (`codex exec`).
    Codex,
    /// Google Gemini CLI (`gemini`).
    Gemini,
}

impl AgentKind {
    /// Every supported agent, in a stable order.
    pub const ALL: [Self; 3] = [Self::Claude, Self::Codex, Self::Gemini];

    /// Lowercase identifier used on the wire and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            _ => Err(RunnerError::InvalidAgent(s.to_string())),
        }
    }
}

/// Output format requested from the external program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputMode {
    /// One JSON document on stdout.
    #[serde(rename = "json")]
    Json,
    /// Free-form text on stdout.
    #[serde(rename = "text")]
    Text,
    /// Newline-delimited JSON events on stdout.
    #[serde(rename = "jsonl-events")]
    JsonlEvents,
}

impl OutputMode {
    /// Identifier used on the wire and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::JsonlEvents => "jsonl-events",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "jsonl-events" | "jsonl" | "stream-json" => Ok(Self::JsonlEvents),
            other => Err(RunnerError::InvalidConfig(format!(
                "unknown output mode `{other}` (expected json, text, or jsonl-events)"
            ))),
        }
    }
}

/// Input to a single runner invocation.
///
/// Built once through [`RunConfiguration::builder`] and consumed by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    prompt: String,
    working_directory: PathBuf,
    timeout: Duration,
    output_mode: Option<OutputMode>,
    extra_arguments: Vec<String>,
    env: Vec<(String, String)>,
}

impl RunConfiguration {
    /// Starts a builder for the given prompt or task text.
    pub fn builder(prompt: impl Into<String>) -> RunConfigurationBuilder {
        RunConfigurationBuilder {
            prompt: prompt.into(),
            working_directory: None,
            timeout: DEFAULT_TIMEOUT,
            output_mode: None,
            extra_arguments: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Prompt or task text handed to the agent.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Absolute working directory for the child process.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Maximum wall-clock duration of the run.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Requested output mode; `None` means the agent's default.
    #[must_use]
    pub const fn output_mode(&self) -> Option<OutputMode> {
        self.output_mode
    }

    /// Agent-specific flags appended before the prompt.
    #[must_use]
    pub fn extra_arguments(&self) -> &[String] {
        &self.extra_arguments
    }

    /// Environment overrides layered on top of the inherited environment.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

/// Builder for [`RunConfiguration`].
#[derive(Debug, Clone)]
pub struct RunConfigurationBuilder {
    prompt: String,
    working_directory: Option<PathBuf>,
    timeout: Duration,
    output_mode: Option<OutputMode>,
    extra_arguments: Vec<String>,
    env: Vec<(String, String)>,
}

impl RunConfigurationBuilder {
    /// Sets the working directory (relative paths resolve against the current directory).
    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Sets the timeout in whole seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests a specific output mode.
    #[must_use]
    pub const fn output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = Some(mode);
        self
    }

    /// Appends one agent-specific argument.
    #[must_use]
    pub fn extra_argument(mut self, arg: impl Into<String>) -> Self {
        self.extra_arguments.push(arg.into());
        self
    }

    /// Appends several agent-specific arguments, preserving order.
    #[must_use]
    pub fn extra_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment override for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// The working directory is made absolute here but its existence is only
    /// checked at launch time.
    ///
    /// # Errors
    /// Returns [`RunnerError::InvalidConfig`] for an empty prompt, a timeout
    /// outside `1..=7200` seconds, or an unresolvable working directory.
    pub fn build(self) -> Result<RunConfiguration, RunnerError> {
        if self.prompt.trim().is_empty() {
            return Err(RunnerError::InvalidConfig("prompt must not be empty".to_string()));
        }

        let secs = self.timeout.as_secs();
        if self.timeout < Duration::from_secs(1) || secs > MAX_TIMEOUT_SECS {
            return Err(RunnerError::InvalidConfig(format!(
                "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {:?}",
                self.timeout
            )));
        }

        let dir = self.working_directory.unwrap_or_else(|| PathBuf::from("."));
        let working_directory = std::path::absolute(&dir).map_err(|e| {
            RunnerError::InvalidConfig(format!(
                "cannot resolve working directory {}: {e}",
                dir.display()
            ))
        })?;

        Ok(RunConfiguration {
            prompt: self.prompt,
            working_directory,
            timeout: self.timeout,
            output_mode: self.output_mode,
            extra_arguments: self.extra_arguments,
            env: self.env,
        })
    }
}

/// Everything the process executor observed about one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExecution {
    /// Exit code, or `None` when the process was killed (timeout or signal).
    pub exit_code: Option<i32>,
    /// Complete captured standard output.
    pub stdout: String,
    /// Complete captured standard error.
    pub stderr: String,
    /// Spawn time.
    pub started_at: DateTime<Utc>,
    /// Exit (or kill) time; always `started_at + duration_ms`.
    pub ended_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the timeout fired.
    pub timed_out: bool,
}

impl RawExecution {
    /// Builds a record whose `ended_at` is derived from `started_at` and the
    /// measured elapsed time, so the two never disagree.
    #[must_use]
    pub fn from_elapsed(
        started_at: DateTime<Utc>,
        elapsed: Duration,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        timed_out: bool,
    ) -> Self {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let delta = i64::try_from(duration_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX);
        let ended_at = started_at.checked_add_signed(delta).unwrap_or(started_at);

        Self {
            exit_code,
            stdout,
            stderr,
            started_at,
            ended_at,
            duration_ms,
            timed_out,
        }
    }
}

/// Execution model marker. Every run is a single non-interactive invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One invocation that terminates on its own without further input.
    #[default]
    Headless,
}

/// Best-effort structured view of the agent's output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structured {
    /// Primary text answer, or the full raw stdout when none could be found.
    pub response: String,
    /// Parsed events in emission order; empty for non-streaming styles.
    pub events: Vec<serde_json::Value>,
}

/// Side effects attributed to the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    /// Paths changed in the working directory (best effort).
    pub files_written: Vec<String>,
    /// Version-control diff of the working directory; empty when unavailable.
    pub git_diff: String,
}

/// Token usage as reported by the agent. Absent counts stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    pub input_tokens: Option<u64>,
    /// Completion tokens.
    pub output_tokens: Option<u64>,
    /// Prompt tokens served from cache.
    pub cached_input_tokens: Option<u64>,
}

impl Usage {
    /// Returns `true` when no count was reported.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none() && self.cached_input_tokens.is_none()
    }
}

/// The canonical, normalized result of one agent run.
///
/// Instances come out of [`normalize`](crate::normalize::normalize) (or
/// deserialization) and are read-only afterwards. Deserialization rejects
/// records whose `ok` disagrees with `exit_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AgentResultWire")]
pub struct AgentResult {
    agent: AgentKind,
    mode: ExecutionMode,
    cwd: PathBuf,
    ok: bool,
    exit_code: Option<i32>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration_ms: u64,
    stdout: String,
    stderr: String,
    structured: Structured,
    artifacts: Artifacts,
    usage: Usage,
}

#[derive(Deserialize)]
struct AgentResultWire {
    agent: AgentKind,
    mode: ExecutionMode,
    cwd: PathBuf,
    ok: bool,
    exit_code: Option<i32>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration_ms: u64,
    stdout: String,
    stderr: String,
    structured: Structured,
    artifacts: Artifacts,
    usage: Usage,
}

impl TryFrom<AgentResultWire> for AgentResult {
    type Error = String;

    fn try_from(wire: AgentResultWire) -> Result<Self, Self::Error> {
        if wire.ok != (wire.exit_code == Some(0)) {
            return Err(format!(
                "inconsistent result: ok is {} but exit_code is {:?}",
                wire.ok, wire.exit_code
            ));
        }
        if wire.ended_at < wire.started_at {
            return Err("inconsistent result: ended_at precedes started_at".to_string());
        }
        Ok(Self {
            agent: wire.agent,
            mode: wire.mode,
            cwd: wire.cwd,
            ok: wire.ok,
            exit_code: wire.exit_code,
            started_at: wire.started_at,
            ended_at: wire.ended_at,
            duration_ms: wire.duration_ms,
            stdout: wire.stdout,
            stderr: wire.stderr,
            structured: wire.structured,
            artifacts: wire.artifacts,
            usage: wire.usage,
        })
    }
}

impl AgentResult {
    pub(crate) fn from_parts(
        agent: AgentKind,
        cwd: PathBuf,
        raw: RawExecution,
        structured: Structured,
        artifacts: Artifacts,
        usage: Usage,
    ) -> Self {
        let exit_code = if raw.timed_out { None } else { raw.exit_code };
        Self {
            agent,
            mode: ExecutionMode::Headless,
            cwd,
            ok: exit_code == Some(0),
            exit_code,
            started_at: raw.started_at,
            ended_at: raw.ended_at,
            duration_ms: raw.duration_ms,
            stdout: raw.stdout,
            stderr: raw.stderr,
            structured,
            artifacts,
            usage,
        }
    }

    /// Agent that produced this result.
    #[must_use]
    pub const fn agent(&self) -> AgentKind {
        self.agent
    }

    /// Always [`ExecutionMode::Headless`].
    #[must_use]
    pub const fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Absolute working directory used for the run.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// `true` iff the process exited with code zero before the timeout.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.ok
    }

    /// Exit code, `None` when the process was killed.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Spawn time.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Exit time.
    #[must_use]
    pub const fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    /// Wall-clock duration in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Full captured stdout.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Full captured stderr.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Extracted response and parsed events.
    #[must_use]
    pub const fn structured(&self) -> &Structured {
        &self.structured
    }

    /// Workspace side effects.
    #[must_use]
    pub const fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Reported token usage.
    #[must_use]
    pub const fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Shorthand for `structured().response`.
    #[must_use]
    pub fn response(&self) -> &str {
        &self.structured.response
    }

    /// Serializes to the pretty-printed wire shape.
    ///
    /// # Errors
    /// Returns a `serde_json` error if a path is not valid UTF-8.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
