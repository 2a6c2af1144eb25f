//! Tool declarations for the three agents: argument types, generated input
//! schemas, validation, and the mapping into a [`RunConfiguration`].

use crate::error::ToolAdapterError;
use agent_mesh_runner::{AgentKind, OutputMode, RunConfiguration, RunnerError};
use jsonschema::Validator;
use rmcp::model::{JsonObject, Tool as McpTool};
use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

/// Name of the Claude tool.
pub const CLAUDE_RUN: &str = "claude_run";
/// Name of the Codex tool.
pub const CODEX_EXEC: &str = "codex_exec";
/// Name of the Gemini tool.
pub const GEMINI_RUN: &str = "gemini_run";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Output format a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormatArg {
    /// One JSON document.
    Json,
    /// Plain text.
    Text,
    /// Newline-delimited JSON events.
    StreamJson,
}

impl From<OutputFormatArg> for OutputMode {
    fn from(format: OutputFormatArg) -> Self {
        match format {
            OutputFormatArg::Json => Self::Json,
            OutputFormatArg::Text => Self::Text,
            OutputFormatArg::StreamJson => Self::JsonlEvents,
        }
    }
}

/// Arguments of `claude_run`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ClaudeRunArgs {
    /// The prompt to send to Claude.
    pub prompt: String,
    /// Working directory. Defaults to the server's current directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Timeout in seconds (1 to 7200). Defaults to 120.
    #[serde(default)]
    pub timeout_s: Option<u64>,
    /// Output format requested from the CLI. Defaults to json.
    #[serde(default)]
    pub output_format: Option<OutputFormatArg>,
}

/// Arguments of `codex_exec`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CodexExecArgs {
    /// The task to execute.
    pub task: String,
    /// Working directory. Defaults to the server's current directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Timeout in seconds (1 to 7200). Defaults to 120.
    #[serde(default)]
    pub timeout_s: Option<u64>,
    /// Return JSONL events instead of plain text.
    #[serde(default = "default_true")]
    pub json_events: bool,
}

/// Arguments of `gemini_run`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GeminiRunArgs {
    /// The prompt to send to Gemini.
    pub prompt: String,
    /// Working directory. Defaults to the server's current directory.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Timeout in seconds (1 to 7200). Defaults to 120.
    #[serde(default)]
    pub timeout_s: Option<u64>,
    /// Output format requested from the CLI. Defaults to json.
    #[serde(default)]
    pub output_format: Option<OutputFormatArg>,
}

const fn default_true() -> bool {
    true
}

/// Tool arguments that describe one agent run.
pub trait ToolArgs: JsonSchema + DeserializeOwned {
    /// Agent the tool drives.
    const AGENT: AgentKind;

    /// Converts the arguments into a validated run configuration.
    ///
    /// # Errors
    /// Returns [`RunnerError::InvalidConfig`] when the values are out of range.
    fn into_configuration(self) -> Result<RunConfiguration, RunnerError>;
}

fn configure(
    prompt: String,
    cwd: Option<String>,
    timeout_s: Option<u64>,
    mode: Option<OutputMode>,
) -> Result<RunConfiguration, RunnerError> {
    let mut builder = RunConfiguration::builder(prompt)
        .working_directory(cwd.unwrap_or_else(|| ".".to_string()))
        .timeout_secs(timeout_s.unwrap_or(DEFAULT_TIMEOUT_SECS));
    if let Some(mode) = mode {
        builder = builder.output_mode(mode);
    }
    builder.build()
}

impl ToolArgs for ClaudeRunArgs {
    const AGENT: AgentKind = AgentKind::Claude;

    fn into_configuration(self) -> Result<RunConfiguration, RunnerError> {
        configure(self.prompt, self.cwd, self.timeout_s, self.output_format.map(Into::into))
    }
}

impl ToolArgs for CodexExecArgs {
    const AGENT: AgentKind = AgentKind::Codex;

    fn into_configuration(self) -> Result<RunConfiguration, RunnerError> {
        let mode = if self.json_events { OutputMode::JsonlEvents } else { OutputMode::Text };
        configure(self.task, self.cwd, self.timeout_s, Some(mode))
    }
}

impl ToolArgs for GeminiRunArgs {
    const AGENT: AgentKind = AgentKind::Gemini;

    fn into_configuration(self) -> Result<RunConfiguration, RunnerError> {
        configure(self.prompt, self.cwd, self.timeout_s, self.output_format.map(Into::into))
    }
}

/// Why a tool call's arguments were rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// The tool name is not one of the mesh tools.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    /// The arguments do not match the input schema.
    #[error("Invalid arguments: {}", .0.join("; "))]
    Schema(Vec<String>),
    /// The arguments match the schema but describe an invalid run.
    #[error("{0}")]
    Config(String),
}

/// A declared tool with its compiled input validator.
pub struct MeshTool {
    /// Tool name as listed to clients.
    pub name: &'static str,
    /// Agent the tool drives.
    pub agent: AgentKind,
    /// Human-readable description.
    pub description: &'static str,
    schema: Arc<JsonObject>,
    validator: Arc<Validator>,
    configure: fn(Value) -> Result<RunConfiguration, ArgumentError>,
}

impl std::fmt::Debug for MeshTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshTool")
            .field("name", &self.name)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl MeshTool {
    fn new<T: ToolArgs>(name: &'static str, description: &'static str) -> Result<Self, ToolAdapterError> {
        let schema = serde_json::to_value(schema_for!(T)).map_err(|e| ToolAdapterError::Schema {
            tool: name.to_string(),
            message: e.to_string(),
        })?;
        let validator = Validator::new(&schema).map_err(|e| ToolAdapterError::Schema {
            tool: name.to_string(),
            message: e.to_string(),
        })?;
        let schema = match schema {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        };

        Ok(Self {
            name,
            agent: T::AGENT,
            description,
            schema: Arc::new(schema),
            validator: Arc::new(validator),
            configure: configure_from::<T>,
        })
    }

    /// MCP definition advertised by `tools/list`.
    #[must_use]
    pub fn definition(&self) -> McpTool {
        McpTool {
            name: Cow::Borrowed(self.name),
            title: Some(self.name.to_string()),
            description: Some(Cow::Borrowed(self.description)),
            input_schema: self.schema.clone(),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        }
    }

    /// Validates raw arguments against the input schema and builds the run.
    ///
    /// # Errors
    /// Returns [`ArgumentError::Schema`] listing every schema violation, or
    /// [`ArgumentError::Config`] when the values fail run validation.
    pub fn configuration(&self, arguments: Option<JsonObject>) -> Result<RunConfiguration, ArgumentError> {
        let arguments = Value::Object(arguments.unwrap_or_default());
        let errors: Vec<String> = self.validator.iter_errors(&arguments).map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            return Err(ArgumentError::Schema(errors));
        }
        (self.configure)(arguments)
    }
}

fn configure_from<T: ToolArgs>(arguments: Value) -> Result<RunConfiguration, ArgumentError> {
    let args: T = serde_json::from_value(arguments).map_err(|e| ArgumentError::Schema(vec![e.to_string()]))?;
    args.into_configuration().map_err(|e| ArgumentError::Config(e.to_string()))
}

/// Builds the three mesh tools.
///
/// # Errors
/// Returns [`ToolAdapterError::Schema`] if a generated schema fails to compile.
pub fn mesh_tools() -> Result<Vec<MeshTool>, ToolAdapterError> {
    Ok(vec![
        MeshTool::new::<ClaudeRunArgs>(
            CLAUDE_RUN,
            "Run Claude Code CLI in headless mode and return structured JSON result.",
        )?,
        MeshTool::new::<CodexExecArgs>(
            CODEX_EXEC,
            "Run Codex CLI exec in headless mode and return structured JSON result.",
        )?,
        MeshTool::new::<GeminiRunArgs>(
            GEMINI_RUN,
            "Run Gemini CLI in headless mode and return structured JSON result.",
        )?,
    ])
}
