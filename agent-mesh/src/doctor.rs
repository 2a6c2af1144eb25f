//! Installation and health checks: executables, the MCP server, and
//! optional real smoke calls.

use crate::config::MeshConfig;
use agent_mesh_mcp::prelude::{CLAUDE_RUN, CODEX_EXEC, GEMINI_RUN};
use agent_mesh_runner::{discover, profile, AgentKind, CapabilityCache, RunnerError};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Prompt used by smoke calls.
pub const SMOKE_PROMPT: &str = "What is 2+2? Reply with just: 4";

const MCP_TIMEOUT: Duration = Duration::from_secs(5);
const REQUIRED_TOOLS: [&str; 3] = [CLAUDE_RUN, CODEX_EXEC, GEMINI_RUN];

/// What to check.
#[derive(Debug, Clone)]
pub struct DoctorOptions {
    /// Working directory for smoke calls.
    pub cwd: PathBuf,
    /// Agents to check.
    pub agents: Vec<AgentKind>,
    /// Executable to start as `<program> serve` for the MCP check; `None` skips it.
    pub mcp_program: Option<PathBuf>,
    /// Make real agent calls.
    pub smoke: bool,
    /// Timeout for each smoke call.
    pub timeout_secs: u64,
}

/// Outcome of locating and probing one agent executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryCheck {
    /// Agent identifier.
    pub name: String,
    /// Whether the executable was found and answered `--version`.
    pub ok: bool,
    /// Resolved executable.
    pub path: Option<String>,
    /// First line of `--version`.
    pub version: Option<String>,
    /// Optional flags detected in `--help`.
    pub features: Vec<String>,
    /// Credential variables that are set. Values are never read.
    pub credentials: Vec<String>,
    /// Non-fatal hint, such as a missing credential variable.
    pub warning: Option<String>,
}

/// Outcome of the MCP self-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McpCheck {
    /// Whether the server listed every mesh tool.
    pub ok: bool,
    /// Tools the server listed.
    pub tools: Vec<String>,
    /// Failure description.
    pub error: Option<String>,
}

/// Outcome of one smoke call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeCheck {
    /// The result's `ok` flag.
    pub ok: bool,
    /// Process exit code.
    pub exit_code: Option<i32>,
    /// Run duration.
    pub duration_ms: u64,
    /// Trimmed response text, when any.
    pub response: Option<String>,
    /// Start of stderr for failed runs.
    pub stderr: String,
}

/// Everything `doctor` found.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    /// Working directory used for smoke calls.
    pub cwd: String,
    /// Executable checks by agent.
    pub binaries: BTreeMap<String, BinaryCheck>,
    /// MCP self-check, when run.
    pub mcp: Option<McpCheck>,
    /// Smoke calls by agent, when run.
    pub smoke: Option<BTreeMap<String, SmokeCheck>>,
}

impl DoctorReport {
    /// Whether every selected check passed.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.binaries.values().all(|b| b.ok)
            && self.mcp.as_ref().is_none_or(|m| m.ok)
            && self.smoke.as_ref().is_none_or(|s| s.values().all(|r| r.ok))
    }

    /// Human-readable summary.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut lines = vec![format!("cwd: {}", self.cwd)];

        if let Some(mcp) = &self.mcp {
            lines.push(format!("mcp: {}", status(mcp.ok)));
            if mcp.ok {
                lines.push(format!("  tools: {}", mcp.tools.join(", ")));
            } else if let Some(error) = &mcp.error {
                lines.push(format!("  error: {error}"));
            }
        }

        for (name, check) in &self.binaries {
            let details: Vec<&str> = [check.version.as_deref(), check.path.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if details.is_empty() {
                lines.push(format!("{name}: {}", status(check.ok)));
            } else {
                lines.push(format!("{name}: {} ({})", status(check.ok), details.join(" | ")));
            }
            if !check.features.is_empty() {
                lines.push(format!("  features: {}", check.features.join(", ")));
            }
            if !check.credentials.is_empty() {
                lines.push(format!("  credentials: {}", check.credentials.join(", ")));
            }
            if let Some(warning) = &check.warning {
                lines.push(format!("  warning: {warning}"));
            }
        }

        match &self.smoke {
            Some(smoke) => {
                lines.push("smoke:".to_string());
                for (name, r) in smoke {
                    let mut extra = format!("{}ms", r.duration_ms);
                    if let Some(response) = &r.response {
                        let head: String = response.chars().take(60).collect();
                        extra.push_str(&format!(", response={head:?}"));
                    }
                    lines.push(format!("  {name}: {} ({extra})", status(r.ok)));
                    if !r.stderr.is_empty() {
                        lines.push(format!("    stderr: {}", r.stderr));
                    }
                }
            }
            None => lines.push("hint: run `agent-mesh smoke` to make a real call".to_string()),
        }

        lines.join("\n")
    }
}

const fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAIL"
    }
}

/// Runs the selected checks.
pub async fn run_doctor(config: &MeshConfig, options: &DoctorOptions) -> DoctorReport {
    let binaries = check_binaries(config, &options.agents, |key| std::env::var(key).ok()).await;

    let mcp = match &options.mcp_program {
        Some(program) => Some(check_mcp_server(program, MCP_TIMEOUT).await),
        None => None,
    };

    let smoke = if options.smoke {
        Some(run_smoke(config, &options.agents, &options.cwd, options.timeout_secs).await)
    } else {
        None
    };

    DoctorReport {
        cwd: options.cwd.display().to_string(),
        binaries,
        mcp,
        smoke,
    }
}

/// Locates and probes each agent executable.
///
/// `lookup` reads environment variables; values are only tested for presence.
pub async fn check_binaries(
    config: &MeshConfig,
    agents: &[AgentKind],
    lookup: impl Fn(&str) -> Option<String>,
) -> BTreeMap<String, BinaryCheck> {
    let cache = CapabilityCache::new(config.mesh().executor());
    let mut checks = BTreeMap::new();

    for &kind in agents {
        let check = match discover(kind, config.binaries.get(&kind).cloned()) {
            None => BinaryCheck {
                name: kind.to_string(),
                ok: false,
                path: None,
                version: None,
                features: Vec::new(),
                credentials: Vec::new(),
                warning: Some(format!("not found on PATH (install: {})", profile(kind).install_hint)),
            },
            Some(path) => match cache.probe(kind, &path).await {
                Ok(report) => BinaryCheck {
                    name: kind.to_string(),
                    ok: true,
                    path: Some(path.display().to_string()),
                    version: Some(report.version).filter(|v| !v.is_empty()),
                    features: report
                        .capabilities
                        .features
                        .iter()
                        .map(|f| format!("{f:?}"))
                        .collect(),
                    credentials: profile(kind)
                        .credential_env
                        .iter()
                        .filter(|key| lookup(**key).is_some_and(|v| !v.is_empty()))
                        .map(|key| (**key).to_string())
                        .collect(),
                    warning: credential_warning(kind, &lookup),
                },
                Err(e) => BinaryCheck {
                    name: kind.to_string(),
                    ok: false,
                    path: Some(path.display().to_string()),
                    version: None,
                    features: Vec::new(),
                    credentials: Vec::new(),
                    warning: Some(e.to_string()),
                },
            },
        };
        checks.insert(kind.to_string(), check);
    }

    checks
}

/// Hints about credentials the agent will probably need. Values are never inspected.
pub fn credential_warning(kind: AgentKind, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let set = |key: &str| lookup(key).is_some_and(|v| !v.is_empty());
    match kind {
        AgentKind::Codex if !set("OPENAI_API_KEY") => {
            Some("OPENAI_API_KEY is not set (Codex calls may fail)".to_string())
        }
        AgentKind::Claude
            if lookup("CLAUDE_CODE_USE_BEDROCK").as_deref() == Some("1")
                && !(set("AWS_PROFILE") && set("AWS_REGION")) =>
        {
            Some(
                "CLAUDE_CODE_USE_BEDROCK=1 but AWS_PROFILE/AWS_REGION not fully set (Claude calls may fail)"
                    .to_string(),
            )
        }
        _ => None,
    }
}

/// Starts `<program> serve` and checks `initialize` plus `tools/list`.
pub async fn check_mcp_server(program: &Path, timeout: Duration) -> McpCheck {
    let mut child = match Command::new(program)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return mcp_failure(Vec::new(), format!("failed to start MCP server: {e}")),
    };

    let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return mcp_failure(Vec::new(), "MCP server pipes were not captured".to_string());
    };
    let mut lines = BufReader::new(stdout).lines();

    let outcome = async {
        let frames = [
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "agent-mesh-doctor", "version": env!("CARGO_PKG_VERSION")}
                }
            }),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}}),
        ];

        send(&mut stdin, &frames[0]).await?;
        let init = recv(&mut lines, timeout).await?;
        if init.get("result").is_none() {
            return Err(format!("initialize failed: {init}"));
        }

        send(&mut stdin, &frames[1]).await?;
        send(&mut stdin, &frames[2]).await?;
        let listed = recv(&mut lines, timeout).await?;
        let tools: Vec<String> = listed
            .pointer("/result/tools")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("tools/list failed: {listed}"))?
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();
        Ok::<_, String>(tools)
    }
    .await;

    drop(stdin);
    if tokio::time::timeout(Duration::from_secs(2), child.wait()).await.is_err() {
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "Failed to stop MCP server");
        }
    }

    match outcome {
        Ok(mut tools) => {
            tools.sort();
            let missing: Vec<&str> = REQUIRED_TOOLS
                .into_iter()
                .filter(|required| !tools.iter().any(|t| t == *required))
                .collect();
            if missing.is_empty() {
                McpCheck {
                    ok: true,
                    tools,
                    error: None,
                }
            } else {
                mcp_failure(tools, format!("missing tools: {missing:?}"))
            }
        }
        Err(error) => mcp_failure(Vec::new(), error),
    }
}

fn mcp_failure(tools: Vec<String>, error: String) -> McpCheck {
    McpCheck {
        ok: false,
        tools,
        error: Some(error),
    }
}

async fn send(stdin: &mut tokio::process::ChildStdin, frame: &Value) -> Result<(), String> {
    let mut line = frame.to_string();
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| format!("write to MCP server failed: {e}"))?;
    stdin.flush().await.map_err(|e| format!("write to MCP server failed: {e}"))
}

async fn recv(
    lines: &mut tokio::io::Lines<BufReader<tokio::process::ChildStdout>>,
    timeout: Duration,
) -> Result<Value, String> {
    let line = tokio::time::timeout(timeout, lines.next_line())
        .await
        .map_err(|_| "timeout waiting for MCP response".to_string())?
        .map_err(|e| format!("read from MCP server failed: {e}"))?
        .ok_or_else(|| "MCP server closed its output".to_string())?;
    serde_json::from_str(&line).map_err(|e| format!("MCP server wrote a non-JSON line ({e}): {line}"))
}

/// Runs [`SMOKE_PROMPT`] against each agent in turn.
pub async fn run_smoke(
    config: &MeshConfig,
    agents: &[AgentKind],
    cwd: &Path,
    timeout_secs: u64,
) -> BTreeMap<String, SmokeCheck> {
    let mesh = config.mesh();
    let mut results = BTreeMap::new();

    for &kind in agents {
        let outcome = match config.run_configuration(
            SMOKE_PROMPT,
            cwd,
            Some(Duration::from_secs(timeout_secs)),
            None,
            &[],
        ) {
            Ok(run) => mesh.runner(kind).run(&run).await,
            Err(e) => Err(e),
        };
        results.insert(kind.to_string(), smoke_check(outcome));
    }

    results
}

fn smoke_check(outcome: Result<agent_mesh_runner::AgentResult, RunnerError>) -> SmokeCheck {
    match outcome {
        Ok(result) => {
            let response = result.response().trim();
            SmokeCheck {
                ok: result.ok(),
                exit_code: result.exit_code(),
                duration_ms: result.duration_ms(),
                response: (!response.is_empty()).then(|| response.to_string()),
                stderr: if result.ok() {
                    String::new()
                } else {
                    result.stderr().trim().chars().take(200).collect()
                },
            }
        }
        Err(e) => SmokeCheck {
            ok: false,
            exit_code: None,
            duration_ms: 0,
            response: None,
            stderr: e.to_string(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_codex_without_api_key_warns() {
        assert!(credential_warning(AgentKind::Codex, env(&[])).is_some());
        assert!(credential_warning(AgentKind::Codex, env(&[("OPENAI_API_KEY", "sk-x")])).is_none());
    }

    #[test]
    fn test_bedrock_needs_profile_and_region() {
        assert!(credential_warning(AgentKind::Claude, env(&[])).is_none());
        let partial = env(&[("CLAUDE_CODE_USE_BEDROCK", "1"), ("AWS_PROFILE", "dev")]);
        assert!(credential_warning(AgentKind::Claude, partial).unwrap().contains("AWS_REGION"));
        let full = env(&[("CLAUDE_CODE_USE_BEDROCK", "1"), ("AWS_PROFILE", "dev"), ("AWS_REGION", "us-east-1")]);
        assert!(credential_warning(AgentKind::Claude, full).is_none());
    }

    #[test]
    fn test_report_fails_when_any_check_fails() {
        let mut report = DoctorReport {
            cwd: "/work".to_string(),
            binaries: BTreeMap::new(),
            mcp: Some(McpCheck {
                ok: true,
                tools: vec![CLAUDE_RUN.to_string()],
                error: None,
            }),
            smoke: None,
        };
        assert!(report.ok());
        assert!(report.render_text().contains("hint: run `agent-mesh smoke`"));

        report.smoke = Some(BTreeMap::from([(
            "gemini".to_string(),
            SmokeCheck {
                ok: false,
                exit_code: Some(1),
                duration_ms: 30,
                response: None,
                stderr: "quota exceeded".to_string(),
            },
        )]));
        assert!(!report.ok());
        let text = report.render_text();
        assert!(text.contains("gemini: FAIL (30ms)"));
        assert!(text.contains("stderr: quota exceeded"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported_with_install_hint() {
        let dir = tempfile::tempdir().unwrap();
        let config = MeshConfig::default().with_binary(AgentKind::Gemini, Some(dir.path().join("gemini")));
        let checks = check_binaries(&config, &[AgentKind::Gemini], env(&[])).await;
        let gemini = &checks["gemini"];
        assert!(!gemini.ok);
        assert!(gemini.warning.as_deref().unwrap().contains("npm install"));
    }

    #[tokio::test]
    async fn test_mcp_check_reports_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_mcp_server(&dir.path().join("nope"), Duration::from_secs(1)).await;
        assert!(!check.ok);
        assert!(check.error.unwrap().contains("failed to start"));
    }
}
