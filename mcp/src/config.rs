//! Registration snippets for the three agent CLIs.
//!
//! Each agent can itself call the mesh tools once the server is registered in
//! its own configuration file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an MCP client should launch this server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct McpConfig {
    /// The name of the server (e.g. "agent-mesh").
    pub name: String,
    /// The absolute path to the executable.
    pub command: String,
    /// Arguments to pass to the executable.
    pub args: Vec<String>,
    /// Environment variables for the server process.
    pub env: BTreeMap<String, String>,
}

impl McpConfig {
    /// Describes `<current exe> serve` under `name`.
    ///
    /// # Errors
    /// Returns an error if the current executable path cannot be determined.
    pub fn for_current_exe(name: &str) -> Result<Self, std::io::Error> {
        let exe = std::env::current_exe()?;
        Ok(Self {
            name: name.to_string(),
            command: exe.to_string_lossy().to_string(),
            args: vec!["serve".to_string()],
            env: BTreeMap::new(),
        })
    }

    fn server_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "command": &self.command,
            "args": &self.args,
            "env": &self.env
        })
    }

    /// Claude Code format, for `~/.claude.json` or `.mcp.json`.
    #[must_use]
    pub fn to_claude_json(&self) -> serde_json::Value {
        serde_json::json!({ "mcpServers": { &self.name: self.server_entry() } })
    }

    /// Codex `[mcp_servers.<name>]` table, for `~/.codex/config.toml`.
    #[must_use]
    pub fn to_codex_entry(&self) -> toml::Table {
        let mut entry = self.codex_scalars();
        if !self.env.is_empty() {
            entry.insert("env".to_string(), toml::Value::Table(self.codex_env()));
        }
        entry
    }

    /// Codex format, for `~/.codex/config.toml`.
    ///
    /// # Errors
    /// Returns a `toml` serialization error.
    pub fn to_codex_toml(&self) -> Result<String, toml::ser::Error> {
        let header = self.codex_header();
        let mut toml = format!("[{header}]\n{}", toml::to_string(&self.codex_scalars())?);
        if !self.env.is_empty() {
            toml.push_str(&format!("\n[{header}.env]\n{}", toml::to_string(&self.codex_env())?));
        }
        Ok(toml)
    }

    /// Dotted table key `mcp_servers.<name>`, quoting the name when it is not a bare key.
    #[must_use]
    pub fn codex_header(&self) -> String {
        let bare = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if bare {
            format!("mcp_servers.{}", self.name)
        } else {
            format!("mcp_servers.{}", toml::Value::String(self.name.clone()))
        }
    }

    fn codex_scalars(&self) -> toml::Table {
        let mut entry = toml::Table::new();
        entry.insert("command".to_string(), toml::Value::String(self.command.clone()));
        entry.insert(
            "args".to_string(),
            toml::Value::Array(self.args.iter().cloned().map(toml::Value::String).collect()),
        );
        entry
    }

    fn codex_env(&self) -> toml::Table {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), toml::Value::String(v.clone())))
            .collect()
    }

    /// Gemini CLI format, for `~/.gemini/settings.json`.
    #[must_use]
    pub fn to_gemini_json(&self) -> serde_json::Value {
        // Gemini reads the same mcpServers map, plus a per-server timeout.
        let mut entry = self.server_entry();
        entry["timeout"] = serde_json::json!(7_200_000);
        serde_json::json!({ "mcpServers": { &self.name: entry } })
    }
}
