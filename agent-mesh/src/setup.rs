//! Registers the MCP server in each agent CLI's user configuration.

use agent_mesh_mcp::prelude::McpConfig;
use anyhow::Context;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Options for `agent-mesh setup`.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Home directory holding the client configs.
    pub home: PathBuf,
}

impl SetupConfig {
    /// Uses the current user's home directory.
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined.
    pub fn for_current_user(dry_run: bool) -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(Self { dry_run, home })
    }
}

/// What happened to one client config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupAction {
    /// The entry was written.
    Registered,
    /// The entry would be written.
    WouldRegister,
    /// An identical entry was already present.
    AlreadyPresent,
}

/// Per-client outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOutcome {
    /// Client display name.
    pub client: &'static str,
    /// Config file touched.
    pub path: PathBuf,
    /// Result.
    pub action: SetupAction,
}

impl fmt::Display for SetupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.action {
            SetupAction::Registered => "[OK]",
            SetupAction::WouldRegister => "[DRY RUN]",
            SetupAction::AlreadyPresent => "[SKIP]",
        };
        write!(f, "{tag} {} ({})", self.client, self.path.display())
    }
}

/// Registers `server` with Claude Code, Gemini CLI, and Codex.
///
/// # Errors
/// Returns an error if a config file cannot be read, parsed or written, or
/// holds a non-object `mcpServers` entry. Files that fail to parse are never
/// rewritten.
pub fn run_setup(config: &SetupConfig, server: &McpConfig) -> anyhow::Result<Vec<SetupOutcome>> {
    tracing::info!(home = %config.home.display(), dry_run = config.dry_run, "Registering MCP server");

    let claude = config.home.join(".claude.json");
    let gemini = config.home.join(".gemini").join("settings.json");
    let codex = config.home.join(".codex").join("config.toml");

    Ok(vec![
        register_json("Claude Code", &claude, &server.to_claude_json(), config.dry_run)?,
        register_json("Gemini CLI", &gemini, &server.to_gemini_json(), config.dry_run)?,
        register_codex(&codex, server, config.dry_run)?,
    ])
}

fn register_json(client: &'static str, path: &Path, snippet: &Value, dry_run: bool) -> anyhow::Result<SetupOutcome> {
    let mut data = if path.exists() {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str::<Value>(&content).with_context(|| {
            format!(
                "{} is not valid JSON (comments are not supported); fix or remove it and re-run setup",
                path.display()
            )
        })?
    } else {
        serde_json::json!({})
    };

    let root = data
        .as_object_mut()
        .with_context(|| format!("Invalid {client} config: top level must be an object"))?;
    let servers = root
        .entry("mcpServers")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .with_context(|| format!("Invalid {client} config: mcpServers must be an object"))?;

    let mut changed = false;
    if let Some(entries) = snippet.get("mcpServers").and_then(Value::as_object) {
        for (name, entry) in entries {
            if servers.get(name) != Some(entry) {
                servers.insert(name.clone(), entry.clone());
                changed = true;
            }
        }
    }

    let action = match (changed, dry_run) {
        (false, _) => SetupAction::AlreadyPresent,
        (true, true) => SetupAction::WouldRegister,
        (true, false) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, serde_json::to_string_pretty(&data)?)?;
            SetupAction::Registered
        }
    };
    Ok(SetupOutcome { client, path: path.to_path_buf(), action })
}

fn register_codex(path: &Path, server: &McpConfig, dry_run: bool) -> anyhow::Result<SetupOutcome> {
    let content = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    } else {
        String::new()
    };
    let existing: toml::Table = content.parse().with_context(|| {
        format!("{} is not valid TOML; fix or remove it and re-run setup", path.display())
    })?;

    let wanted = toml::Value::Table(server.to_codex_entry());
    let current = existing
        .get("mcp_servers")
        .and_then(toml::Value::as_table)
        .and_then(|servers| servers.get(&server.name));
    if current == Some(&wanted) {
        return Ok(SetupOutcome { client: "Codex", path: path.to_path_buf(), action: SetupAction::AlreadyPresent });
    }

    let mut updated = strip_table(&content, &server.codex_header());
    if !updated.is_empty() {
        updated.push('\n');
    }
    updated.push_str(&server.to_codex_toml()?);

    let reparsed: toml::Table = updated.parse().with_context(|| {
        format!(
            "Could not replace the {} entry in {}; edit it by hand",
            server.name,
            path.display()
        )
    })?;
    let written = reparsed
        .get("mcp_servers")
        .and_then(toml::Value::as_table)
        .and_then(|servers| servers.get(&server.name));
    anyhow::ensure!(
        written == Some(&wanted),
        "Could not replace the {} entry in {}; edit it by hand",
        server.name,
        path.display()
    );

    let action = if dry_run {
        SetupAction::WouldRegister
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, updated)?;
        SetupAction::Registered
    };
    Ok(SetupOutcome { client: "Codex", path: path.to_path_buf(), action })
}

/// Removes the `[key]` table and its `[key.*]` subtables, keeping every other
/// line. Returns the text ending in a newline, or empty.
fn strip_table(content: &str, key: &str) -> String {
    let key = table_key(key);
    let nested = format!("{key}.");
    let mut skipping = false;
    let mut kept = String::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            let header = table_key(trimmed.split(']').next().unwrap_or_default());
            skipping = header == key || header.starts_with(&nested);
        }
        if !skipping {
            kept.push_str(line);
            kept.push('\n');
        }
    }

    let trimmed_len = kept.trim_end().len();
    kept.truncate(trimmed_len);
    if !kept.is_empty() {
        kept.push('\n');
    }
    kept
}

fn table_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"' | '\'') && !c.is_whitespace())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn server() -> McpConfig {
        McpConfig {
            name: "agent-mesh".to_string(),
            command: "/opt/bin/agent-mesh".to_string(),
            args: vec!["serve".to_string()],
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn test_registers_all_clients_and_keeps_existing_entries() {
        let home = tempfile::tempdir().unwrap();
        fs::write(
            home.path().join(".claude.json"),
            r#"{"theme":"dark","mcpServers":{"other":{"command":"x"}}}"#,
        )
        .unwrap();
        let config = SetupConfig { dry_run: false, home: home.path().to_path_buf() };

        let outcomes = run_setup(&config, &server()).unwrap();
        assert!(outcomes.iter().all(|o| o.action == SetupAction::Registered));

        let claude: Value = serde_json::from_str(&fs::read_to_string(home.path().join(".claude.json")).unwrap()).unwrap();
        assert_eq!(claude["theme"], "dark");
        assert_eq!(claude["mcpServers"]["other"]["command"], "x");
        assert_eq!(claude["mcpServers"]["agent-mesh"]["args"][0], "serve");

        let gemini: Value =
            serde_json::from_str(&fs::read_to_string(home.path().join(".gemini/settings.json")).unwrap()).unwrap();
        assert_eq!(gemini["mcpServers"]["agent-mesh"]["command"], "/opt/bin/agent-mesh");

        let codex: toml::Table = fs::read_to_string(home.path().join(".codex/config.toml")).unwrap().parse().unwrap();
        assert_eq!(codex["mcp_servers"]["agent-mesh"]["command"].as_str(), Some("/opt/bin/agent-mesh"));
    }

    #[test]
    fn test_codex_entry_is_not_duplicated() {
        let home = tempfile::tempdir().unwrap();
        let config = SetupConfig { dry_run: false, home: home.path().to_path_buf() };

        run_setup(&config, &server()).unwrap();
        let outcomes = run_setup(&config, &server()).unwrap();

        assert!(outcomes.iter().all(|o| o.action == SetupAction::AlreadyPresent));
        assert!(outcomes[2].to_string().starts_with("[SKIP] Codex"));
        let codex = fs::read_to_string(home.path().join(".codex/config.toml")).unwrap();
        assert_eq!(codex.matches("[mcp_servers.agent-mesh]").count(), 1);
    }

    #[test]
    fn test_changed_registration_replaces_codex_entry_in_place() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(".codex")).unwrap();
        fs::write(
            home.path().join(".codex/config.toml"),
            "# my settings\nmodel = \"o3\"\n\n[mcp_servers.agent-mesh]\ncommand = \"/old/agent-mesh\"\nargs = [\"serve\"]\n\n\
             [mcp_servers.agent-mesh.env]\nSTALE = \"1\"\n\n[mcp_servers.other]\ncommand = \"x\"\n",
        )
        .unwrap();
        let config = SetupConfig { dry_run: false, home: home.path().to_path_buf() };

        let mut updated = server();
        updated.args = vec!["--claude-bin".to_string(), "/opt/claude".to_string(), "serve".to_string()];
        let outcomes = run_setup(&config, &updated).unwrap();
        assert_eq!(outcomes[2].action, SetupAction::Registered);

        let text = fs::read_to_string(home.path().join(".codex/config.toml")).unwrap();
        assert!(text.starts_with("# my settings\n"));
        assert_eq!(text.matches("[mcp_servers.agent-mesh]").count(), 1);
        assert!(!text.contains("STALE"));

        let codex: toml::Table = text.parse().unwrap();
        assert_eq!(codex["model"].as_str(), Some("o3"));
        assert_eq!(codex["mcp_servers"]["other"]["command"].as_str(), Some("x"));
        let entry = &codex["mcp_servers"]["agent-mesh"];
        assert_eq!(entry["command"].as_str(), Some("/opt/bin/agent-mesh"));
        assert_eq!(entry["args"][1].as_str(), Some("/opt/claude"));

        let claude: Value = serde_json::from_str(&fs::read_to_string(home.path().join(".claude.json")).unwrap()).unwrap();
        assert_eq!(claude["mcpServers"]["agent-mesh"]["args"][1], "/opt/claude");

        let again = run_setup(&config, &updated).unwrap();
        assert!(again.iter().all(|o| o.action == SetupAction::AlreadyPresent));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let home = tempfile::tempdir().unwrap();
        let config = SetupConfig { dry_run: true, home: home.path().to_path_buf() };

        let outcomes = run_setup(&config, &server()).unwrap();

        assert!(outcomes.iter().all(|o| o.action == SetupAction::WouldRegister));
        assert!(!home.path().join(".claude.json").exists());
        assert!(!home.path().join(".codex").exists());
        assert!(outcomes[0].to_string().starts_with("[DRY RUN] Claude Code"));
    }

    #[test]
    fn test_non_object_servers_is_rejected() {
        let home = tempfile::tempdir().unwrap();
        fs::write(home.path().join(".claude.json"), r#"{"mcpServers":[1,2]}"#).unwrap();
        let config = SetupConfig { dry_run: false, home: home.path().to_path_buf() };

        let err = run_setup(&config, &server()).unwrap_err();
        assert!(err.to_string().contains("mcpServers must be an object"));
    }

    #[test]
    fn test_commented_json_is_left_untouched() {
        let home = tempfile::tempdir().unwrap();
        let settings = home.path().join(".gemini/settings.json");
        fs::create_dir_all(settings.parent().unwrap()).unwrap();
        let original = "{ // my theme\n  \"theme\": \"Dracula\",\n  \"mcpServers\": {\"other\": {\"command\": \"x\"}}\n}\n";
        fs::write(&settings, original).unwrap();
        let config = SetupConfig { dry_run: false, home: home.path().to_path_buf() };

        let err = run_setup(&config, &server()).unwrap_err();
        assert!(err.to_string().contains("settings.json is not valid JSON"), "{err}");
        assert_eq!(fs::read_to_string(&settings).unwrap(), original);
    }

    #[test]
    fn test_invalid_codex_toml_is_left_untouched() {
        let home = tempfile::tempdir().unwrap();
        let path = home.path().join(".codex/config.toml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "model = \n").unwrap();
        let config = SetupConfig { dry_run: false, home: home.path().to_path_buf() };

        let err = run_setup(&config, &server()).unwrap_err();
        assert!(err.to_string().contains("is not valid TOML"), "{err}");
        assert_eq!(fs::read_to_string(&path).unwrap(), "model = \n");
    }

    #[test]
    fn test_strip_table_keeps_neighbours() {
        let text = "a = 1\n[mcp_servers.\"agent-mesh\"]\ncommand = \"x\"\n[ mcp_servers.agent-mesh.env ]\nK = \"v\"\n[b]\nc = 2\n";
        assert_eq!(strip_table(text, "mcp_servers.agent-mesh"), "a = 1\n[b]\nc = 2\n");
        assert_eq!(strip_table("", "mcp_servers.agent-mesh"), "");
    }
}
