//! Locates agent executables on the host system.

use crate::agents::profile;
use crate::types::AgentKind;
use std::path::PathBuf;
use which::which;

/// Locates the executable for `kind`.
///
/// Resolution order:
/// 1. `explicit_path` if provided and the file exists.
/// 2. The path in the agent's override variable (e.g. `AGENT_MESH_CLAUDE_BIN`).
/// 3. The binary name resolved via `$PATH`.
/// 4. Common install location fallbacks (platform-specific).
#[must_use]
pub fn discover(kind: AgentKind, explicit_path: Option<PathBuf>) -> Option<PathBuf> {
    let profile = profile(kind);

    if let Some(path) = explicit_path {
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(agent = %kind, path = %path.display(), "Explicit path does not exist");
        return None;
    }

    if let Ok(path_str) = std::env::var(profile.bin_env_var) {
        let path = PathBuf::from(path_str);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(
            agent = %kind,
            var = profile.bin_env_var,
            path = %path.display(),
            "Override points at a missing file"
        );
    }

    if let Ok(path) = which(profile.binary) {
        return Some(path);
    }

    fallback_locations(profile.binary).into_iter().find(|p| p.exists())
}

/// Picks the program to spawn for `kind`.
///
/// An explicit path is used as given. Otherwise discovery runs and falls
/// back to the bare binary name, so a missing executable surfaces as a
/// launch failure when the run is attempted.
#[must_use]
pub fn resolve_program(kind: AgentKind, explicit_path: Option<PathBuf>) -> PathBuf {
    explicit_path
        .or_else(|| discover(kind, None))
        .unwrap_or_else(|| PathBuf::from(profile(kind).binary))
}

#[cfg(unix)]
fn fallback_locations(binary: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(".local/bin").join(binary));
        locations.push(home.join(".npm-global/bin").join(binary));
        locations.push(home.join(".npm/bin").join(binary));
        locations.push(home.join(".claude/local").join(binary));
    }
    locations.push(PathBuf::from("/usr/local/bin").join(binary));
    locations.push(PathBuf::from("/opt/homebrew/bin").join(binary));
    locations
}

#[cfg(windows)]
fn fallback_locations(binary: &str) -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join("AppData/Roaming/npm").join(format!("{binary}.cmd")));
    }
    locations.push(PathBuf::from(r"C:\Program Files\nodejs").join(format!("{binary}.cmd")));
    locations
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = discover(AgentKind::Gemini, Some(file.path().to_path_buf()));
        assert_eq!(found.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_missing_explicit_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(discover(AgentKind::Claude, Some(missing.clone())), None);
        assert_eq!(resolve_program(AgentKind::Claude, Some(missing.clone())), missing);
    }
}
