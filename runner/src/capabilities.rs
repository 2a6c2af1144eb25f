//! Version and feature probing of installed agent CLIs.
//!
//! `--help` output is only re-read when the reported version changes, so
//! repeated health checks cost one `--version` call each.

use crate::agents::{profile, Feature};
use crate::error::RunnerError;
use crate::process::{ExecRequest, Executor};
use crate::types::AgentKind;
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const HELP_TIMEOUT: Duration = Duration::from_secs(10);

/// Optional features an installed CLI advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Features whose marker appeared in `--help`.
    pub features: BTreeSet<Feature>,
}

impl Capabilities {
    /// Whether `feature` was detected.
    #[must_use]
    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// Result of probing one agent executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Agent that was probed.
    pub agent: AgentKind,
    /// Executable that was run.
    pub program: PathBuf,
    /// First line of `--version`, as printed.
    pub version: String,
    /// Semantic version extracted from `version`, when one is present.
    pub semver: Option<semver::Version>,
    /// Detected features.
    pub capabilities: Capabilities,
}

/// Caches capabilities per executable path, keyed by reported version.
pub struct CapabilityCache {
    executor: Arc<dyn Executor>,
    entries: Mutex<HashMap<PathBuf, (String, Capabilities)>>,
}

impl std::fmt::Debug for CapabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCache").finish_non_exhaustive()
    }
}

impl CapabilityCache {
    /// Creates an empty cache that probes through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Probes `program` as agent `kind`.
    ///
    /// # Errors
    /// Returns [`RunnerError::LaunchFailure`] when `--version` cannot be run.
    #[tracing::instrument(skip(self), fields(program = %program.display()))]
    pub async fn probe(&self, kind: AgentKind, program: &Path) -> Result<ProbeReport, RunnerError> {
        let version = self.probe_version(program).await?;
        let capabilities = self.capabilities_for(kind, program, &version).await;

        Ok(ProbeReport {
            agent: kind,
            program: program.to_path_buf(),
            semver: parse_version(&version),
            version,
            capabilities,
        })
    }

    /// Runs `program --version` and returns the first non-empty line.
    ///
    /// # Errors
    /// Returns [`RunnerError::LaunchFailure`] when the program cannot be run.
    pub async fn probe_version(&self, program: &Path) -> Result<String, RunnerError> {
        let raw = self.executor.execute(&probe_request(program, "--version", VERSION_TIMEOUT)).await?;
        let text = if raw.stdout.trim().is_empty() { raw.stderr } else { raw.stdout };
        Ok(text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string())
    }

    /// Returns cached capabilities for `program`, re-reading `--help` when
    /// nothing is cached or the cached entry was recorded for another version.
    pub async fn capabilities_for(&self, kind: AgentKind, program: &Path, version: &str) -> Capabilities {
        let cached = self
            .entries
            .lock()
            .await
            .get(program)
            .filter(|(v, _)| v == version)
            .map(|(_, caps)| caps.clone());

        if let Some(caps) = cached {
            tracing::debug!(%version, "Capability cache hit");
            return caps;
        }

        let caps = self.probe_features(kind, program).await;
        self.entries
            .lock()
            .await
            .insert(program.to_path_buf(), (version.to_string(), caps.clone()));
        caps
    }

    async fn probe_features(&self, kind: AgentKind, program: &Path) -> Capabilities {
        let help = match self.executor.execute(&probe_request(program, "--help", HELP_TIMEOUT)).await {
            Ok(raw) => format!("{}\n{}", raw.stdout, raw.stderr),
            Err(e) => {
                tracing::warn!(agent = %kind, error = %e, "Could not read --help");
                return Capabilities::default();
            }
        };

        let features = profile(kind)
            .capability_markers
            .iter()
            .filter(|(_, marker)| help.contains(marker))
            .map(|(feature, _)| *feature)
            .collect();

        Capabilities { features }
    }
}

fn probe_request(program: &Path, flag: &str, timeout: Duration) -> ExecRequest {
    ExecRequest {
        program: program.to_path_buf(),
        args: vec![OsString::from(flag)],
        cwd: std::env::temp_dir(),
        env: Vec::new(),
        timeout,
    }
}

/// Extracts the first `MAJOR.MINOR.PATCH` token from a version banner.
///
/// Accepts a leading `v` and ignores trailing text such as `(Claude Code)`.
#[must_use]
pub fn parse_version(text: &str) -> Option<semver::Version> {
    text.split_whitespace().find_map(|token| {
        let token = token.trim_start_matches('v').trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
        semver::Version::parse(token).ok()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::RawExecution;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCli {
        version: std::sync::Mutex<String>,
        help_calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor for FakeCli {
        async fn execute(&self, request: &ExecRequest) -> Result<RawExecution, RunnerError> {
            let stdout = if request.args[0] == "--version" {
                self.version.lock().unwrap().clone()
            } else {
                self.help_calls.fetch_add(1, Ordering::SeqCst);
                "Usage: codex exec [--json] [--full-auto] [--model MODEL]\n".to_string()
            };
            Ok(RawExecution::from_elapsed(Utc::now(), Duration::ZERO, Some(0), stdout, String::new(), false))
        }
    }

    #[test]
    fn test_parse_version_banners() {
        assert_eq!(parse_version("1.0.58 (Claude Code)"), Some(semver::Version::new(1, 0, 58)));
        assert_eq!(parse_version("codex-cli v0.46.0"), Some(semver::Version::new(0, 46, 0)));
        assert_eq!(parse_version("0.9.0,"), Some(semver::Version::new(0, 9, 0)));
        assert_eq!(parse_version("unknown"), None);
    }

    #[tokio::test]
    async fn test_help_is_reprobed_only_on_version_change() {
        let cli = Arc::new(FakeCli {
            version: std::sync::Mutex::new("codex-cli 0.46.0\n".to_string()),
            help_calls: AtomicUsize::new(0),
        });
        let cache = CapabilityCache::new(cli.clone());
        let program = Path::new("/fake/codex");

        let first = cache.probe(AgentKind::Codex, program).await.unwrap();
        assert_eq!(first.version, "codex-cli 0.46.0");
        assert!(first.capabilities.supports(Feature::JsonEvents));
        assert!(first.capabilities.supports(Feature::FullAuto));
        assert!(!first.capabilities.supports(Feature::SkipGitRepoCheck));

        let second = cache.probe(AgentKind::Codex, program).await.unwrap();
        assert_eq!(second.capabilities, first.capabilities);
        assert_eq!(cli.help_calls.load(Ordering::SeqCst), 1);

        *cli.version.lock().unwrap() = "codex-cli 0.47.0".to_string();
        let third = cache.probe(AgentKind::Codex, program).await.unwrap();
        assert_eq!(third.semver, Some(semver::Version::new(0, 47, 0)));
        assert_eq!(cli.help_calls.load(Ordering::SeqCst), 2);
    }
}
