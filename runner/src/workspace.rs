//! Version-control snapshot of the working directory after a run.
//!
//! Failures never propagate: a directory that is not a git repository, a
//! missing `git` binary, or a hung `git` process all yield an empty snapshot.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Workspace changes attributed to one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSnapshot {
    /// Combined staged and unstaged diff.
    pub git_diff: String,
    /// Changed and untracked paths, sorted.
    pub files_written: Vec<String>,
}

/// Source of workspace snapshots.
#[async_trait]
pub trait WorkspaceProbe: Send + Sync {
    /// Captures the current state of `cwd`. Never fails.
    async fn capture(&self, cwd: &Path) -> WorkspaceSnapshot;
}

/// Reads the snapshot from `git`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitWorkspace;

/// Always reports an empty snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWorkspace;

#[async_trait]
impl WorkspaceProbe for GitWorkspace {
    #[tracing::instrument(skip(self), fields(cwd = %cwd.display()))]
    async fn capture(&self, cwd: &Path) -> WorkspaceSnapshot {
        let inside = git(cwd, &["rev-parse", "--is-inside-work-tree"]).await;
        if inside.as_deref().map(str::trim) != Some("true") {
            tracing::debug!("Not a git work tree, skipping diff");
            return WorkspaceSnapshot::default();
        }

        let mut git_diff = git(cwd, &["diff", "HEAD"]).await.unwrap_or_default();
        if git_diff.trim().is_empty() {
            // No HEAD yet (fresh repository) or nothing against it.
            git_diff = git(cwd, &["diff"]).await.unwrap_or_default();
        }

        let mut files = BTreeSet::new();
        for args in [
            &["diff", "--name-only", "HEAD"][..],
            &["ls-files", "--others", "--exclude-standard"][..],
        ] {
            if let Some(out) = git(cwd, args).await {
                files.extend(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string));
            }
        }

        WorkspaceSnapshot {
            git_diff,
            files_written: files.into_iter().collect(),
        }
    }
}

#[async_trait]
impl WorkspaceProbe for NoWorkspace {
    async fn capture(&self, _cwd: &Path) -> WorkspaceSnapshot {
        WorkspaceSnapshot::default()
    }
}

/// Returns the diff text for `path`, or an empty string.
pub async fn capture_workspace_state(path: &Path) -> String {
    GitWorkspace.capture(path).await.git_diff
}

/// Runs one git command, returning stdout on success.
async fn git(cwd: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match timeout(GIT_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(Ok(out)) => {
            tracing::debug!(?args, code = ?out.status.code(), "git exited non-zero");
            None
        }
        Ok(Err(e)) => {
            tracing::debug!(?args, error = %e, "git could not be run");
            None
        }
        Err(_) => {
            tracing::warn!(?args, "git timed out");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_repository_yields_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = GitWorkspace.capture(dir.path()).await;
        assert_eq!(snapshot, WorkspaceSnapshot::default());
        assert_eq!(capture_workspace_state(dir.path()).await, "");
    }

    #[tokio::test]
    async fn test_missing_directory_yields_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("does-not-exist");
        assert_eq!(GitWorkspace.capture(&gone).await, WorkspaceSnapshot::default());
    }

    #[tokio::test]
    async fn test_no_workspace_is_empty() {
        let snapshot = NoWorkspace.capture(Path::new("/")).await;
        assert!(snapshot.git_diff.is_empty());
        assert!(snapshot.files_written.is_empty());
    }
}
