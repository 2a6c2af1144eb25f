//! Subprocess execution and lifecycle management.
//!
//! One call spawns exactly one child (in its own process group on unix),
//! drains stdout and stderr concurrently while it runs, enforces the
//! wall-clock timeout with `SIGTERM` then `SIGKILL`, and always reaps the
//! child. Dropping the returned future kills the whole group as well.

use crate::error::{LaunchFailureKind, RunnerError};
use crate::types::RawExecution;
use async_trait::async_trait;
use chrono::Utc;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::timeout;

const GRACE_PERIOD: Duration = Duration::from_secs(5);
const DRAIN_GRACE: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8 * 1024;

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Everything needed to launch one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Executable to run.
    pub program: PathBuf,
    /// Argument vector, passed as discrete elements (never through a shell).
    pub args: Vec<OsString>,
    /// Working directory; must exist.
    pub cwd: PathBuf,
    /// Environment overrides on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Maximum wall-clock duration from spawn to exit.
    pub timeout: Duration,
}

/// Runs a process and captures its output.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `request` to completion or timeout.
    ///
    /// # Errors
    /// Returns [`RunnerError::LaunchFailure`] only when the process could not
    /// be started or reaped. Non-zero exits and timeouts are data.
    async fn execute(&self, request: &ExecRequest) -> Result<RawExecution, RunnerError>;
}

/// Tokio-backed [`Executor`].
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    grace_period: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            grace_period: GRACE_PERIOD,
        }
    }
}

impl ProcessExecutor {
    /// Creates an executor with the default 5 second termination grace period.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides how long a timed-out child gets between `SIGTERM` and `SIGKILL`.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    #[tracing::instrument(
        skip(self, request),
        fields(program = %request.program.display(), timeout_ms = request.timeout.as_millis())
    )]
    async fn execute(&self, request: &ExecRequest) -> Result<RawExecution, RunnerError> {
        let program = request.program.display().to_string();

        if !request.cwd.is_dir() {
            return Err(RunnerError::LaunchFailure {
                program,
                kind: LaunchFailureKind::WorkingDirectory,
                stage: "working directory".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} is not a directory", request.cwd.display()),
                ),
            });
        }

        tracing::debug!(args = ?request.args, cwd = %request.cwd.display(), "Spawning child");

        let started_at = Utc::now();
        let start_time = Instant::now();
        let mut child = spawn_child(request).map_err(|e| RunnerError::launch(&program, "spawn", e))?;
        let group = ProcessGroup::of(&child);

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe(&program, "stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe(&program, "stderr"))?;

        let stdout_buf = SharedBuffer::default();
        let stderr_buf = SharedBuffer::default();
        let mut readers = JoinSet::new();
        readers.spawn(drain_stream(stdout, stdout_buf.clone(), "stdout"));
        readers.spawn(drain_stream(stderr, stderr_buf.clone(), "stderr"));

        let (exit_code, elapsed, timed_out) = match timeout(request.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let elapsed = start_time.elapsed();
                finish_readers(&mut readers).await;
                (status.code(), elapsed, false)
            }
            Ok(Err(e)) => {
                group.kill();
                return Err(RunnerError::launch(&program, "wait for child", e));
            }
            Err(_) => {
                let elapsed = start_time.elapsed();
                tracing::warn!(elapsed_ms = elapsed.as_millis(), "Child timed out, terminating");
                terminate(&mut child, &group, self.grace_period).await;
                group.kill();
                finish_readers(&mut readers).await;
                (None, elapsed, true)
            }
        };

        let stdout = take_text(&stdout_buf).await;
        let stderr = take_text(&stderr_buf).await;

        tracing::debug!(
            ?exit_code,
            timed_out,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            "Child finished"
        );

        Ok(RawExecution::from_elapsed(
            started_at, elapsed, exit_code, stdout, stderr, timed_out,
        ))
    }
}

fn spawn_child(request: &ExecRequest) -> std::io::Result<Child> {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .current_dir(&request.cwd)
        .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

fn missing_pipe(program: &str, which: &str) -> RunnerError {
    RunnerError::LaunchFailure {
        program: program.to_string(),
        kind: LaunchFailureKind::Io,
        stage: format!("capture {which}"),
        source: std::io::Error::other(format!("child {which} was not captured")),
    }
}

/// Copies a stream into a shared buffer until EOF.
///
/// The buffer is shared so that bytes read before an abort are kept.
async fn drain_stream(mut stream: impl AsyncRead + Unpin, buf: SharedBuffer, stage: &'static str) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::debug!(stage, error = %e, "Stream read failed");
                break;
            }
        }
    }
}

/// Waits briefly for both readers to hit EOF, then abandons them.
///
/// A grandchild that inherited the pipes can keep them open after the
/// child itself exited.
async fn finish_readers(readers: &mut JoinSet<()>) {
    let drained = timeout(DRAIN_GRACE, async {
        while let Some(res) = readers.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, "Stream reader task failed");
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::debug!("Output pipes still open after exit, abandoning readers");
        readers.abort_all();
        while readers.join_next().await.is_some() {}
    }
}

async fn take_text(buf: &SharedBuffer) -> String {
    let bytes = std::mem::take(&mut *buf.lock().await);
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Graceful shutdown: `SIGTERM`, wait grace period, then `SIGKILL`.
async fn terminate(child: &mut Child, group: &ProcessGroup, grace: Duration) {
    group.terminate(child);

    match timeout(grace, child.wait()).await {
        Ok(Ok(_status)) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Wait after SIGTERM failed"),
        Err(_) => {
            tracing::warn!(grace_ms = grace.as_millis(), "Grace period expired, sending SIGKILL");
            group.kill();
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "SIGKILL failed");
            }
        }
    }
}

/// The child's process group. Dropping it kills every remaining member.
#[cfg(unix)]
struct ProcessGroup {
    pgid: Option<nix::unistd::Pid>,
}

#[cfg(unix)]
impl ProcessGroup {
    fn of(child: &Child) -> Self {
        let pgid = child
            .id()
            .and_then(|pid| i32::try_from(pid).ok())
            .map(nix::unistd::Pid::from_raw);
        Self { pgid }
    }

    fn signal(&self, signal: nix::sys::signal::Signal) {
        let Some(pgid) = self.pgid else {
            return;
        };
        match nix::sys::signal::killpg(pgid, signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => tracing::warn!(%pgid, ?signal, error = %e, "Failed to signal process group"),
        }
    }

    fn terminate(&self, _child: &mut Child) {
        self.signal(nix::sys::signal::Signal::SIGTERM);
    }

    fn kill(&self) {
        self.signal(nix::sys::signal::Signal::SIGKILL);
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Without process groups only the direct child can be signalled.
#[cfg(not(unix))]
struct ProcessGroup;

#[cfg(not(unix))]
impl ProcessGroup {
    fn of(_child: &Child) -> Self {
        Self
    }

    fn terminate(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            tracing::warn!(error = %e, "TerminateProcess failed");
        }
    }

    fn kill(&self) {}
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ExecRequest {
        ExecRequest {
            program: PathBuf::from("/bin/sh"),
            args: vec![OsString::from("-c"), OsString::from(script)],
            cwd: std::env::temp_dir(),
            env: vec![("AGENT_MESH_TEST_VAR".to_string(), "hello-env".to_string())],
            timeout,
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let raw = ProcessExecutor::new()
            .execute(&sh("echo out; echo err 1>&2; exit 3", Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(raw.exit_code, Some(3));
        assert_eq!(raw.stdout, "out\n");
        assert_eq!(raw.stderr, "err\n");
        assert!(!raw.timed_out);
        assert_eq!((raw.ended_at - raw.started_at).num_milliseconds(), i64::try_from(raw.duration_ms).unwrap());
    }

    #[tokio::test]
    async fn test_environment_overrides_reach_child() {
        let raw = ProcessExecutor::new()
            .execute(&sh("printf %s \"$AGENT_MESH_TEST_VAR\"", Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(raw.stdout, "hello-env");
    }

    #[tokio::test]
    async fn test_large_stderr_does_not_block_stdout() {
        // 1 MiB on stderr before anything on stdout would deadlock a
        // reader that only drains after exit.
        let script = "head -c 1048576 /dev/zero | tr '\\0' x 1>&2; echo done";
        let raw = ProcessExecutor::new()
            .execute(&sh(script, Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(raw.exit_code, Some(0));
        assert_eq!(raw.stdout, "done\n");
        assert_eq!(raw.stderr.len(), 1_048_576);
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let started = Instant::now();
        let raw = ProcessExecutor::new()
            .execute(&sh("echo before; sleep 5; echo after", Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(raw.timed_out);
        assert_eq!(raw.exit_code, None);
        assert_eq!(raw.stdout, "before\n");
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
        assert!(raw.duration_ms >= 1_000 && raw.duration_ms < 2_000, "duration {}", raw.duration_ms);
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_sigkill() {
        let executor = ProcessExecutor::new().with_grace_period(Duration::from_millis(300));
        let started = Instant::now();
        let raw = executor
            .execute(&sh("trap '' TERM; sleep 5", Duration::from_millis(500)))
            .await
            .unwrap();
        assert!(raw.timed_out);
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let mut request = sh("true", Duration::from_secs(5));
        request.program = PathBuf::from("/definitely/not/a/real/agent-binary");
        let err = ProcessExecutor::new().execute(&request).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::LaunchFailure { kind: LaunchFailureKind::ExecutableNotFound, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_working_directory_is_launch_failure() {
        let mut request = sh("true", Duration::from_secs(5));
        request.cwd = PathBuf::from("/definitely/not/a/real/dir");
        let err = ProcessExecutor::new().execute(&request).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::LaunchFailure { kind: LaunchFailureKind::WorkingDirectory, .. }
        ));
    }

    #[tokio::test]
    async fn test_non_executable_file_is_launch_failure() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut request = sh("true", Duration::from_secs(5));
        request.program = file.path().to_path_buf();
        request.args.clear();
        let err = ProcessExecutor::new().execute(&request).await.unwrap_err();
        assert!(err.is_launch_failure());
    }
}
