//! Stable exit codes for agent-mesh commands.

use agent_mesh_runner::RunnerError;

/// Command succeeded (a printed result may still carry `ok: false`).
pub const OK: u8 = 0;
/// A check failed or an agent could not be launched.
pub const FAILURE: u8 = 1;
/// Invalid usage: unknown agent, out-of-range option.
pub const USAGE: u8 = 2;

/// Exit code for a runner error.
#[must_use]
pub const fn for_runner_error(error: &RunnerError) -> u8 {
    match error {
        RunnerError::InvalidAgent(_) | RunnerError::InvalidConfig(_) => USAGE,
        RunnerError::LaunchFailure { .. } => FAILURE,
    }
}
