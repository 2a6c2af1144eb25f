//! # agent-mesh-runner
//!
//! Headless subprocess runners for the Claude Code, Codex and Gemini CLIs.
//!
//! Every run is a single non-interactive invocation: the executable is
//! spawned with an argument vector, both output streams are drained while it
//! runs, a wall-clock timeout is enforced, and whatever the program printed
//! is reconciled into one [`AgentResult`] shape regardless of which agent
//! produced it.
//!
//! ## Example
//!
//! ```no_run
//! # use agent_mesh_runner::{AgentMesh, RunConfiguration};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfiguration::builder("What is 2+2? Reply with just: 4")
//!     .timeout_secs(60)
//!     .build()?;
//!
//! let result = AgentMesh::new().run("claude", &config).await?;
//! if result.ok() {
//!     println!("{}", result.response());
//! }
//! # Ok(())
//! # }
//! ```

/// Static per-agent invocation and extraction tables.
pub mod agents;
/// Version and feature probing with a per-version cache.
pub mod capabilities;
/// Executable discovery.
pub mod discovery;
/// Error types returned by runner operations.
pub mod error;
/// Result normalization across agent output conventions.
pub mod normalize;
/// Output parsers for single-JSON, JSON-Lines and plain text.
pub mod parse;
/// Subprocess execution with concurrent capture and timeouts.
pub mod process;
/// Per-agent runners and the dispatcher.
pub mod runner;
/// Shared data types.
pub mod types;
/// Git workspace snapshots.
pub mod workspace;

pub use agents::{profile, AgentProfile, Feature};
pub use capabilities::{Capabilities, CapabilityCache, ProbeReport};
pub use discovery::{discover, resolve_program};
pub use error::{LaunchFailureKind, RunnerError};
pub use process::{ExecRequest, Executor, ProcessExecutor};
pub use runner::{run_agent, AgentMesh, AgentMeshBuilder, Runner};
pub use types::*;
pub use workspace::{capture_workspace_state, GitWorkspace, NoWorkspace, WorkspaceProbe, WorkspaceSnapshot};
