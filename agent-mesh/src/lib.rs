#![deny(missing_docs)]
//! Command-line front end for the agent mesh.
//!
//! Wires the runner core and the MCP tool adapter into the `agent-mesh`
//! binary: one-shot runs, health checks, the review pipeline, and client
//! registration.

/// Settings shared by every subcommand.
pub mod config;
/// Installation and health checks.
pub mod doctor;
/// Process exit codes.
pub mod exit_codes;
/// Subscriber setup for diagnostics on stderr.
pub mod logging;
/// Claude-implements, Codex-reviews composition.
pub mod pipeline;
/// Registration in agent CLI configs.
pub mod setup;

pub use config::{MeshConfig, DEFAULT_TIMEOUT_SECS};
pub use doctor::{run_doctor, DoctorOptions, DoctorReport};
pub use pipeline::{run_review, ReviewReport};
pub use setup::{run_setup, SetupConfig};
