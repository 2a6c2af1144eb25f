//! Model Context Protocol tool adapter for the agent runners.
//!
//! Exposes `claude_run`, `codex_exec` and `gemini_run` over JSON-RPC. Each
//! call maps its arguments into a run configuration, runs the agent, and
//! replies with the canonical result as pretty JSON.

pub mod config;
pub mod error;
pub mod server;
pub mod tools;

/// Common types for serving the mesh tools.
pub mod prelude {
    pub use crate::config::McpConfig;
    pub use crate::error::ToolAdapterError;
    pub use crate::server::{MeshToolServer, SERVER_NAME, serve, serve_stdio};
    pub use crate::tools::{CLAUDE_RUN, CODEX_EXEC, GEMINI_RUN, MeshTool, mesh_tools};
}
