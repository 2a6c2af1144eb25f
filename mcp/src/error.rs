//! Errors raised while building or serving the tool adapter.

use thiserror::Error;

/// Tool adapter failures. Failed agent runs are tool results, not errors.
#[derive(Debug, Error)]
pub enum ToolAdapterError {
    /// A generated input schema could not be serialized or compiled.
    #[error("Invalid input schema for tool '{tool}': {message}")]
    Schema {
        /// Tool whose schema failed.
        tool: String,
        /// Compiler message.
        message: String,
    },

    /// The protocol handshake or the transport failed.
    #[error("MCP transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}
