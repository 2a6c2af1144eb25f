//! MCP server exposing the agent runners as tools.

use crate::error::ToolAdapterError;
use crate::tools::{ArgumentError, MeshTool, mesh_tools};
use agent_mesh_runner::{AgentMesh, RunnerError};
use rmcp::RoleServer;
use rmcp::service::RequestContext;
use rmcp::{
    ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, ErrorData, ListToolsResult,
        PaginatedRequestParams,
    },
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Server name reported during `initialize`.
pub const SERVER_NAME: &str = "agent-mesh";

const INSTRUCTIONS: &str =
    "Agent mesh for headless CLI coordination between Claude, Codex, and Gemini.";

/// MCP server handler that runs one agent per tool call.
#[derive(Clone)]
pub struct MeshToolServer {
    mesh: Arc<AgentMesh>,
    tools: Arc<Vec<MeshTool>>,
    /// The name of the server.
    pub name: String,
}

impl std::fmt::Debug for MeshToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshToolServer")
            .field("name", &self.name)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl MeshToolServer {
    /// Creates a handler that dispatches tool calls through `mesh`.
    ///
    /// # Errors
    /// Returns [`ToolAdapterError::Schema`] if a tool schema fails to compile.
    pub fn new(mesh: AgentMesh) -> Result<Self, ToolAdapterError> {
        Ok(Self {
            mesh: Arc::new(mesh),
            tools: Arc::new(mesh_tools()?),
            name: SERVER_NAME.to_string(),
        })
    }

    fn tool(&self, name: &str) -> Option<&MeshTool> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// Serves the protocol over an arbitrary byte channel until the peer
/// disconnects.
///
/// Only protocol frames are written to `output`; diagnostics go through
/// `tracing`, which the binary routes to stderr.
///
/// # Errors
/// Returns [`ToolAdapterError::Transport`] if the handshake fails or the
/// service task aborts.
pub async fn serve<R, W>(handler: MeshToolServer, input: R, output: W) -> Result<(), ToolAdapterError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let service = handler
        .serve((input, output))
        .await
        .map_err(|e| ToolAdapterError::Transport(Box::new(e)))?;
    let reason = service
        .waiting()
        .await
        .map_err(|e| ToolAdapterError::Transport(Box::new(e)))?;
    tracing::info!(?reason, "MCP session ended");
    Ok(())
}

/// Serves the protocol over the process's stdin and stdout.
///
/// # Errors
/// See [`serve`].
pub async fn serve_stdio(handler: MeshToolServer) -> Result<(), ToolAdapterError> {
    serve(handler, tokio::io::stdin(), tokio::io::stdout()).await
}

impl ServerHandler for MeshToolServer {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: rmcp::model::Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                website_url: None,
                icons: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn initialize(
        &self,
        request: rmcp::model::InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<rmcp::model::InitializeResult, ErrorData> {
        tracing::info!(client = %request.client_info.name, "MCP client connected");
        Ok(self.get_info())
    }

    #[tracing::instrument(skip(self, _request, _context), fields(rpc.method = "list_tools"))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tools.iter().map(MeshTool::definition).collect(),
            next_cursor: None,
            meta: None,
        })
    }

    #[tracing::instrument(skip(self, request, _context), fields(rpc.method = "call_tool", tool.name = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let tool = self.tool(&request.name).ok_or_else(|| {
            ErrorData::invalid_params(
                ArgumentError::UnknownTool(request.name.to_string()).to_string(),
                None,
            )
        })?;

        let config = tool
            .configuration(request.arguments)
            .map_err(|e| ErrorData::invalid_params(e.to_string(), None))?;

        tracing::debug!(agent = %tool.agent, "Dispatching tool call");

        match self.mesh.runner(tool.agent).run(&config).await {
            Ok(result) => {
                let payload = result
                    .to_json_pretty()
                    .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(payload)]))
            }
            Err(e @ RunnerError::LaunchFailure { .. }) => {
                tracing::error!(error = %e, "Agent could not be launched");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            Err(e) => Err(ErrorData::internal_error(e.to_string(), None)),
        }
    }
}
