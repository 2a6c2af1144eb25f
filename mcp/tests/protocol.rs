//! Drives the MCP server over an in-memory pipe and checks every frame it
//! writes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use agent_mesh_mcp::prelude::*;
use agent_mesh_runner::{
    AgentKind, AgentMesh, ExecRequest, Executor, NoWorkspace, RawExecution, RunnerError,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::io::DuplexStream;

/// Answers like gemini; refuses to launch anything named claude.
struct CannedExecutor;

#[async_trait]
impl Executor for CannedExecutor {
    async fn execute(&self, request: &ExecRequest) -> Result<RawExecution, RunnerError> {
        if request.program.ends_with("claude") {
            return Err(RunnerError::launch(
                request.program.display().to_string(),
                "spawn",
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(RawExecution::from_elapsed(
            chrono::Utc::now(),
            Duration::from_millis(25),
            Some(0),
            r#"{"response":"pong","stats":{"inputTokens":4,"outputTokens":2}}"#.to_string(),
            String::new(),
            false,
        ))
    }
}

struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    async fn send(&mut self, message: Value) {
        let mut frame = message.to_string();
        frame.push('\n');
        self.writer.write_all(frame.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("server did not answer in time")
            .unwrap()
            .expect("server closed the channel");
        let frame: Value = serde_json::from_str(&line).expect("non-JSON written to output channel");
        assert_eq!(frame["jsonrpc"], "2.0", "not a JSON-RPC frame: {line}");
        frame
    }

    async fn request(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        let frame = self.recv().await;
        assert_eq!(frame["id"], id);
        frame
    }
}

#[tokio::test]
async fn tools_are_listed_and_called_over_the_wire() {
    let mesh = AgentMesh::builder()
        .executor(Arc::new(CannedExecutor))
        .workspace(Arc::new(NoWorkspace))
        .program(AgentKind::Gemini, "/fake/gemini")
        .program(AgentKind::Claude, "/fake/claude")
        .build();
    let handler = MeshToolServer::new(mesh).unwrap();

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let server = tokio::spawn(serve(handler, server_read, server_write));

    let (client_read, writer) = tokio::io::split(client_io);
    let mut client = Client {
        lines: BufReader::new(client_read).lines(),
        writer,
    };

    let init = client
        .request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0.0"}
            }),
        )
        .await;
    assert_eq!(init["result"]["serverInfo"]["name"], SERVER_NAME);
    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;

    let listed = client.request(2, "tools/list", json!({})).await;
    let tools = listed["result"]["tools"].as_array().unwrap();
    let mut names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    names.sort_unstable();
    assert_eq!(names, [CLAUDE_RUN, CODEX_EXEC, GEMINI_RUN]);
    for tool in tools {
        assert!(tool["inputSchema"]["properties"].is_object(), "{tool}");
    }

    let cwd = tempfile::tempdir().unwrap();
    let called = client
        .request(
            3,
            "tools/call",
            json!({"name": GEMINI_RUN, "arguments": {"prompt": "ping", "cwd": cwd.path(), "timeout_s": 10}}),
        )
        .await;
    assert_ne!(called["result"]["isError"], true);
    let text = called["result"]["content"][0]["text"].as_str().unwrap();
    let result: Value = serde_json::from_str(text).unwrap();
    assert_eq!(result["agent"], "gemini");
    assert_eq!(result["ok"], true);
    assert_eq!(result["structured"]["response"], "pong");
    assert_eq!(result["usage"]["input_tokens"], 4);
    assert_eq!(result["usage"]["cached_input_tokens"], Value::Null);

    let failed = client
        .request(
            4,
            "tools/call",
            json!({"name": CLAUDE_RUN, "arguments": {"prompt": "ping", "cwd": cwd.path()}}),
        )
        .await;
    assert_eq!(failed["result"]["isError"], true);
    let message = failed["result"]["content"][0]["text"].as_str().unwrap();
    assert!(message.contains("Failed to launch"), "{message}");

    let invalid = client
        .request(5, "tools/call", json!({"name": CLAUDE_RUN, "arguments": {}}))
        .await;
    assert_eq!(invalid["error"]["code"], -32602);

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop after disconnect")
        .unwrap()
        .unwrap();
}
