// MCP connection wrapper for a single server
//
// Implements JSON-RPC 2.0 over STDIO to communicate with MCP servers

use super::config::McpServerConfig;
use crate::tools::session::{SessionTool, ToolSession};
use crate::tools::types::CallToolResult;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

const PROTOCOL_VERSION: &str = "2024-11-05";
const METHOD_NOT_FOUND: i32 = -32601;

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// MCP server implementation info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Frame read from the server that is not the response we wait for
enum Incoming {
    Response(JsonRpcResponse),
    Skip,
}

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// A single MCP server connection over STDIO
pub struct McpConnection {
    /// Namespace the server was registered under
    name: String,

    /// Server info reported during the handshake
    server_info: Option<McpServerInfo>,

    /// Child process handle
    child: Mutex<Option<Child>>,

    /// Request/response pairs hold this lock for the whole exchange
    pipes: Mutex<Pipes>,

    /// Request ID counter
    next_id: AtomicU64,
}

impl McpConnection {
    /// Spawn the server and complete the MCP handshake
    pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Self> {
        config
            .validate(name)
            .context("Invalid MCP server configuration")?;

        tracing::info!("Spawning MCP server '{}': {} {:?}", name, config.command, config.args);

        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .env_clear()
            .envs(config.effective_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Show server logs
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server '{}' ({})", name, config.command))?;

        let stdin = child
            .stdin
            .take()
            .context("Failed to open stdin for MCP server")?;
        let stdout = child
            .stdout
            .take()
            .context("Failed to open stdout for MCP server")?;

        let mut conn = Self {
            name: name.to_string(),
            server_info: None,
            child: Mutex::new(Some(child)),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            next_id: AtomicU64::new(1),
        };

        conn.initialize().await?;

        Ok(conn)
    }

    /// Initialize the MCP connection
    async fn initialize(&mut self) -> Result<()> {
        let response = self
            .send_request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "aterm",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                })),
            )
            .await
            .context("MCP initialize handshake failed")?;

        if let Some(server_info_val) = response.get("serverInfo") {
            self.server_info = serde_json::from_value(server_info_val.clone()).ok();
        }
        tracing::debug!("MCP server '{}' info: {:?}", self.name, self.server_info);

        self.send_notification("notifications/initialized", None).await?;

        Ok(())
    }

    /// Get server info
    pub fn server_info(&self) -> Option<&McpServerInfo> {
        self.server_info.as_ref()
    }

    /// Send a JSON-RPC request and fail on an error response
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let response = self.exchange(method, params).await?;

        if let Some(error) = response.error {
            bail!(
                "MCP server '{}' returned error: {} (code {})",
                self.name,
                error.message,
                error.code
            );
        }

        response.result.context("No result in JSON-RPC response")
    }

    /// Write one request and read frames until its response arrives
    async fn exchange(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let request_json = serde_json::to_string(&request)?;
        tracing::debug!("MCP request to '{}': {}", self.name, request_json);

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &request_json).await?;

        loop {
            let mut line = String::new();
            let bytes = pipes
                .stdout
                .read_line(&mut line)
                .await
                .context("Failed to read from MCP server")?;
            if bytes == 0 {
                bail!("MCP server '{}' closed connection", self.name);
            }

            let trimmed = line.trim();
            if !trimmed.starts_with('{') {
                if !trimmed.is_empty() {
                    tracing::debug!("MCP server '{}' non-JSON output: {}", self.name, trimmed);
                }
                continue;
            }
            tracing::debug!("MCP response from '{}': {}", self.name, trimmed);

            match self.classify(trimmed, id, &mut pipes.stdin).await? {
                Incoming::Response(response) => return Ok(response),
                Incoming::Skip => continue,
            }
        }
    }

    /// Sort an incoming frame into our response, a notification or a server request
    async fn classify(&self, frame: &str, expected_id: u64, stdin: &mut ChildStdin) -> Result<Incoming> {
        let value: Value =
            serde_json::from_str(frame).context("Failed to parse JSON-RPC message")?;

        if let Some(method) = value.get("method").and_then(Value::as_str) {
            match value.get("id") {
                Some(id) => {
                    tracing::debug!("Rejecting server request '{}' from '{}'", method, self.name);
                    let reply = json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": METHOD_NOT_FOUND, "message": "Method not found"}
                    });
                    write_line(stdin, &reply.to_string()).await?;
                }
                None => tracing::debug!("Notification '{}' from '{}'", method, self.name),
            }
            return Ok(Incoming::Skip);
        }

        if value.get("id").and_then(Value::as_u64) != Some(expected_id) {
            tracing::warn!("Ignoring unexpected JSON-RPC frame from '{}': {}", self.name, frame);
            return Ok(Incoming::Skip);
        }

        let response: JsonRpcResponse =
            serde_json::from_value(value).context("Failed to parse JSON-RPC response")?;
        Ok(Incoming::Response(response))
    }

    /// Send a JSON-RPC notification (no response expected)
    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let mut notification = json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            notification["params"] = params;
        }

        let notification_json = notification.to_string();
        tracing::debug!("MCP notification to '{}': {}", self.name, notification_json);

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &notification_json).await
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

#[async_trait]
impl ToolSession for McpConnection {
    async fn list_tools(&self) -> Result<Vec<SessionTool>> {
        let response = self.send_request("tools/list", None).await?;
        let tools: Vec<SessionTool> = match response.get("tools") {
            Some(tools_val) => serde_json::from_value(tools_val.clone())
                .context("Failed to parse tools list")?,
            None => Vec::new(),
        };

        if response.get("nextCursor").map_or(false, |c| !c.is_null()) {
            tracing::warn!("MCP server '{}' paginates tools/list; only the first page is used", self.name);
        }
        tracing::debug!("Discovered {} tools from MCP server '{}'", tools.len(), self.name);

        Ok(tools)
    }

    async fn call_tool(&self, name: &str, input: Map<String, Value>) -> Result<CallToolResult> {
        let response = self
            .exchange(
                "tools/call",
                Some(json!({
                    "name": name,
                    "arguments": input
                })),
            )
            .await?;

        // The server rejected the call; the model gets to see why
        if let Some(error) = response.error {
            return Ok(CallToolResult::error(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }

        let result = response.result.context("No result in JSON-RPC response")?;
        serde_json::from_value(result).context("Failed to parse tools/call result")
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::debug!("Shutting down MCP connection '{}'", self.name);

        if let Some(mut child) = self.child.lock().await.take() {
            child.kill().await?;
        }

        Ok(())
    }
}

impl Drop for McpConnection {
    fn drop(&mut self) {
        tracing::debug!("Dropping MCP connection '{}'", self.name);

        // Try to kill the child process if it's still running
        if let Some(mut child) = self.child.get_mut().take() {
            let _ = child.start_kill();
        }
    }
}
