// Tool session capability
//
// A tool session is an external process or service that can list its tools and
// run one of them. `McpConnection` is the production implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::CallToolResult;

/// Tool as advertised by a session (local, unprefixed name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// list/call capability of one tool session
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Tools the session advertises, in the order it lists them
    async fn list_tools(&self) -> Result<Vec<SessionTool>>;

    /// Run a tool by its local name
    ///
    /// A tool that ran and failed is `Ok` with `is_error` set; `Err` means the
    /// session itself is unusable.
    async fn call_tool(&self, name: &str, input: Map<String, Value>) -> Result<CallToolResult>;

    /// Release the session's resources
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
