// Tool execution system
//
// Tool sessions (MCP servers) are started into a namespaced registry; the
// executor approves and routes the model's tool uses to them.

pub mod approval;
pub mod executor;
pub mod mcp;
pub mod registry;
pub mod session;
pub mod types;

pub use approval::{ApprovalDecision, Approver, AutoApprover, TerminalApprover};
pub use executor::{DispatchSummary, ToolExecutor, DENIAL_MESSAGE, ERROR_PREFIX, SKIPPED_MESSAGE};
pub use registry::{SessionHandle, SessionRegistry, NAMESPACE_SEPARATOR};
pub use session::{SessionTool, ToolSession};
pub use types::{CallToolResult, ToolContent, ToolDefinition, ToolUse};
