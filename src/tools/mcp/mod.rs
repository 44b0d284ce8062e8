// MCP (Model Context Protocol) stdio sessions

pub mod config;
pub mod connection;

pub use config::McpServerConfig;
pub use connection::{McpConnection, McpServerInfo};
