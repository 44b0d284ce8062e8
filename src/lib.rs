// aterm - terminal assistant that lets Claude call MCP tools
// Library exports

pub mod agent; // Turn controller and conversation state
pub mod claude; // Streaming Messages API client
pub mod cli;
pub mod config;
pub mod errors;
pub mod tools; // MCP sessions, registry, approval and dispatch
