//! MCP protocol support for fngate
//!
//! # Module Layout
//!
//! - `types`  -- MCP payload types and method names
//! - `server` -- Per-session protocol server dispatching onto the tool registry

pub mod server;
pub mod types;

pub use server::{McpServer, McpServerFactory};
