//! Liveness tool

use async_trait::async_trait;
use serde_json::{json, Value};

use super::ToolHandler;
use crate::auth::Credential;
use crate::error::Result;
use crate::mcp::types::{CallToolResponse, McpTool};

/// Answers `pong` without touching the functions platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingTool;

#[async_trait]
impl ToolHandler for PingTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: "ping".to_string(),
            description: Some("Check that the gateway is reachable.".to_string()),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn call(&self, _credential: &Credential, _args: Value) -> Result<CallToolResponse> {
        Ok(CallToolResponse::text("pong"))
    }
}
