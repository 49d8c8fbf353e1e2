//! Caller identity tool

use async_trait::async_trait;
use serde_json::{json, Value};

use super::ToolHandler;
use crate::auth::Credential;
use crate::error::Result;
use crate::mcp::types::{CallToolResponse, McpTool};

/// Reports which credential the session is bound to, by fingerprint only.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhoamiTool;

#[async_trait]
impl ToolHandler for WhoamiTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: "whoami".to_string(),
            description: Some("Get the current user's details".to_string()),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn call(&self, credential: &Credential, _args: Value) -> Result<CallToolResponse> {
        Ok(CallToolResponse::json(&json!({
            "authenticated": true,
            "credentialFingerprint": credential.fingerprint(),
        })))
    }
}
