//! Proxies onto the functions platform
//!
//! Each tool maps its arguments onto one [`FunctionsClient`] call using the
//! calling session's credential and returns the platform's answer as JSON
//! text. Functions are addressed as `owner/name` through `functionName`;
//! `functionId` is accepted as an alias.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::catalog::{describe_with_functions, FunctionCatalog, WorkspaceInfo};
use super::{required_str, ToolHandler};
use crate::api::FunctionsClient;
use crate::auth::Credential;
use crate::error::{GatewayError, Result};
use crate::mcp::types::{CallToolResponse, McpTool};

pub const LIST_FUNCTIONS: &str = "listFunctions";
pub const GET_FUNCTION_CODE: &str = "getFunctionCode";
pub const EXECUTE_FUNCTION: &str = "executeFunction";
pub const CHECK_DEPLOYMENT: &str = "checkDeployment";

fn function_name_schema() -> Value {
    json!({
        "type": "string",
        "description": "The function identifier in format 'username/functionName' (e.g., 'david/func1')"
    })
}

fn function_ref(args: &Value) -> Result<&str> {
    if args.get("functionName").is_none() && args.get("functionId").is_some() {
        return required_str(args, "functionId");
    }
    required_str(args, "functionName")
}

/// `listFunctions`. Also refreshes the caller's cached function list.
#[derive(Debug, Clone)]
pub struct ListFunctionsTool {
    catalog: Arc<FunctionCatalog>,
}

impl ListFunctionsTool {
    pub fn new(catalog: Arc<FunctionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ToolHandler for ListFunctionsTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: LIST_FUNCTIONS.to_string(),
            description: Some(
                "List all available workspaces/functions. Returns an array of workspaces with the identifiers other tools accept."
                    .to_string(),
            ),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn call(&self, credential: &Credential, _args: Value) -> Result<CallToolResponse> {
        let workspaces = self.catalog.refresh(credential).await?;
        tracing::debug!(count = workspaces.len(), "Listed functions");
        Ok(CallToolResponse::json(&json!({ "workspaces": workspaces })))
    }
}

/// `getFunctionCode`
#[derive(Debug, Clone)]
pub struct GetFunctionCodeTool {
    client: Arc<FunctionsClient>,
    available: Vec<WorkspaceInfo>,
}

impl GetFunctionCodeTool {
    pub fn new(client: Arc<FunctionsClient>) -> Self {
        Self {
            client,
            available: Vec::new(),
        }
    }

    /// List these functions in the description
    pub fn with_available(mut self, available: &[WorkspaceInfo]) -> Self {
        self.available = available.to_vec();
        self
    }
}

#[async_trait]
impl ToolHandler for GetFunctionCodeTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: GET_FUNCTION_CODE.to_string(),
            description: Some(describe_with_functions(
                "Get the source code of a function. Requires functionName parameter.",
                &self.available,
            )),
            input_schema: json!({
                "type": "object",
                "properties": { "functionName": function_name_schema() },
                "required": ["functionName"]
            }),
        }
    }

    async fn call(&self, credential: &Credential, args: Value) -> Result<CallToolResponse> {
        let id = function_ref(&args)?;
        let code = self.client.get_function_code(credential, id).await?;
        Ok(CallToolResponse::text(code))
    }
}

/// `executeFunction`
#[derive(Debug, Clone)]
pub struct ExecuteFunctionTool {
    client: Arc<FunctionsClient>,
    available: Vec<WorkspaceInfo>,
}

impl ExecuteFunctionTool {
    pub fn new(client: Arc<FunctionsClient>) -> Self {
        Self {
            client,
            available: Vec::new(),
        }
    }

    /// List these functions in the description
    pub fn with_available(mut self, available: &[WorkspaceInfo]) -> Self {
        self.available = available.to_vec();
        self
    }
}

#[async_trait]
impl ToolHandler for ExecuteFunctionTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: EXECUTE_FUNCTION.to_string(),
            description: Some(describe_with_functions(
                "Execute a function with given input. Requires functionName and optional inputData parameters.",
                &self.available,
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "functionName": function_name_schema(),
                    "inputData": {
                        "type": "object",
                        "description": "Optional input data to pass to the function"
                    }
                },
                "required": ["functionName"]
            }),
        }
    }

    async fn call(&self, credential: &Credential, args: Value) -> Result<CallToolResponse> {
        let id = function_ref(&args)?;
        let input = match args.get("inputData") {
            None | Some(Value::Null) => json!({}),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => {
                return Err(
                    GatewayError::InvalidParams("'inputData' must be an object".to_string()).into(),
                )
            }
        };
        let result = self.client.execute_function(credential, id, &input).await?;
        Ok(CallToolResponse::json(&json!({ "success": true, "result": result })))
    }
}

/// `checkDeployment`
#[derive(Debug, Clone)]
pub struct CheckDeploymentTool {
    client: Arc<FunctionsClient>,
}

impl CheckDeploymentTool {
    pub fn new(client: Arc<FunctionsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for CheckDeploymentTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: CHECK_DEPLOYMENT.to_string(),
            description: Some(
                "Check the deployment status of a function. Requires functionName parameter."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": { "functionName": function_name_schema() },
                "required": ["functionName"]
            }),
        }
    }

    async fn call(&self, credential: &Credential, args: Value) -> Result<CallToolResponse> {
        let id = function_ref(&args)?;
        let deployment = self.client.latest_deployment(credential, id).await?;
        if deployment.get("id").is_none() {
            return Err(GatewayError::Tool("Deployment not found".to_string()).into());
        }
        Ok(CallToolResponse::json(&json!({ "deployment": deployment })))
    }
}
