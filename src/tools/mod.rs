//! Tool registry for fngate
//!
//! A [`ToolRegistry`] is an immutable snapshot. Each snapshot carries a
//! generation number drawn from a process-wide counter, so two sessions
//! bootstrapped concurrently can be told apart by which registry they were
//! given. Snapshots are assembled with [`ToolRegistryBuilder`] and never
//! mutated afterwards. A session that learns about new functions swaps in a
//! freshly built snapshot rather than editing its current one.

pub mod catalog;
pub mod functions;
pub mod ping;
pub mod whoami;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::Credential;
use crate::error::{GatewayError, Result};
use crate::mcp::types::{CallToolResponse, McpTool};

pub use catalog::{FunctionCatalog, WorkspaceCache, WorkspaceInfo};
pub use functions::{CheckDeploymentTool, ExecuteFunctionTool, GetFunctionCodeTool, ListFunctionsTool};
pub use ping::PingTool;
pub use whoami::WhoamiTool;

static GENERATION: AtomicU64 = AtomicU64::new(0);

/// A single callable tool
///
/// # Examples
///
/// ```no_run
/// use fngate::auth::Credential;
/// use fngate::error::Result;
/// use fngate::mcp::types::{CallToolResponse, McpTool};
/// use fngate::tools::ToolHandler;
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct Hello;
///
/// #[async_trait]
/// impl ToolHandler for Hello {
///     fn definition(&self) -> McpTool {
///         McpTool {
///             name: "hello".to_string(),
///             description: Some("Say hello".to_string()),
///             input_schema: serde_json::json!({ "type": "object" }),
///         }
///     }
///
///     async fn call(&self, _credential: &Credential, _args: Value) -> Result<CallToolResponse> {
///         Ok(CallToolResponse::text("hello"))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name, description and input schema advertised by `tools/list`
    fn definition(&self) -> McpTool;

    /// Run the tool for the given caller
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidParams`] for unusable arguments; anything else
    /// is reported to the caller as an internal error.
    async fn call(&self, credential: &Credential, args: Value) -> Result<CallToolResponse>;
}

/// Immutable, versioned set of tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    generation: u64,
}

impl ToolRegistry {
    /// Generation of this snapshot. Strictly increasing across snapshots
    /// built in this process.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Definitions of every tool, sorted by name
    pub fn definitions(&self) -> Vec<McpTool> {
        let mut defs: Vec<McpTool> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry")
            .field("generation", &self.generation)
            .field("tools", &names)
            .finish()
    }
}

/// Assembles a [`ToolRegistry`] snapshot
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later tool with the same name replaces an earlier one.
    pub fn with_tool(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice, keeping the last one");
        }
        self
    }

    /// Add `ping`, `whoami` and the function platform proxies. `available`
    /// is listed in the descriptions of the tools that take a function name.
    pub fn with_functions(self, catalog: Arc<FunctionCatalog>, available: &[WorkspaceInfo]) -> Self {
        let client = catalog.client().clone();
        self.with_tool(Arc::new(PingTool))
            .with_tool(Arc::new(WhoamiTool))
            .with_tool(Arc::new(ListFunctionsTool::new(catalog)))
            .with_tool(Arc::new(
                GetFunctionCodeTool::new(client.clone()).with_available(available),
            ))
            .with_tool(Arc::new(
                ExecuteFunctionTool::new(client.clone()).with_available(available),
            ))
            .with_tool(Arc::new(CheckDeploymentTool::new(client)))
    }

    /// Freeze the snapshot and assign it the next generation
    pub fn build(self) -> ToolRegistry {
        let generation = GENERATION.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, tools = self.tools.len(), "Built tool registry");
        ToolRegistry {
            tools: self.tools,
            generation,
        }
    }
}

/// Read a required string argument
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => {
            Err(GatewayError::InvalidParams(format!("'{}' must not be empty", key)).into())
        }
        Some(_) => Err(GatewayError::InvalidParams(format!("'{}' must be a string", key)).into()),
        None => Err(GatewayError::InvalidParams(format!("Missing '{}' parameter", key)).into()),
    }
}
