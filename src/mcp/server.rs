//! Protocol server: dispatches MCP methods onto the tool registry
//!
//! One [`McpServer`] is built per session and bound to that session's
//! credential. It serves one tool-registry snapshot at a time; when the
//! caller's function list changes the snapshot is replaced and the client is
//! told through `notifications/tools/list_changed` on the push channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::types::{
    negotiate_protocol_version, CallToolParams, Implementation, InitializeParams,
    InitializeResponse, ListToolsResponse, ServerCapabilities, ToolsCapability, METHOD_INITIALIZE,
    METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, NOTIF_CANCELLED, NOTIF_INITIALIZED,
    NOTIF_TOOLS_LIST_CHANGED,
};
use crate::api::FunctionsClient;
use crate::auth::Credential;
use crate::error::GatewayError;
use crate::jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::tools::{FunctionCatalog, ToolRegistry, ToolRegistryBuilder, WorkspaceInfo};
use crate::transport::{Outbound, ProtocolServer, ProtocolServerFactory};

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "fngate";

struct ToolSnapshot {
    registry: Arc<ToolRegistry>,
    /// Functions the snapshot's descriptions were built from
    described: Vec<WorkspaceInfo>,
}

pub struct McpServer {
    credential: Credential,
    tools: RwLock<ToolSnapshot>,
    catalog: Option<Arc<FunctionCatalog>>,
}

impl McpServer {
    /// Server over a fixed registry
    pub fn new(credential: Credential, registry: ToolRegistry) -> Self {
        Self {
            credential,
            tools: RwLock::new(ToolSnapshot {
                registry: Arc::new(registry),
                described: Vec::new(),
            }),
            catalog: None,
        }
    }

    /// Server whose registry is rebuilt from `catalog` whenever the caller's
    /// function list differs from the one it was last built with.
    pub fn with_catalog(credential: Credential, catalog: Arc<FunctionCatalog>) -> Self {
        let described = catalog.cached(&credential).unwrap_or_default();
        let registry = ToolRegistryBuilder::new()
            .with_functions(catalog.clone(), &described)
            .build();
        Self {
            credential,
            tools: RwLock::new(ToolSnapshot {
                registry: Arc::new(registry),
                described,
            }),
            catalog: Some(catalog),
        }
    }

    /// Snapshot currently served
    pub async fn registry(&self) -> Arc<ToolRegistry> {
        self.tools.read().await.registry.clone()
    }

    /// Bring the tool descriptions up to date with the caller's functions.
    ///
    /// With `fetch`, a missing or expired list is fetched from the platform;
    /// otherwise only a cached list is considered. Pushes
    /// `notifications/tools/list_changed` when a new snapshot was installed.
    async fn sync_catalog(&self, outbound: &Arc<dyn Outbound>, fetch: bool) {
        let Some(catalog) = &self.catalog else {
            return;
        };

        let workspaces = if fetch {
            match catalog.workspaces(&self.credential).await {
                Ok(workspaces) => workspaces,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not fetch function list");
                    return;
                }
            }
        } else {
            match catalog.cached(&self.credential) {
                Some(cached) => cached,
                None => return,
            }
        };

        let generation = {
            let mut tools = self.tools.write().await;
            if tools.described == workspaces {
                return;
            }
            let registry = ToolRegistryBuilder::new()
                .with_functions(catalog.clone(), &workspaces)
                .build();
            let generation = registry.generation();
            tools.registry = Arc::new(registry);
            tools.described = workspaces;
            generation
        };

        tracing::info!(generation, "Tool descriptions updated");
        outbound
            .send(JsonRpcNotification::new(NOTIF_TOOLS_LIST_CHANGED, None).into())
            .await;
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            METHOD_INITIALIZE => self.initialize(request.params.as_ref()),
            METHOD_PING => Ok(json!({})),
            METHOD_TOOLS_LIST => to_value(&ListToolsResponse {
                tools: self.registry().await.definitions(),
            }),
            METHOD_TOOLS_CALL => self.call_tool(request.params.clone()).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p.clone())
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)))?,
            None => InitializeParams::default(),
        };
        let version = negotiate_protocol_version(params.protocol_version.as_deref());
        if let Some(client) = &params.client_info {
            tracing::info!(client = %client.name, client_version = %client.version, protocol = %version, "Client initialized");
        }

        to_value(&InitializeResponse {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(self.catalog.is_some()),
                }),
                logging: None,
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: None,
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or(CallToolParams {
                name: String::new(),
                arguments: None,
            });

        let tool = self
            .registry()
            .await
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(GatewayError::UnknownTool(params.name.clone()).to_string()))?;

        let args = params.arguments.unwrap_or_else(|| json!({}));
        tracing::debug!(tool = %params.name, "Calling tool");
        match tool.call(&self.credential, args).await {
            Ok(response) => to_value(&response),
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "Tool call failed");
                match e.downcast_ref::<GatewayError>() {
                    Some(GatewayError::InvalidParams(msg)) => Err(JsonRpcError::invalid_params(msg.clone())),
                    _ => Err(JsonRpcError::internal(e.to_string())),
                }
            }
        }
    }

    fn on_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            NOTIF_INITIALIZED => tracing::debug!("Client finished initialization"),
            NOTIF_CANCELLED => tracing::debug!(params = ?notification.params, "Client cancelled a request"),
            other => tracing::debug!(method = %other, "Ignoring notification"),
        }
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("credential", &self.credential)
            .field("catalog", &self.catalog.is_some())
            .finish()
    }
}

#[async_trait]
impl ProtocolServer for McpServer {
    async fn handle(&self, message: JsonRpcMessage, outbound: Arc<dyn Outbound>) {
        match message {
            JsonRpcMessage::Request(request) => {
                let id = request.id_or_null();
                let response = match self.dispatch(&request).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(error) => JsonRpcResponse::from_error(id, error),
                };
                outbound.send(response.into()).await;
                // A tool call may have refreshed the cached function list.
                if request.method == METHOD_TOOLS_CALL {
                    self.sync_catalog(&outbound, false).await;
                }
            }
            JsonRpcMessage::Notification(notification) => {
                self.on_notification(&notification);
                if notification.method == NOTIF_INITIALIZED {
                    self.sync_catalog(&outbound, true).await;
                }
            }
            JsonRpcMessage::Response(response) => {
                tracing::debug!(id = %response.id, "Ignoring client response");
            }
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal(e.to_string()))
}

/// Builds an [`McpServer`] over a fresh registry snapshot per session.
///
/// Function lists are shared across sessions of the same caller through one
/// [`FunctionCatalog`].
#[derive(Debug, Clone)]
pub struct McpServerFactory {
    catalog: Arc<FunctionCatalog>,
}

impl McpServerFactory {
    pub fn new(client: Arc<FunctionsClient>, workspace_cache_ttl: Duration) -> Self {
        Self {
            catalog: Arc::new(FunctionCatalog::new(client, workspace_cache_ttl)),
        }
    }
}

impl ProtocolServerFactory for McpServerFactory {
    fn create(&self, credential: &Credential) -> Arc<dyn ProtocolServer> {
        let server = McpServer::with_catalog(credential.clone(), self.catalog.clone());
        tracing::debug!("Created protocol server");
        Arc::new(server)
    }
}
