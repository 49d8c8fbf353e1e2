use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::{json, Value};
use tempfile::TempDir;

use fngate::auth::Credential;
use fngate::config::Config;
use fngate::error::Result;
use fngate::http::{router, AppState};
use fngate::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcResponse};
use fngate::mcp::types::{CallToolResponse, McpTool};
use fngate::mcp::McpServer;
use fngate::tools::{PingTool, ToolHandler, ToolRegistryBuilder};
use fngate::transport::{Outbound, ProtocolServer, ProtocolServerFactory};

#[allow(dead_code)]
pub const TOKEN: &str = "test-token";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Tool whose call never completes.
#[allow(dead_code)]
pub struct HangingTool;

#[async_trait]
impl ToolHandler for HangingTool {
    fn definition(&self) -> McpTool {
        McpTool {
            name: "hang".to_string(),
            description: Some("Never answers".to_string()),
            input_schema: json!({"type": "object"}),
        }
    }

    async fn call(&self, _credential: &Credential, _args: Value) -> Result<CallToolResponse> {
        std::future::pending::<()>().await;
        Ok(CallToolResponse::text("unreachable"))
    }
}

/// Wraps the real protocol server and adds `notify/me`: as a request it
/// pushes a notification before answering, as a notification it pushes one
/// shortly afterwards.
#[allow(dead_code)]
#[derive(Debug)]
pub struct NotifyingServer {
    inner: McpServer,
}

#[async_trait]
impl ProtocolServer for NotifyingServer {
    async fn handle(&self, message: JsonRpcMessage, outbound: Arc<dyn Outbound>) {
        if let JsonRpcMessage::Request(request) = &message {
            if request.method == "notify/me" {
                outbound
                    .send(JsonRpcNotification::new("notifications/message", Some(json!({"text": "hello"}))).into())
                    .await;
                outbound
                    .send(JsonRpcResponse::success(request.id_or_null(), json!({"pushed": true})).into())
                    .await;
                return;
            }
        }
        if let JsonRpcMessage::Notification(notification) = &message {
            if notification.method == "notify/me" {
                // Outlive the POST that delivered the notification.
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                outbound
                    .send(JsonRpcNotification::new("notifications/message", Some(json!({"text": "later"}))).into())
                    .await;
                return;
            }
        }
        self.inner.handle(message, outbound).await;
    }
}

/// Factory with `ping` and `hang` tools and the `notify/me` extension.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct TestFactory;

impl ProtocolServerFactory for TestFactory {
    fn create(&self, credential: &Credential) -> Arc<dyn ProtocolServer> {
        let registry = ToolRegistryBuilder::new()
            .with_tool(Arc::new(PingTool))
            .with_tool(Arc::new(HangingTool))
            .build();
        Arc::new(NotifyingServer {
            inner: McpServer::new(credential.clone(), registry),
        })
    }
}

#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.transport.request_timeout_ms = 200;
    config
}

#[allow(dead_code)]
pub fn test_app(config: &Config) -> axum::Router {
    router(AppState::new(config, Arc::new(TestFactory)))
}

#[allow(dead_code)]
pub fn post(body: Value, session_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", TOKEN));
    if let Some(id) = session_id {
        builder = builder.header("mcp-session-id", id);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[allow(dead_code)]
pub fn event_stream_request(uri: &str, accept: Option<&str>, session_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header("host", "gateway.test")
        .header("authorization", format!("Bearer {}", TOKEN));
    if let Some(accept) = accept {
        builder = builder.header("accept", accept);
    }
    if let Some(id) = session_id {
        builder = builder.header("mcp-session-id", id);
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub fn session_id_of(response: &Response<Body>) -> String {
    response
        .headers()
        .get("mcp-session-id")
        .expect("missing mcp-session-id header")
        .to_str()
        .unwrap()
        .to_string()
}

#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
