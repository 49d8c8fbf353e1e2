//! Request handlers for the gateway endpoints

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::{AppState, ALLOWED_METHODS, MCP_SESSION_ID_HEADER};
use crate::auth::{Credential, ProtectedResourceMetadata};
use crate::jsonrpc::{parse_envelope, JsonRpcMessage, JsonRpcResponse, INTERNAL_ERROR, UNAUTHORIZED};
use crate::mcp::server::SERVER_NAME;
use crate::mcp::types::{METHOD_INITIALIZE, SUPPORTED_PROTOCOL_VERSIONS};
use crate::transport::{SessionTransport, SsePushSink};

const WELL_KNOWN_RESOURCE: &str = "/.well-known/oauth-protected-resource";
const DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization, Mcp-Session-Id, MCP-Protocol-Version";

/// Extract session ID from headers. Blank values count as absent.
fn get_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn with_session_id(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
    }
    response
}

/// Base URL used in discovery documents: configured, or derived from the
/// request's `Host`.
fn public_base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.server.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", scheme, host)
}

fn json_rpc(status: StatusCode, body: &JsonRpcResponse) -> Response {
    (status, Json(body)).into_response()
}

fn internal_error(error: &anyhow::Error) -> Response {
    warn!(error = %error, "Internal error while handling request");
    json_rpc(
        StatusCode::INTERNAL_SERVER_ERROR,
        &JsonRpcResponse::error(serde_json::Value::Null, INTERNAL_ERROR, error.to_string()),
    )
}

/// 401 carrying a JSON-RPC error body and a bearer challenge pointing at
/// the protected resource metadata.
fn unauthorized(state: &AppState, headers: &HeaderMap) -> Response {
    warn!("Request without a usable bearer credential");
    let body = JsonRpcResponse::error(
        serde_json::Value::Null,
        UNAUTHORIZED,
        "No bearer token available. Please re-authenticate.",
    );
    let mut response = json_rpc(StatusCode::UNAUTHORIZED, &body);
    let challenge = format!(
        "Bearer realm=\"{}\", error=\"invalid_token\", error_description=\"Missing bearer token\", resource_metadata=\"{}{}\"",
        SERVER_NAME,
        public_base_url(state, headers),
        WELL_KNOWN_RESOURCE
    );
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Credential, Response> {
    state
        .credentials
        .extract(headers)
        .ok_or_else(|| unauthorized(state, headers))
}

/// POST {endpoint} - deliver one JSON-RPC message.
///
/// Requests answer 200 with the reply (204 when the server produced none),
/// notifications and client responses answer 202. The session id is
/// returned on every response that got as far as session resolution.
pub async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let credential = match authenticate(&state, &headers) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let message = match parse_envelope(&body) {
        Ok(message) => message,
        Err(rejected) => {
            debug!(code = rejected.error.code, "Rejected envelope");
            return json_rpc(StatusCode::BAD_REQUEST, &rejected.into_response());
        }
    };

    let presented = get_session_id(&headers);
    let is_initialize = message.method() == Some(METHOD_INITIALIZE);
    let resolved = state
        .registry
        .resolve(presented.as_deref(), is_initialize, &credential)
        .await;
    let session = resolved.session;
    let session_id = session.id().to_string();

    let observed_id = session_id.clone();
    let transport = Arc::new(
        SessionTransport::new(
            session_id.clone(),
            session.server(),
            session.push().clone(),
            state.settings,
        )
        .with_error_observer(move |e| warn!(session_id = %observed_id, error = %e, "Transport error")),
    );

    let response = match transport.start().await {
        Err(e) => internal_error(&e),
        Ok(()) => match message {
            JsonRpcMessage::Request(request) => match transport.deliver_request(request).await {
                Ok(Some(reply)) => json_rpc(StatusCode::OK, &reply),
                Ok(None) => StatusCode::NO_CONTENT.into_response(),
                Err(e) => internal_error(&e),
            },
            JsonRpcMessage::Notification(notification) => {
                match transport.deliver_notification(notification).await {
                    Ok(()) => StatusCode::ACCEPTED.into_response(),
                    Err(e) => internal_error(&e),
                }
            }
            JsonRpcMessage::Response(reply) => {
                debug!(session_id = %session_id, id = %reply.id, "Client sent a response; nothing awaits it");
                StatusCode::ACCEPTED.into_response()
            }
        },
    };
    transport.close().await;

    with_session_id(response, &session_id)
}

/// GET {endpoint} - readiness probe, or attach a push stream.
pub async fn mcp_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let credential = match authenticate(&state, &headers) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let wants_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false);

    if !wants_stream {
        return Json(json!({
            "message": "MCP streamable-http endpoint ready",
            "authenticated": true,
            "protocolVersions": SUPPORTED_PROTOCOL_VERSIONS,
        }))
        .into_response();
    }

    let session_id = match get_session_id(&headers) {
        Some(id) => id,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Mcp-Session-Id header required for event stream"})),
            )
                .into_response();
        }
    };

    let session = match state.registry.get(&session_id, &credential).await {
        Some(session) => session,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Session not found"})),
            )
                .into_response();
        }
    };

    let (sink, rx) = SsePushSink::channel(state.server.push_buffer);
    session.push().attach(Arc::new(sink)).await;
    info!(session_id = %session_id, "Push stream opened");

    let stream = ReceiverStream::new(rx)
        .map(|data| Ok::<_, Infallible>(Event::default().event("message").data(data)));

    let response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response();
    with_session_id(response, &session_id)
}

/// DELETE {endpoint} - terminate a session.
pub async fn mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let credential = match authenticate(&state, &headers) {
        Ok(c) => c,
        Err(response) => return response,
    };

    let session_id = match get_session_id(&headers) {
        Some(id) => id,
        None => return StatusCode::BAD_REQUEST.into_response(),
    };

    if state.registry.terminate(&session_id, &credential).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Any other method on the endpoint.
pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, ALLOWED_METHODS)],
        "Method not allowed. Use GET to establish session or POST with JSON-RPC payload.",
    )
        .into_response()
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))).into_response()
}

/// GET / - service identity.
pub async fn service_info(State(state): State<AppState>) -> Response {
    Json(json!({
        "name": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "mcp": state.server.endpoint_path,
            "protectedResource": WELL_KNOWN_RESOURCE,
        },
    }))
    .into_response()
}

/// GET /.well-known/oauth-protected-resource[/path]
pub async fn protected_resource(
    State(state): State<AppState>,
    path: Option<Path<String>>,
    headers: HeaderMap,
) -> Response {
    let base = public_base_url(&state, &headers);
    let resource = match path {
        Some(Path(path)) => format!("{}/{}", base, path.trim_start_matches('/')),
        None => format!("{}{}", base, state.server.endpoint_path),
    };
    let authorization_server = state
        .auth
        .authorization_server
        .clone()
        .unwrap_or_else(|| base.clone());

    Json(ProtectedResourceMetadata::new(
        resource,
        authorization_server,
        state.auth.scopes.clone(),
    ))
    .into_response()
}

/// CORS for every response; `OPTIONS` is answered here as a preflight.
pub async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = HeaderValue::from_str(&state.server.allowed_origin)
        .unwrap_or_else(|_| HeaderValue::from_static("*"));

    if request.method() == Method::OPTIONS {
        let requested = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOW_HEADERS));

        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Mcp-Session-Id"),
    );
    response
}
