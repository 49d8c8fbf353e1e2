//! HTTP gateway integration tests
//!
//! Drives the axum router with `tower::ServiceExt::oneshot` and checks:
//!
//! - request, notification and response handling on `POST /mcp`
//! - session creation, resumption and replacement
//! - bounded waits: a hung tool yields a reconnectable error and leaves the
//!   session usable
//! - authentication, envelope rejection, method and CORS handling
//! - push delivery over the event stream

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::json;
use tower::ServiceExt;

use common::{event_stream_request as get, json_body, post, session_id_of, test_app, test_config, TOKEN};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ping_without_session_creates_one() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = session_id_of(&response);
    assert!(uuid::Uuid::parse_str(&session_id).is_ok());

    let body = json_body(response).await;
    assert_eq!(body, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
}

#[tokio::test]
async fn test_unknown_tool_is_invalid_params() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(
            json!({
                "jsonrpc": "2.0",
                "id": "abc",
                "method": "tools/call",
                "params": {"name": "doesNotExist", "arguments": {}}
            }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], "abc");
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(body["error"]["message"], "Unknown tool: doesNotExist");
}

#[tokio::test]
async fn test_hung_tool_times_out_and_session_survives() {
    let app = test_app(&test_config());

    let response = app
        .clone()
        .oneshot(post(
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "hang"}
            }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = session_id_of(&response);
    let body = json_body(response).await;
    assert_eq!(body["id"], 7);
    assert_eq!(body["error"]["code"], -32000);
    assert_eq!(body["error"]["data"]["reconnectable"], true);
    assert_eq!(body["error"]["data"]["retryAfterMs"], 2000);
    assert_eq!(body["error"]["data"]["timeoutMs"], 200);

    // Same session, new transport: answers normally
    let response = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "ping", "id": 8}),
            Some(&session_id),
        ))
        .await
        .unwrap();
    assert_eq!(session_id_of(&response), session_id);
    let body = json_body(response).await;
    assert_eq!(body["id"], 8);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_notification_is_accepted() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(!session_id_of(&response).is_empty());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_client_response_is_accepted() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(json!({"jsonrpc": "2.0", "id": 3, "result": {}}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_method() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "prompts/list", "id": 2}),
            None,
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32601);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_known_session_is_resumed() {
    let app = test_app(&test_config());

    let first = app
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    let session_id = session_id_of(&first);

    let second = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "tools/list", "id": 2}),
            Some(&session_id),
        ))
        .await
        .unwrap();
    assert_eq!(session_id_of(&second), session_id);

    let body = json_body(second).await;
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["hang", "ping"]);
}

#[tokio::test]
async fn test_initialize_always_starts_fresh_session() {
    let app = test_app(&test_config());

    let first = app
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    let session_id = session_id_of(&first);

    let init = app
        .oneshot(post(
            json!({
                "jsonrpc": "2.0",
                "method": "initialize",
                "id": 2,
                "params": {
                    "protocolVersion": "2025-03-26",
                    "clientInfo": {"name": "test", "version": "1"}
                }
            }),
            Some(&session_id),
        ))
        .await
        .unwrap();

    assert_ne!(session_id_of(&init), session_id);
    let body = json_body(init).await;
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(body["result"]["serverInfo"]["name"], "fngate");
}

#[tokio::test]
async fn test_unknown_session_id_is_replaced_once() {
    let app = test_app(&test_config());

    let a = app
        .clone()
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "ping", "id": 1}),
            Some("stale-id"),
        ))
        .await
        .unwrap();
    let b = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "ping", "id": 2}),
            Some("stale-id"),
        ))
        .await
        .unwrap();

    let replaced = session_id_of(&a);
    assert_ne!(replaced, "stale-id");
    assert_eq!(session_id_of(&b), replaced);
}

#[tokio::test]
async fn test_session_not_shared_across_credentials() {
    let app = test_app(&test_config());

    let first = app
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    let session_id = session_id_of(&first);

    let other = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("authorization", "Bearer someone-else")
        .header("mcp-session-id", &session_id)
        .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":2}"#))
        .unwrap();
    let response = app.oneshot(other).await.unwrap();
    assert_ne!(session_id_of(&response), session_id);
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_expires() {
    let app = test_app(&test_config());

    let first = app
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    let session_id = session_id_of(&first);

    tokio::time::advance(Duration::from_secs(20 * 60)).await;

    let again = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "ping", "id": 2}),
            Some(&session_id),
        ))
        .await
        .unwrap();
    assert_ne!(session_id_of(&again), session_id);
}

#[tokio::test]
async fn test_delete_terminates_session() {
    let app = test_app(&test_config());

    let first = app
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    let session_id = session_id_of(&first);

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header("authorization", format!("Bearer {}", TOKEN))
            .header("mcp-session-id", &session_id)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_credential_is_unauthorized() {
    let app = test_app(&test_config());

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("host", "gateway.test")
        .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get("mcp-session-id").is_none());
    let challenge = response
        .headers()
        .get("www-authenticate")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(challenge.starts_with("Bearer "));
    assert!(challenge
        .contains("resource_metadata=\"http://gateway.test/.well-known/oauth-protected-resource\""));

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["id"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_static_token_fallback() {
    let mut config = test_config();
    config.api.static_token = Some("operator-token".to_string());
    let app = test_app(&config);

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .body(Body::from(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let app = test_app(&test_config());

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("authorization", format!("Bearer {}", TOKEN))
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get("mcp-session-id").is_none());
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_invalid_envelope_echoes_id() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(json!({"jsonrpc": "1.0", "method": "ping", "id": 9}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 9);
}

#[tokio::test]
async fn test_batch_is_rejected() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(
            json!([{"jsonrpc": "2.0", "method": "ping", "id": 1}]),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], -32600);
}

#[tokio::test]
async fn test_unsupported_method_is_405() {
    let app = test_app(&test_config());

    let request = Request::builder()
        .method("PUT")
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers().get("allow").unwrap(),
        "GET, POST, DELETE, OPTIONS"
    );
}

#[tokio::test]
async fn test_preflight_echoes_requested_headers() {
    let app = test_app(&test_config());

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/mcp")
        .header("origin", "https://inspector.test")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization, x-custom")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "authorization, x-custom"
    );
    assert_eq!(headers.get("access-control-max-age").unwrap(), "86400");
}

#[tokio::test]
async fn test_responses_expose_session_header() {
    let app = test_app(&test_config());

    let response = app
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-expose-headers")
            .unwrap(),
        "Mcp-Session-Id"
    );
}

// ---------------------------------------------------------------------------
// GET: probe, discovery and push
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_get_probe() {
    let app = test_app(&test_config());
    let response = app.oneshot(get("/mcp", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "MCP streamable-http endpoint ready");
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn test_event_stream_requires_known_session() {
    let app = test_app(&test_config());

    let response = app
        .clone()
        .oneshot(get("/mcp", Some("text/event-stream"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get("/mcp", Some("text/event-stream"), Some("nope")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_push_reaches_event_stream() {
    let app = test_app(&test_config());

    let first = app
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    let session_id = session_id_of(&first);

    let stream = app
        .clone()
        .oneshot(get("/mcp", Some("text/event-stream"), Some(&session_id)))
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    assert!(stream
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let mut frames = stream.into_body().into_data_stream();

    let response = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "notify/me", "id": 2}),
            Some(&session_id),
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["result"]["pushed"], true);

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await
        .expect("no push frame")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("event: message"));
    assert!(text.contains("notifications/message"));
}

#[tokio::test]
async fn test_push_from_notification_reaches_event_stream() {
    let app = test_app(&test_config());

    let first = app
        .clone()
        .oneshot(post(json!({"jsonrpc": "2.0", "method": "ping", "id": 1}), None))
        .await
        .unwrap();
    let session_id = session_id_of(&first);

    let stream = app
        .clone()
        .oneshot(get("/mcp", Some("text/event-stream"), Some(&session_id)))
        .await
        .unwrap();
    let mut frames = stream.into_body().into_data_stream();

    // The handler pushes after the 202 has been sent and the exchange closed.
    let response = app
        .oneshot(post(
            json!({"jsonrpc": "2.0", "method": "notify/me"}),
            Some(&session_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await
        .expect("push from notification handler was dropped")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("notifications/message"));
}

#[tokio::test]
async fn test_service_info() {
    let app = test_app(&test_config());
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["name"], "fngate");
    assert_eq!(body["endpoints"]["mcp"], "/mcp");
}

#[tokio::test]
async fn test_protected_resource_metadata() {
    let mut config = test_config();
    config.server.public_base_url = Some("https://fn.example".to_string());
    config.auth.scopes = vec!["functions".to_string()];
    let app = test_app(&config);

    let response = app
        .clone()
        .oneshot(get("/.well-known/oauth-protected-resource", None, None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["resource"], "https://fn.example/mcp");
    assert_eq!(body["authorization_servers"][0], "https://fn.example");
    assert_eq!(body["scopes_supported"][0], "functions");
    assert_eq!(body["bearer_methods_supported"][0], "header");

    let response = app
        .oneshot(get("/.well-known/oauth-protected-resource/mcp", None, None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["resource"], "https://fn.example/mcp");
}
