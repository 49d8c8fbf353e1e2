//! JSON-RPC 2.0 wire primitives
//!
//! Request, response, error and notification objects as they travel over the
//! HTTP boundary, plus envelope classification. A body carrying an `id` is a
//! Request and needs exactly one reply; a body without one is a Notification.
//! Responses always carry `id` (it is `null` when the failing body had none)
//! and exactly one of `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The only protocol version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Body is not valid JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Body is JSON but not a valid JSON-RPC 2.0 object.
pub const INVALID_REQUEST: i64 = -32600;
/// No handler for the requested method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid params, including an unknown tool name.
pub const INVALID_PARAMS: i64 = -32602;
/// Unclassified server failure or a failed tool handler.
pub const INTERNAL_ERROR: i64 = -32603;
/// Transport-level failure. Always reconnectable.
pub const TRANSPORT_ERROR: i64 = -32000;
/// Missing bearer credential.
pub const UNAUTHORIZED: i64 = -32001;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request object.
///
/// `id` is `None` for notifications; [`parse_envelope`] converts those into
/// [`JsonRpcNotification`] so the rest of the gateway never has to check.
///
/// # Examples
///
/// ```
/// use fngate::jsonrpc::JsonRpcRequest;
///
/// let req = JsonRpcRequest::new(serde_json::json!(1), "ping", None);
/// assert_eq!(req.jsonrpc, "2.0");
/// assert!(!req.is_notification());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Request correlation identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request with the given id.
    pub fn new(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// `true` when the request carries no id.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The id, or JSON `null` when absent.
    pub fn id_or_null(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// A JSON-RPC 2.0 response object.
///
/// Exactly one of `result` or `error` is present; the constructors enforce it.
///
/// # Examples
///
/// ```
/// use fngate::jsonrpc::JsonRpcResponse;
///
/// let resp = JsonRpcResponse::success(serde_json::json!(7), serde_json::json!({}));
/// let wire = serde_json::to_value(&resp).unwrap();
/// assert_eq!(wire["id"], 7);
/// assert!(wire.get("error").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Mirrors the `id` from the corresponding request.
    #[serde(default)]
    pub id: Value,
    /// Successful result value; mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object; mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response without `data`.
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::from_error(id, JsonRpcError::new(code, message))
    }

    /// Error response carrying a `data` payload.
    pub fn error_with_data(id: Value, code: i64, message: impl Into<String>, data: Value) -> Self {
        Self::from_error(id, JsonRpcError::new(code, message).with_data(data))
    }

    /// Wrap an already-built error object.
    pub fn from_error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// `true` when this response carries an error object.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"JSON-RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use fngate::jsonrpc::JsonRpcError;
///
/// let e = JsonRpcError::new(-32600, "Invalid Request");
/// assert_eq!(e.to_string(), "JSON-RPC error -32600: Invalid Request");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable error description.
    pub message: String,
    /// Optional additional error context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(detail: impl fmt::Display) -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
            .with_data(serde_json::json!({ "detail": detail.to_string() }))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// Transport-level error the caller recovers from by resubmitting the
    /// same request to the same session.
    ///
    /// `data` always contains `reconnectable: true` and `retryAfterMs`; keys in
    /// `extra` are merged in but can never override those two.
    ///
    /// # Examples
    ///
    /// ```
    /// use fngate::jsonrpc::JsonRpcError;
    ///
    /// let e = JsonRpcError::reconnectable("Connection closed", 2000, Default::default());
    /// let data = e.data.unwrap();
    /// assert_eq!(data["reconnectable"], true);
    /// assert_eq!(data["retryAfterMs"], 2000);
    /// ```
    pub fn reconnectable(
        message: impl Into<String>,
        retry_after_ms: u64,
        extra: Map<String, Value>,
    ) -> Self {
        let mut data = extra;
        data.insert("reconnectable".to_string(), Value::Bool(true));
        data.insert("retryAfterMs".to_string(), Value::from(retry_after_ms));
        Self::new(TRANSPORT_ERROR, message).with_data(Value::Object(data))
    }

    /// `true` when `data.reconnectable` is set.
    pub fn is_reconnectable(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|d| d.get("reconnectable"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 notification. Used for inbound fire-and-forget messages and
/// for server push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// The notification method name.
    pub method: String,
    /// Optional notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Any message that crosses a session transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Carries an id and needs exactly one reply.
    Request(JsonRpcRequest),
    /// No id, no reply. Also the shape of a server push.
    Notification(JsonRpcNotification),
    /// Result or error for an earlier request.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Correlation id for requests and responses. Notifications have none.
    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Request(r) => r.id.as_ref(),
            Self::Notification(_) => None,
            Self::Response(r) => Some(&r.id),
        }
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Notification(_) => "notification",
            Self::Response(_) => "response",
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(req: JsonRpcRequest) -> Self {
        match req.id {
            Some(_) => Self::Request(req),
            None => Self::Notification(JsonRpcNotification {
                jsonrpc: req.jsonrpc,
                method: req.method,
                params: req.params,
            }),
        }
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(n: JsonRpcNotification) -> Self {
        Self::Notification(n)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(r: JsonRpcResponse) -> Self {
        Self::Response(r)
    }
}

// ---------------------------------------------------------------------------
// Envelope parsing
// ---------------------------------------------------------------------------

/// A rejected envelope: the error to return and the id to echo (`null` when
/// the body had none or could not be read).
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeError {
    pub id: Value,
    pub error: JsonRpcError,
}

impl EnvelopeError {
    fn new(id: Value, error: JsonRpcError) -> Self {
        Self { id, error }
    }

    /// The JSON-RPC response to send back for this rejection.
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::from_error(self.id, self.error)
    }
}

/// Classify a raw HTTP body as a request, notification or response.
///
/// Malformed JSON yields `-32700`. A non-object body, a batch array, a wrong
/// `jsonrpc` tag, a missing or empty `method` on a call, or a response with
/// both or neither of `result`/`error` yields `-32600`, echoing the body's id
/// when one was readable.
///
/// # Examples
///
/// ```
/// use fngate::jsonrpc::{parse_envelope, JsonRpcMessage};
///
/// let msg = parse_envelope(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
/// assert!(matches!(msg, JsonRpcMessage::Request(_)));
///
/// let err = parse_envelope(b"{not json").unwrap_err();
/// assert_eq!(err.error.code, -32700);
/// ```
pub fn parse_envelope(body: &[u8]) -> std::result::Result<JsonRpcMessage, EnvelopeError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| EnvelopeError::new(Value::Null, JsonRpcError::parse_error()))?;

    let obj = match value {
        Value::Object(obj) => obj,
        Value::Array(_) => {
            return Err(EnvelopeError::new(
                Value::Null,
                JsonRpcError::invalid_request("batch requests are not supported"),
            ))
        }
        _ => {
            return Err(EnvelopeError::new(
                Value::Null,
                JsonRpcError::invalid_request("body must be a JSON object"),
            ))
        }
    };

    let id = obj.get("id").cloned().unwrap_or(Value::Null);
    let invalid = |detail: &str| EnvelopeError::new(id.clone(), JsonRpcError::invalid_request(detail));

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => return Err(invalid("jsonrpc must be \"2.0\"")),
    }

    if obj.contains_key("method") {
        match obj.get("method").and_then(Value::as_str) {
            Some(m) if !m.is_empty() => {}
            _ => return Err(invalid("method must be a non-empty string")),
        }
        if !matches!(
            obj.get("id"),
            None | Some(Value::Null) | Some(Value::String(_)) | Some(Value::Number(_))
        ) {
            return Err(invalid("id must be a string or a number"));
        }
        let req: JsonRpcRequest =
            serde_json::from_value(Value::Object(obj.clone())).map_err(|e| invalid(&e.to_string()))?;
        return Ok(req.into());
    }

    if obj.contains_key("result") ^ obj.contains_key("error") {
        let resp: JsonRpcResponse =
            serde_json::from_value(Value::Object(obj.clone())).map_err(|e| invalid(&e.to_string()))?;
        return Ok(JsonRpcMessage::Response(resp));
    }

    Err(invalid("missing method"))
}
