//! REST client for the functions platform
//!
//! Every call carries the caller's bearer credential; the client itself holds
//! no identity. Non-success statuses become [`GatewayError::Api`].

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::auth::Credential;
use crate::config::ApiConfig;
use crate::error::{GatewayError, Result};

/// A workspace (one deployable function) as listed by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WorkspacesEnvelope {
    #[serde(default)]
    workspaces: Vec<Workspace>,
}

#[derive(Debug, Deserialize)]
struct CodeEnvelope {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentEnvelope {
    #[serde(default)]
    deployment: Option<Value>,
}

/// HTTP client for the functions management and run endpoints
#[derive(Debug, Clone)]
pub struct FunctionsClient {
    client: Client,
    base_url: Url,
    run_base_url: Url,
}

impl FunctionsClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built or a base URL does
    /// not parse
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("fngate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: parse_base(&config.base_url)?,
            run_base_url: parse_base(&config.run_base_url)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// List the caller's workspaces
    pub async fn list_workspaces(&self, credential: &Credential) -> Result<Vec<Workspace>> {
        let url = endpoint(&self.base_url, &["workspaces"], None, &[])?;
        let response = self
            .send(self.request(Method::GET, url, credential), "list workspaces")
            .await?;
        let body: WorkspacesEnvelope = response.json().await.map_err(GatewayError::Http)?;
        Ok(body.workspaces)
    }

    /// Fetch the source code of a function
    pub async fn get_function_code(&self, credential: &Credential, function_id: &str) -> Result<String> {
        let url = endpoint(&self.base_url, &["workspaces"], Some(function_id), &["code"])?;
        let response = self
            .send(self.request(Method::GET, url, credential), "get function code")
            .await?;
        let body: CodeEnvelope = response.json().await.map_err(GatewayError::Http)?;
        Ok(body.code)
    }

    /// Run a function with `input` as its JSON body.
    ///
    /// Functions may answer with plain text; that comes back as a JSON string.
    pub async fn execute_function(
        &self,
        credential: &Credential,
        function_id: &str,
        input: &Value,
    ) -> Result<Value> {
        let url = endpoint(&self.run_base_url, &["run"], Some(function_id), &[])?;
        tracing::debug!(function_id = %function_id, "Executing function");
        let response = self
            .send(
                self.request(Method::POST, url, credential).json(input),
                "execute function",
            )
            .await?;

        let text = response.text().await.map_err(GatewayError::Http)?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Latest deployment record of a function, `{}` when the platform has none.
    pub async fn latest_deployment(&self, credential: &Credential, function_id: &str) -> Result<Value> {
        let url = endpoint(
            &self.base_url,
            &["workspaces"],
            Some(function_id),
            &["deployments", "latest"],
        )?;
        let response = self
            .send(self.request(Method::GET, url, credential), "get deployment status")
            .await?;
        let body: DeploymentEnvelope = response.json().await.map_err(GatewayError::Http)?;
        Ok(body
            .deployment
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    fn request(&self, method: Method, url: Url, credential: &Credential) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(credential.expose())
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Functions API request failed: {}", e);
            GatewayError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Failed to {}: {}", action, body);
            let message = if body.is_empty() {
                format!(
                    "Failed to {}: {}",
                    action,
                    status.canonical_reason().unwrap_or("unknown status")
                )
            } else {
                format!("Failed to {}: {}", action, body)
            };
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(response)
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| GatewayError::Config(format!("Invalid API URL '{}': {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(GatewayError::Config(format!("API URL '{}' cannot be a base", raw)).into());
    }
    Ok(url)
}

/// Append path segments to `base`. A function id of the form `owner/name`
/// contributes one segment per part; every segment is percent-encoded, so an
/// id can never introduce a query, a fragment or a parent traversal.
fn endpoint(base: &Url, prefix: &[&str], function_id: Option<&str>, suffix: &[&str]) -> Result<Url> {
    let id_segments: Vec<&str> = match function_id {
        Some(id) => {
            let parts: Vec<&str> = id.split('/').collect();
            if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
                return Err(GatewayError::InvalidParams(format!("Invalid function id: {}", id)).into());
            }
            parts
        }
        None => Vec::new(),
    };

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GatewayError::Config(format!("API URL '{}' cannot be a base", base)))?
        .pop_if_empty()
        .extend(prefix)
        .extend(id_segments)
        .extend(suffix);
    Ok(url)
}
