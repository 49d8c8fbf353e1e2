//! Bearer credential contract
//!
//! The gateway never issues or validates tokens. It only needs to know
//! whether a caller presented one, so the token is carried as an opaque
//! [`Credential`] and handed through to every tool call of the session.
//!
//! # Module Layout
//!
//! - [`pkce`] -- RFC 7636 `S256` helpers used by the `pkce` command

pub mod pkce;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// An opaque bearer token.
///
/// `Debug` is redacted so credentials never leak into logs.
///
/// # Examples
///
/// ```
/// use fngate::auth::Credential;
///
/// let c = Credential::new("secret-token");
/// assert_eq!(c.expose(), "secret-token");
/// assert!(!format!("{:?}", c).contains("secret"));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building outbound `Authorization` headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Stable, non-reversible identifier for the token.
    ///
    /// Sessions remember the fingerprint of the credential that created them
    /// and only resume for callers presenting the same one.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&digest[..12])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

/// Produces the caller's credential from request headers.
pub trait CredentialProvider: Send + Sync {
    /// `None` when no usable credential was presented.
    fn extract(&self, headers: &HeaderMap) -> Option<Credential>;
}

/// Reads `Authorization: Bearer <token>`, falling back to a configured
/// static token when the header is absent.
#[derive(Debug, Clone, Default)]
pub struct BearerHeaderProvider {
    fallback: Option<Credential>,
}

impl BearerHeaderProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `token` for requests that carry no `Authorization` header.
    pub fn with_fallback(mut self, token: Option<String>) -> Self {
        self.fallback = token.filter(|t| !t.trim().is_empty()).map(Credential::new);
        self
    }
}

impl CredentialProvider for BearerHeaderProvider {
    fn extract(&self, headers: &HeaderMap) -> Option<Credential> {
        let header = match headers.get(AUTHORIZATION) {
            Some(h) => h,
            None => return self.fallback.clone(),
        };

        let value = header.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        Some(Credential::new(token))
    }
}

/// RFC 9728 protected resource metadata served from
/// `/.well-known/oauth-protected-resource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The URI of the protected resource itself.
    pub resource: String,

    /// Authorization server issuer URIs that protect this resource.
    pub authorization_servers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Always `["header"]`.
    pub bearer_methods_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    /// Describe the endpoint at `resource`, protected by `authorization_server`
    /// (defaults to the resource's own origin).
    pub fn new(resource: String, authorization_server: String, scopes: Vec<String>) -> Self {
        Self {
            resource,
            authorization_servers: vec![authorization_server],
            scopes_supported: if scopes.is_empty() { None } else { Some(scopes) },
            bearer_methods_supported: vec!["header".to_string()],
        }
    }
}
