//! PKCE S256 challenge generation
//!
//! Operators drive the upstream authorization-code flow by hand when they
//! need a bearer token for a static deployment; `fngate pkce` prints a fresh
//! verifier/challenge pair using these helpers.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, Result};

/// A PKCE S256 verifier and its derived challenge.
///
/// # Examples
///
/// ```
/// use fngate::auth::pkce::generate;
///
/// let pkce = generate();
/// assert_eq!(pkce.method, "S256");
/// assert_eq!(pkce.verifier.len(), 43);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct PkceChallenge {
    /// 32 random bytes, base64url without padding (43 characters).
    pub verifier: String,
    /// base64url(SHA-256(verifier)), no padding.
    pub challenge: String,
    /// Always `"S256"`.
    pub method: String,
}

/// Generates a fresh PKCE S256 challenge from 32 random bytes.
pub fn generate() -> PkceChallenge {
    use rand::RngCore as _;

    let mut random_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut random_bytes);

    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    let challenge = challenge_for(&verifier);

    PkceChallenge {
        verifier,
        challenge,
        method: "S256".to_string(),
    }
}

/// Derives the S256 challenge of an existing verifier.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Rebuilds a challenge pair from an operator-supplied verifier.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] when the verifier is outside the
/// 43..=128 length range or uses characters outside the RFC 7636 set.
pub fn from_verifier(verifier: &str) -> Result<PkceChallenge> {
    let len_ok = (43..=128).contains(&verifier.len());
    let chars_ok = verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'));
    if !len_ok || !chars_ok {
        return Err(GatewayError::Config(
            "PKCE verifier must be 43-128 characters of [A-Za-z0-9-._~]".to_string(),
        )
        .into());
    }

    Ok(PkceChallenge {
        verifier: verifier.to_string(),
        challenge: challenge_for(verifier),
        method: "S256".to_string(),
    })
}
