//! Bearer-token authentication.
//!
//! This module owns everything between the `Authorization` header and the
//! caller's user id:
//!
//! - [`bearer_token`] - the header state machine
//! - [`TokenVerifier`] / [`TokenIssuer`] - the collaborator traits
//! - [`SignedTokens`] - the shipped Ed25519 implementation of both
//! - [`require_auth`] - the middleware that attaches [`AuthUser`] to requests
//!
//! # Token Format
//!
//! ```text
//! base64url(claims JSON) "." base64url(Ed25519 signature of the first segment)
//! ```
//!
//! Claims are `{"sub": <user id>, "iat": <unix secs>, "exp": <unix secs>}`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use eventdesk_server::auth::{SignedTokens, TokenIssuer, TokenVerifier};
//!
//! let tokens = SignedTokens::from_seed([7u8; 32], Duration::from_secs(3600));
//! let token = tokens.issue("user-1").unwrap();
//! assert_eq!(tokens.verify(&token).unwrap(), "user-1");
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SIGNATURE_LENGTH};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::ApiError;

/// Length of an Ed25519 seed in bytes.
pub const SEED_LENGTH: usize = 32;

/// Errors produced while issuing or verifying tokens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token does not have the `claims.signature` shape.
    #[error("malformed token")]
    Malformed,

    /// A token segment or key is not valid base64.
    #[error("invalid base64 encoding for {0}")]
    InvalidBase64(String),

    /// The signature does not match the claims.
    #[error("invalid signature")]
    InvalidSignature,

    /// The claims segment is not valid JSON claims.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    /// The token's `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// The configured key cannot be used.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

impl AuthError {
    pub fn invalid_base64(field: impl Into<String>) -> Self {
        Self::InvalidBase64(field.into())
    }

    /// Returns `true` if the token was well-formed but no longer valid.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// Verifies a bearer token and returns the user id it was issued for.
///
/// Verification is synchronous and local.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Issues bearer tokens for authenticated users.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Ed25519-signed, expiring bearer tokens.
#[derive(Clone)]
pub struct SignedTokens {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl SignedTokens {
    /// Creates a token service from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: [u8; SEED_LENGTH], ttl: Duration) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl,
        }
    }

    /// Creates a token service from a base64-encoded (standard alphabet) seed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidBase64`] or [`AuthError::InvalidKey`] if
    /// the seed cannot be decoded into exactly 32 bytes.
    pub fn from_base64_seed(seed_base64: &str, ttl: Duration) -> Result<Self, AuthError> {
        let bytes = STANDARD
            .decode(seed_base64.trim())
            .map_err(|_| AuthError::invalid_base64("token key"))?;
        let seed: [u8; SEED_LENGTH] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            AuthError::InvalidKey(format!(
                "expected {SEED_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_seed(seed, ttl))
    }

    /// Creates a token service with a random, process-lifetime key.
    pub fn ephemeral(ttl: Duration) -> Self {
        let mut seed = [0u8; SEED_LENGTH];
        rand::rng().fill(&mut seed);
        Self::from_seed(seed, ttl)
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for SignedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokens")
            .field("signing_key", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer for SignedTokens {
    fn issue(&self, user_id: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };

        let claims_json =
            serde_json::to_vec(&claims).map_err(|e| AuthError::InvalidClaims(e.to_string()))?;
        let claims_segment = URL_SAFE_NO_PAD.encode(claims_json);
        let signature = self.signing_key.sign(claims_segment.as_bytes());
        let signature_segment = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        trace!(user_id = %user_id, exp = claims.exp, "Issued token");

        Ok(format!("{claims_segment}.{signature_segment}"))
    }
}

impl TokenVerifier for SignedTokens {
    fn verify(&self, token: &str) -> Result<String, AuthError> {
        let (claims_segment, signature_segment) =
            token.split_once('.').ok_or(AuthError::Malformed)?;
        if claims_segment.is_empty() || signature_segment.is_empty() {
            return Err(AuthError::Malformed);
        }

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_segment)
            .map_err(|_| AuthError::invalid_base64("signature"))?;
        let signature_array: [u8; SIGNATURE_LENGTH] = signature_bytes
            .try_into()
            .map_err(|_| AuthError::InvalidSignature)?;
        let signature = Signature::from_bytes(&signature_array);

        self.verifying_key
            .verify_strict(claims_segment.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_segment)
            .map_err(|_| AuthError::invalid_base64("claims"))?;
        let claims: Claims = serde_json::from_slice(&claims_json)
            .map_err(|e| AuthError::InvalidClaims(e.to_string()))?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        if claims.sub.is_empty() {
            return Err(AuthError::InvalidClaims("empty subject".to_string()));
        }

        Ok(claims.sub)
    }
}

/// Why a request was rejected before reaching a protected handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    MissingHeader,
    InvalidFormat,
    MissingToken,
    InvalidToken,
}

impl AuthRejection {
    /// Client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing authorization header",
            Self::InvalidFormat => "invalid authorization format",
            Self::MissingToken => "missing token",
            Self::InvalidToken => "invalid or expired token",
        }
    }
}

impl From<AuthRejection> for ApiError {
    fn from(rejection: AuthRejection) -> Self {
        ApiError::unauthorized(rejection.message())
    }
}

/// Extracts the bearer token from request headers.
///
/// # Example
///
/// ```rust
/// use axum::http::{HeaderMap, HeaderValue};
/// use eventdesk_server::auth::{bearer_token, AuthRejection};
///
/// let mut headers = HeaderMap::new();
/// assert_eq!(bearer_token(&headers), Err(AuthRejection::MissingHeader));
///
/// headers.insert("authorization", HeaderValue::from_static("Basic abc"));
/// assert_eq!(bearer_token(&headers), Err(AuthRejection::InvalidFormat));
///
/// headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
/// assert_eq!(bearer_token(&headers), Ok("abc"));
/// ```
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthRejection::MissingHeader)?;
    let value = value.to_str().map_err(|_| AuthRejection::InvalidFormat)?;

    if value.trim_end() == "Bearer" {
        return Err(AuthRejection::MissingToken);
    }

    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthRejection::InvalidFormat)?
        .trim();

    if token.is_empty() {
        return Err(AuthRejection::MissingToken);
    }

    Ok(token)
}

/// The authenticated caller, attached to request extensions by
/// [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized(AuthRejection::MissingHeader.message()))
    }
}

/// Middleware that authenticates the request or rejects it with 401.
///
/// On success the handler observes the caller through [`AuthUser`].
pub async fn require_auth(
    State(verifier): State<Arc<dyn TokenVerifier>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(req.headers()) {
        Ok(token) => token,
        Err(rejection) => {
            debug!(reason = rejection.message(), "Rejected unauthenticated request");
            return ApiError::from(rejection).into_response();
        }
    };

    let user_id = match verifier.verify(token) {
        Ok(user_id) => user_id,
        Err(err) => {
            debug!(error = %err, "Token verification failed");
            return ApiError::from(AuthRejection::InvalidToken).into_response();
        }
    };

    trace!(user_id = %user_id, "Request authenticated");
    req.extensions_mut().insert(AuthUser { user_id });
    next.run(req).await
}
