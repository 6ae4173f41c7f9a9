//! Custom axum extractors that reject with enveloped errors.
//!
//! - [`ValidJson`] - strict JSON body decoding followed by [`Validate`]
//! - [`PathParams`] - path segment extraction with `bad_request` rejections

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;
use crate::validation::Validate;

/// A JSON body that decoded strictly and passed its own validation.
///
/// Target types are expected to carry `#[serde(deny_unknown_fields)]`, so an
/// undeclared field fails decoding with a message containing
/// "unknown field".
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

        let value = decode_strict::<T>(&body)?;
        Ok(Self(value))
    }
}

/// Decodes, normalizes and validates a request body.
pub fn decode_strict<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Validate,
{
    let mut value: T = serde_json::from_slice(body).map_err(|err| {
        debug!(error = %err, "Rejected request body");
        ApiError::bad_request(err.to_string())
    })?;

    value.normalize();

    let violations = value.validate();
    if !violations.is_empty() {
        debug!(violations = ?violations, "Request failed validation");
        return Err(ApiError::bad_request(violations.join("; ")));
    }

    Ok(value)
}

/// Path parameters extracted as owned strings.
#[derive(Debug, Clone)]
pub struct PathParams<T>(pub T);

impl<T, S> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                ApiError::bad_request(format!("invalid path parameter: {}", rejection.body_text()))
            })?;
        Ok(Self(value))
    }
}

/// Rejects blank path parameters.
pub fn require_param<'a>(name: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{name} is required")));
    }
    Ok(trimmed)
}
