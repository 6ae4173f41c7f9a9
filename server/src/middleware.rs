//! Cross-cutting HTTP middleware: CORS and request logging.
//!
//! # CORS
//!
//! [`cors`] implements an exact-origin allow-list. Preflight requests
//! (`OPTIONS`) are answered directly with `204 No Content`; the CORS
//! headers are only attached when the `Origin` is on the list. Other
//! requests pass through and, for allowed origins, get
//! `Access-Control-Allow-Origin`, `Access-Control-Allow-Credentials` and
//! `Vary: Origin` added to the response.
//!
//! # Request logging
//!
//! [`trace_layer`] builds a `tower-http` [`TraceLayer`] that opens a
//! `request` span carrying `method` and `path` and emits one
//! "request completed" record with `status` and `duration_ms` per request.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
            ORIGIN, VARY,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::Response,
};
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, DefaultOnRequest, HttpMakeClassifier, MakeSpan, OnResponse,
    TraceLayer,
};
use tracing::{info, info_span, trace, Span};

/// Methods advertised to preflight requests.
pub const ALLOWED_METHODS: &str = "GET, POST, PATCH, DELETE, OPTIONS";

/// Request headers advertised to preflight requests.
pub const ALLOWED_HEADERS: &str = "Authorization, Content-Type";

/// Preflight cache lifetime in seconds.
pub const PREFLIGHT_MAX_AGE_SECS: u32 = 600;

/// Exact-match origin allow-list.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    origins: Arc<[String]>,
}

impl CorsPolicy {
    pub fn new(origins: impl IntoIterator<Item = String>) -> Self {
        Self {
            origins: origins.into_iter().collect(),
        }
    }

    /// Returns the request's origin if it is allowed.
    fn allowed_origin<'a>(&self, headers: &'a HeaderMap) -> Option<&'a HeaderValue> {
        let origin = headers.get(ORIGIN)?;
        let origin_str = origin.to_str().ok()?;
        self.origins
            .iter()
            .any(|allowed| allowed == origin_str)
            .then_some(origin)
    }
}

fn apply_origin_headers(headers: &mut HeaderMap, origin: HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.append(VARY, HeaderValue::from_static("Origin"));
}

/// CORS middleware. Use with `axum::middleware::from_fn_with_state`.
pub async fn cors(State(policy): State<CorsPolicy>, req: Request, next: Next) -> Response {
    let origin = policy.allowed_origin(req.headers()).cloned();

    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        match origin {
            Some(origin) => {
                let headers = response.headers_mut();
                apply_origin_headers(headers, origin);
                headers.insert(
                    ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(ALLOWED_METHODS),
                );
                headers.insert(
                    ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static(ALLOWED_HEADERS),
                );
                headers.insert(
                    ACCESS_CONTROL_MAX_AGE,
                    HeaderValue::from(PREFLIGHT_MAX_AGE_SECS),
                );
            }
            None => trace!("Preflight from disallowed or missing origin"),
        }
        return response;
    }

    let mut response = next.run(req).await;
    if let Some(origin) = origin {
        apply_origin_headers(response.headers_mut(), origin);
    }
    response
}

/// Opens the per-request `request` span.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

/// Emits the "request completed" record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCompletion;

impl<B> OnResponse<B> for LogCompletion {
    fn on_response(self, response: &axum::http::Response<B>, latency: Duration, _span: &Span) {
        info!(
            status = response.status().as_u16(),
            duration_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
    }
}

/// The request logging layer type produced by [`trace_layer`].
pub type RequestTraceLayer = TraceLayer<
    HttpMakeClassifier,
    RequestSpan,
    DefaultOnRequest,
    LogCompletion,
    DefaultOnBodyChunk,
    DefaultOnEos,
    (),
>;

/// Builds the request logging layer.
///
/// Failures are not logged separately; 500s are logged by
/// [`ApiError`](crate::error::ApiError) with their detail.
pub fn trace_layer() -> RequestTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(LogCompletion)
        .on_failure(())
}
