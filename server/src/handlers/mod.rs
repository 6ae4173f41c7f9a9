//! HTTP controllers.
//!
//! - [`users`] - sign-up, login (password and passwordless) and profile
//! - [`events`] - events, rooms, sessions, team members, invitations, import
//! - [`attendee`] - registration and schedule viewing
//!
//! Every handler returns [`ApiResult`](crate::error::ApiResult), so both
//! success and failure leave through the `{data, error}` envelope.

pub mod attendee;
pub mod events;
pub mod users;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::envelope::ApiResponse;
use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

/// Response body for the health check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint. No authentication required.
pub async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    Ok(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}

/// Fallback for unknown routes and methods.
pub async fn not_found() -> ApiError {
    ApiError::not_found("route not found")
}
