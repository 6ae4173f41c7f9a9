//! Attendee endpoints: registration and schedule viewing.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::envelope::ApiResponse;
use crate::error::ApiResult;
use crate::extract::{require_param, PathParams, ValidJson};
use crate::routes::AppState;
use crate::types::{EventSchedule, RegisteredEvent, Registration, RegistrationOutcome};
use crate::validation::{check_event_code, normalize_event_code, Validate};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterByCodeRequest {
    pub event_code: String,
}

impl Validate for RegisterByCodeRequest {
    fn normalize(&mut self) {
        self.event_code = normalize_event_code(&self.event_code);
    }

    fn validate(&self) -> Vec<String> {
        check_event_code(&self.event_code).err().into_iter().collect()
    }
}

/// 201 for a fresh registration, 200 when it already existed.
fn registration_response(outcome: RegistrationOutcome) -> ApiResponse<Registration> {
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    ApiResponse::with_status(status, outcome.registration)
}

/// POST /attendee/events/{event_id}/registrations
pub async fn register(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
) -> ApiResult<Registration> {
    let event_id = require_param("event_id", &event_id)?;
    let outcome = state.attendees.register(&auth.user_id, event_id).await?;
    if outcome.created {
        info!(event_id = %event_id, user_id = %auth.user_id, "Attendee registered");
    }
    Ok(registration_response(outcome))
}

/// POST /attendee/registrations
pub async fn register_by_code(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidJson(body): ValidJson<RegisterByCodeRequest>,
) -> ApiResult<Registration> {
    let outcome = state
        .attendees
        .register_by_code(&auth.user_id, &body.event_code)
        .await?;
    if outcome.created {
        info!(
            event_id = %outcome.registration.event_id,
            user_id = %auth.user_id,
            "Attendee registered by code"
        );
    }
    Ok(registration_response(outcome))
}

/// GET /attendee/events
pub async fn list_registered_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Vec<RegisteredEvent>> {
    let events = state.attendees.list_registered_events(&auth.user_id).await?;
    Ok(ApiResponse::ok(events))
}

/// GET /attendee/events/{event_id}/schedule
pub async fn event_schedule(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
) -> ApiResult<EventSchedule> {
    let event_id = require_param("event_id", &event_id)?;
    let schedule = state
        .attendees
        .event_schedule(&auth.user_id, event_id)
        .await?;
    Ok(ApiResponse::ok(schedule))
}
