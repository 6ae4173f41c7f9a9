//! Organizer endpoints: events and everything scheduled inside them.
//!
//! All routes here sit behind [`require_auth`](crate::auth::require_auth).
//! Ownership is enforced by the [`EventService`](crate::service::EventService)
//! implementation; handlers only validate input and shape responses.

use axum::extract::{rejection::QueryRejection, Query, State};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::envelope::{ApiResponse, StatusBody};
use crate::error::{ApiError, ApiResult};
use crate::extract::{require_param, PathParams, ValidJson};
use crate::routes::AppState;
use crate::service::{
    EventPatch, InvitationQuery, NewEvent, NewRoom, NewSession, RoomPatch, SessionContentPatch,
    SessionSchedulePatch,
};
use crate::types::{
    Event, EventDetails, ImportSummary, InvitationBatch, InvitationPage, Room, Session, TeamMember,
};
use crate::validation::{
    check_coordinates, check_email, email_fingerprint, normalize_email, page_params,
    parse_email_list, trim_opt, Validate,
};

fn push_if_blank(value: Option<&str>, field: &str, violations: &mut Vec<String>) {
    if value == Some("") {
        violations.push(format!("{field} must not be empty"));
    }
}

fn normalize_tags(tags: &mut Vec<String>) {
    tags.iter_mut().for_each(|tag| *tag = tag.trim().to_string());
    tags.retain(|tag| !tag.is_empty());
}

impl Validate for NewEvent {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        trim_opt(&mut self.slug);
        trim_opt(&mut self.description);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.name.is_empty() {
            violations.push("name is required".to_string());
        }
        check_coordinates(self.latitude, self.longitude, &mut violations);
        violations
    }
}

impl Validate for EventPatch {
    fn normalize(&mut self) {
        trim_opt(&mut self.name);
        trim_opt(&mut self.slug);
        trim_opt(&mut self.description);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        push_if_blank(self.name.as_deref(), "name", &mut violations);
        check_coordinates(self.latitude, self.longitude, &mut violations);
        violations
    }
}

impl Validate for NewRoom {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        self.how_to_get_there = self.how_to_get_there.trim().to_string();
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.name.is_empty() {
            violations.push("name is required".to_string());
        }
        if self.capacity < 0 {
            violations.push("capacity must not be negative".to_string());
        }
        violations
    }
}

impl Validate for RoomPatch {
    fn normalize(&mut self) {
        trim_opt(&mut self.name);
        trim_opt(&mut self.description);
        trim_opt(&mut self.how_to_get_there);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        push_if_blank(self.name.as_deref(), "name", &mut violations);
        if self.capacity.is_some_and(|c| c < 0) {
            violations.push("capacity must not be negative".to_string());
        }
        violations
    }
}

impl Validate for NewSession {
    fn normalize(&mut self) {
        self.room_id = self.room_id.trim().to_string();
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        normalize_tags(&mut self.tags);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.room_id.is_empty() {
            violations.push("room_id is required".to_string());
        }
        if self.title.is_empty() {
            violations.push("title is required".to_string());
        }
        if self.end_time < self.start_time {
            violations.push("end_time must not be before start_time".to_string());
        }
        violations
    }
}

impl Validate for SessionSchedulePatch {
    fn normalize(&mut self) {
        trim_opt(&mut self.room_id);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        push_if_blank(self.room_id.as_deref(), "room_id", &mut violations);
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end < start {
                violations.push("end_time must not be before start_time".to_string());
            }
        }
        violations
    }
}

impl Validate for SessionContentPatch {
    fn normalize(&mut self) {
        trim_opt(&mut self.title);
        trim_opt(&mut self.description);
        if let Some(tags) = self.tags.as_mut() {
            normalize_tags(tags);
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        push_if_blank(self.title.as_deref(), "title", &mut violations);
        violations
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTeamMemberRequest {
    pub email: String,
}

impl Validate for AddTeamMemberRequest {
    fn normalize(&mut self) {
        self.email = normalize_email(&self.email);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        check_email("email", &self.email, &mut violations);
        violations
    }
}

/// Free-text list of addresses, separated by commas, semicolons or
/// whitespace.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendInvitationsRequest {
    pub emails: String,
}

impl Validate for SendInvitationsRequest {
    fn validate(&self) -> Vec<String> {
        if self.emails.trim().is_empty() {
            vec!["emails is required".to_string()]
        } else {
            Vec::new()
        }
    }
}

/// Raw `?page=&page_size=&search=` values; parsed leniently.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvitationListParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub search: Option<String>,
}

impl InvitationListParams {
    fn into_query(self) -> InvitationQuery {
        let (page, page_size) = page_params(self.page.as_deref(), self.page_size.as_deref());
        InvitationQuery {
            page,
            page_size,
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

/// POST /events
pub async fn create_event(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidJson(body): ValidJson<NewEvent>,
) -> ApiResult<Event> {
    let event = state.events.create_event(&auth.user_id, body).await?;
    Ok(ApiResponse::created(event))
}

/// GET /events/me
pub async fn list_my_events(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Vec<Event>> {
    let events = state.events.list_owned_events(&auth.user_id).await?;
    Ok(ApiResponse::ok(events))
}

/// GET /events/{event_id}
pub async fn get_event(
    State(state): State<AppState>,
    _auth: AuthUser,
    PathParams(event_id): PathParams<String>,
) -> ApiResult<EventDetails> {
    let event_id = require_param("event_id", &event_id)?;
    let details = state.events.get_event_details(event_id).await?;
    Ok(ApiResponse::ok(details))
}

/// PATCH /events/{event_id}
pub async fn update_event(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
    ValidJson(patch): ValidJson<EventPatch>,
) -> ApiResult<Event> {
    let event_id = require_param("event_id", &event_id)?;
    let event = state
        .events
        .update_event(&auth.user_id, event_id, patch)
        .await?;
    Ok(ApiResponse::ok(event))
}

/// DELETE /events/{event_id}
pub async fn delete_event(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
) -> ApiResult<StatusBody> {
    let event_id = require_param("event_id", &event_id)?;
    state.events.delete_event(&auth.user_id, event_id).await?;
    Ok(ApiResponse::ok(StatusBody::deleted()))
}

/// POST /events/{event_id}/rooms
pub async fn create_room(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
    ValidJson(body): ValidJson<NewRoom>,
) -> ApiResult<Room> {
    let event_id = require_param("event_id", &event_id)?;
    let room = state
        .events
        .create_room(&auth.user_id, event_id, body)
        .await?;
    Ok(ApiResponse::created(room))
}

/// GET /events/{event_id}/rooms
pub async fn list_rooms(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
) -> ApiResult<Vec<Room>> {
    let event_id = require_param("event_id", &event_id)?;
    let rooms = state.events.list_rooms(&auth.user_id, event_id).await?;
    Ok(ApiResponse::ok(rooms))
}

/// GET /events/{event_id}/rooms/{room_id}
pub async fn get_room(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, room_id)): PathParams<(String, String)>,
) -> ApiResult<Room> {
    let event_id = require_param("event_id", &event_id)?;
    let room_id = require_param("room_id", &room_id)?;
    let room = state
        .events
        .get_room(&auth.user_id, event_id, room_id)
        .await?;
    Ok(ApiResponse::ok(room))
}

/// PATCH /events/{event_id}/rooms/{room_id}
pub async fn update_room(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, room_id)): PathParams<(String, String)>,
    ValidJson(patch): ValidJson<RoomPatch>,
) -> ApiResult<Room> {
    let event_id = require_param("event_id", &event_id)?;
    let room_id = require_param("room_id", &room_id)?;
    let room = state
        .events
        .update_room(&auth.user_id, event_id, room_id, patch)
        .await?;
    Ok(ApiResponse::ok(room))
}

/// PATCH /events/{event_id}/rooms/{room_id}/not-bookable
pub async fn toggle_room_not_bookable(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, room_id)): PathParams<(String, String)>,
) -> ApiResult<Room> {
    let event_id = require_param("event_id", &event_id)?;
    let room_id = require_param("room_id", &room_id)?;
    let room = state
        .events
        .toggle_room_not_bookable(&auth.user_id, event_id, room_id)
        .await?;
    Ok(ApiResponse::ok(room))
}

/// DELETE /events/{event_id}/rooms/{room_id}
pub async fn delete_room(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, room_id)): PathParams<(String, String)>,
) -> ApiResult<StatusBody> {
    let event_id = require_param("event_id", &event_id)?;
    let room_id = require_param("room_id", &room_id)?;
    state
        .events
        .delete_room(&auth.user_id, event_id, room_id)
        .await?;
    Ok(ApiResponse::ok(StatusBody::deleted()))
}

/// POST /events/{event_id}/sessions
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
    ValidJson(body): ValidJson<NewSession>,
) -> ApiResult<Session> {
    let event_id = require_param("event_id", &event_id)?;
    let session = state
        .events
        .create_session(&auth.user_id, event_id, body)
        .await?;
    Ok(ApiResponse::created(session))
}

/// PATCH /events/{event_id}/sessions/{session_id}
pub async fn update_session_schedule(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, session_id)): PathParams<(String, String)>,
    ValidJson(patch): ValidJson<SessionSchedulePatch>,
) -> ApiResult<Session> {
    let event_id = require_param("event_id", &event_id)?;
    let session_id = require_param("session_id", &session_id)?;
    let session = state
        .events
        .update_session_schedule(&auth.user_id, event_id, session_id, patch)
        .await?;
    Ok(ApiResponse::ok(session))
}

/// PATCH /events/{event_id}/sessions/{session_id}/content
pub async fn update_session_content(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, session_id)): PathParams<(String, String)>,
    ValidJson(patch): ValidJson<SessionContentPatch>,
) -> ApiResult<Session> {
    let event_id = require_param("event_id", &event_id)?;
    let session_id = require_param("session_id", &session_id)?;
    let session = state
        .events
        .update_session_content(&auth.user_id, event_id, session_id, patch)
        .await?;
    Ok(ApiResponse::ok(session))
}

/// DELETE /events/{event_id}/sessions/{session_id}
pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, session_id)): PathParams<(String, String)>,
) -> ApiResult<StatusBody> {
    let event_id = require_param("event_id", &event_id)?;
    let session_id = require_param("session_id", &session_id)?;
    state
        .events
        .delete_session(&auth.user_id, event_id, session_id)
        .await?;
    Ok(ApiResponse::ok(StatusBody::deleted()))
}

/// POST /events/{event_id}/import/sessionize/{sessionize_id}
///
/// Every failure, including access failures, is reported as 500.
pub async fn import_sessionize(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, sessionize_id)): PathParams<(String, String)>,
) -> ApiResult<ImportSummary> {
    let event_id = require_param("event_id", &event_id)?;
    let sessionize_id = require_param("sessionize_id", &sessionize_id)?;
    let summary = state
        .importer
        .import(&auth.user_id, event_id, sessionize_id)
        .await
        .map_err(|err| ApiError::internal(format!("sessionize import failed: {err}")))?;
    Ok(ApiResponse::ok(summary))
}

/// POST /events/{event_id}/team-members
pub async fn add_team_member(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
    ValidJson(body): ValidJson<AddTeamMemberRequest>,
) -> ApiResult<TeamMember> {
    let event_id = require_param("event_id", &event_id)?;
    state.events.owned_event(&auth.user_id, event_id).await?;

    let user = state
        .users
        .find_by_email(&body.email)
        .await?
        .ok_or_else(|| ApiError::not_found("no user with that email"))?;

    let member = state
        .events
        .add_team_member(&auth.user_id, event_id, &user.id)
        .await?;
    Ok(ApiResponse::created(member))
}

/// GET /events/{event_id}/team-members
pub async fn list_team_members(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
) -> ApiResult<Vec<TeamMember>> {
    let event_id = require_param("event_id", &event_id)?;
    let members = state
        .events
        .list_team_members(&auth.user_id, event_id)
        .await?;
    Ok(ApiResponse::ok(members))
}

/// DELETE /events/{event_id}/team-members/{user_id}
pub async fn remove_team_member(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams((event_id, user_id)): PathParams<(String, String)>,
) -> ApiResult<StatusBody> {
    let event_id = require_param("event_id", &event_id)?;
    let user_id = require_param("user_id", &user_id)?;
    state
        .events
        .remove_team_member(&auth.user_id, event_id, user_id)
        .await?;
    Ok(ApiResponse::ok(StatusBody::deleted()))
}

/// GET /events/{event_id}/invitations
pub async fn list_invitations(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
    params: Result<Query<InvitationListParams>, QueryRejection>,
) -> ApiResult<InvitationPage> {
    let event_id = require_param("event_id", &event_id)?;
    let Query(params) = params.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let page = state
        .events
        .list_invitations(&auth.user_id, event_id, params.into_query())
        .await?;
    Ok(ApiResponse::ok(page))
}

/// POST /events/{event_id}/invitations
///
/// Partial delivery failure is still a success: undeliverable addresses
/// come back in `failed` and their invitation records are dropped so they
/// can be retried. Addresses invited before are skipped silently.
pub async fn send_invitations(
    State(state): State<AppState>,
    auth: AuthUser,
    PathParams(event_id): PathParams<String>,
    ValidJson(body): ValidJson<SendInvitationsRequest>,
) -> ApiResult<InvitationBatch> {
    let event_id = require_param("event_id", &event_id)?;

    let emails = parse_email_list(&body.emails);
    if emails.is_empty() {
        return Err(ApiError::bad_request("no valid emails found"));
    }

    let event = state.events.owned_event(&auth.user_id, event_id).await?;

    let mut batch = InvitationBatch::default();
    for email in emails {
        let Some(invitation) = state
            .events
            .record_invitation(&auth.user_id, event_id, &email)
            .await?
        else {
            continue;
        };

        match state.mailer.send_invitation(&email, &event).await {
            Ok(()) => batch.sent += 1,
            Err(err) => {
                warn!(
                    event_id = %event_id,
                    address = %email_fingerprint(&email),
                    error = %err,
                    "Invitation mail failed"
                );
                if let Err(revoke_err) = state
                    .events
                    .revoke_invitation(event_id, &invitation.id)
                    .await
                {
                    warn!(error = %revoke_err, "Could not roll back invitation record");
                }
                batch.failed.push(email);
            }
        }
    }

    info!(
        event_id = %event_id,
        sent = batch.sent,
        failed = batch.failed.len(),
        "Invitations processed"
    );
    Ok(ApiResponse::ok(batch))
}
