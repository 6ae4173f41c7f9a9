//! Capability traits for the collaborators behind the controllers.
//!
//! Controllers only ever see these traits, held as `Arc<dyn Trait>` in
//! [`AppState`](crate::routes::AppState). The shipped implementations are
//! [`MemoryStore`](crate::store::MemoryStore) for the three persistence
//! traits and [`SessionizeImport`](crate::sessionize::SessionizeImport) for
//! [`SessionizeImporter`].
//!
//! Implementations must check existence before ownership, so a missing
//! resource is always [`ServiceError::NotFound`](crate::error::ServiceError)
//! even for callers who would not be allowed to touch it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ServiceResult;
use crate::types::{
    Event, EventDetails, EventSchedule, ImportSummary, Invitation, InvitationPage,
    RegisteredEvent, RegistrationOutcome, Role, Room, Session, TeamMember, User,
};

/// A validated sign-up request. The password is still in clear text; the
/// store is responsible for hashing it.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

/// Profile fields a user may change about themself.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewEvent {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Partial event update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewRoom {
    pub name: String,
    #[serde(default)]
    pub capacity: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub how_to_get_there: String,
    #[serde(default)]
    pub not_bookable: bool,
}

/// Partial room update. An absent `not_bookable` is not the same as `false`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capacity: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub how_to_get_there: Option<String>,
    #[serde(default)]
    pub not_bookable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSession {
    pub room_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Moves a session in time or space.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSchedulePatch {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Edits what a session is about.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionContentPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Invitation listing parameters, already defaulted and clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
}

/// User accounts and credentials.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Creates an account. A taken email is [`ServiceError::Conflict`].
    ///
    /// [`ServiceError::Conflict`]: crate::error::ServiceError::Conflict
    async fn sign_up(&self, user: NewUser) -> ServiceResult<User>;

    /// Checks an email/password pair. Unknown email and wrong password are
    /// indistinguishable.
    async fn authenticate(&self, email: &str, password: &str) -> ServiceResult<User>;

    async fn get_user(&self, user_id: &str) -> ServiceResult<User>;

    async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>>;

    async fn update_profile(&self, user_id: &str, patch: ProfilePatch) -> ServiceResult<User>;
}

/// Events and everything hanging off them. Every mutating method takes the
/// caller and enforces ownership.
#[async_trait]
pub trait EventService: Send + Sync {
    async fn create_event(&self, owner_id: &str, event: NewEvent) -> ServiceResult<Event>;

    /// Any authenticated user may read an event.
    async fn get_event_details(&self, event_id: &str) -> ServiceResult<EventDetails>;

    /// Returns the event if `caller` owns it.
    async fn owned_event(&self, caller: &str, event_id: &str) -> ServiceResult<Event>;

    async fn update_event(
        &self,
        caller: &str,
        event_id: &str,
        patch: EventPatch,
    ) -> ServiceResult<Event>;

    /// Deletes the event with its rooms, sessions, members, registrations
    /// and invitations.
    async fn delete_event(&self, caller: &str, event_id: &str) -> ServiceResult<()>;

    /// Events owned by `owner_id`, newest first.
    async fn list_owned_events(&self, owner_id: &str) -> ServiceResult<Vec<Event>>;

    async fn create_room(&self, caller: &str, event_id: &str, room: NewRoom)
        -> ServiceResult<Room>;

    /// Rooms of the event sorted by name.
    async fn list_rooms(&self, caller: &str, event_id: &str) -> ServiceResult<Vec<Room>>;

    async fn get_room(&self, caller: &str, event_id: &str, room_id: &str) -> ServiceResult<Room>;

    async fn update_room(
        &self,
        caller: &str,
        event_id: &str,
        room_id: &str,
        patch: RoomPatch,
    ) -> ServiceResult<Room>;

    /// Flips `not_bookable` in one step and returns the updated room.
    async fn toggle_room_not_bookable(
        &self,
        caller: &str,
        event_id: &str,
        room_id: &str,
    ) -> ServiceResult<Room>;

    /// Deletes the room and its sessions.
    async fn delete_room(&self, caller: &str, event_id: &str, room_id: &str) -> ServiceResult<()>;

    async fn create_session(
        &self,
        caller: &str,
        event_id: &str,
        session: NewSession,
    ) -> ServiceResult<Session>;

    async fn update_session_schedule(
        &self,
        caller: &str,
        event_id: &str,
        session_id: &str,
        patch: SessionSchedulePatch,
    ) -> ServiceResult<Session>;

    async fn update_session_content(
        &self,
        caller: &str,
        event_id: &str,
        session_id: &str,
        patch: SessionContentPatch,
    ) -> ServiceResult<Session>;

    async fn delete_session(
        &self,
        caller: &str,
        event_id: &str,
        session_id: &str,
    ) -> ServiceResult<()>;

    /// Adds `user_id` to the team. Existing members and the owner are
    /// conflicts.
    async fn add_team_member(
        &self,
        caller: &str,
        event_id: &str,
        user_id: &str,
    ) -> ServiceResult<TeamMember>;

    async fn list_team_members(&self, caller: &str, event_id: &str)
        -> ServiceResult<Vec<TeamMember>>;

    async fn remove_team_member(
        &self,
        caller: &str,
        event_id: &str,
        user_id: &str,
    ) -> ServiceResult<()>;

    /// Invitations newest first, filtered and paged.
    async fn list_invitations(
        &self,
        caller: &str,
        event_id: &str,
        query: InvitationQuery,
    ) -> ServiceResult<InvitationPage>;

    /// Records an invitation. Returns `None` when `email` was already
    /// invited to the event.
    async fn record_invitation(
        &self,
        caller: &str,
        event_id: &str,
        email: &str,
    ) -> ServiceResult<Option<Invitation>>;

    /// Removes an invitation record whose mail could not be delivered.
    async fn revoke_invitation(&self, event_id: &str, invitation_id: &str) -> ServiceResult<()>;
}

/// Attendee-side operations.
#[async_trait]
pub trait AttendeeService: Send + Sync {
    /// Registers the user, or returns the existing registration with
    /// `created == false`.
    async fn register(&self, user_id: &str, event_id: &str) -> ServiceResult<RegistrationOutcome>;

    async fn register_by_code(
        &self,
        user_id: &str,
        event_code: &str,
    ) -> ServiceResult<RegistrationOutcome>;

    /// Newest registration first.
    async fn list_registered_events(&self, user_id: &str) -> ServiceResult<Vec<RegisteredEvent>>;

    /// Bookable rooms with their sessions. Owner or registered attendee only.
    async fn event_schedule(&self, user_id: &str, event_id: &str) -> ServiceResult<EventSchedule>;
}

/// Pulls a schedule from Sessionize into an event.
#[async_trait]
pub trait SessionizeImporter: Send + Sync {
    async fn import(
        &self,
        caller: &str,
        event_id: &str,
        sessionize_id: &str,
    ) -> ServiceResult<ImportSummary>;
}
