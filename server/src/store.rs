//! In-memory persistence backend.
//!
//! [`MemoryStore`] implements [`UserService`], [`EventService`] and
//! [`AttendeeService`] over a set of `HashMap` tables guarded by a single
//! [`RwLock`]. Every operation takes the lock once, so uniqueness checks,
//! cascades and the registration upsert are atomic. No lock is held across
//! an `.await`.
//!
//! Access rules shared by all event-scoped operations:
//!
//! 1. the event must exist (`404 event not found`)
//! 2. child resources must belong to that event (`404 room not found`, ...)
//! 3. the caller must own the event (`403`)

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::password::{hash_password_blocking, verify_password_blocking};
use crate::service::{
    AttendeeService, EventPatch, EventService, InvitationQuery, NewEvent, NewRoom, NewSession,
    NewUser, ProfilePatch, RoomPatch, SessionContentPatch, SessionSchedulePatch, UserService,
};
use crate::types::{
    Event, EventDetails, EventSchedule, Invitation, InvitationPage, Pagination, RegisteredEvent,
    Registration, RegistrationOutcome, Room, RoomSchedule, Session, TeamMember, User,
};
use crate::validation::{email_fingerprint, EVENT_CODE_LENGTH};

const EVENT_CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const EVENT_CODE_ATTEMPTS: usize = 64;

const EVENT_NOT_FOUND: &str = "event not found";
const ROOM_NOT_FOUND: &str = "room not found";
const SESSION_NOT_FOUND: &str = "session not found";
const USER_NOT_FOUND: &str = "user not found";
const NOT_OWNER: &str = "only the event owner can do that";
const END_BEFORE_START: &str = "end_time must not be before start_time";

#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    password_hash: String,
}

/// A row plus its insertion sequence, used for stable newest-first ordering.
#[derive(Debug, Clone)]
struct Stamped<T> {
    seq: u64,
    value: T,
}

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    users: HashMap<String, UserRecord>,
    /// email -> user id
    user_emails: HashMap<String, String>,
    events: HashMap<String, Stamped<Event>>,
    /// event code -> event id
    event_codes: HashMap<String, String>,
    rooms: HashMap<String, Room>,
    sessions: HashMap<String, Session>,
    /// (event id, user id) -> added_at
    team_members: HashMap<(String, String), Stamped<DateTime<Utc>>>,
    /// (event id, user id) -> registration
    registrations: HashMap<(String, String), Stamped<Registration>>,
    invitations: HashMap<String, Stamped<Invitation>>,
}

impl Tables {
    fn stamp<T>(&mut self, value: T) -> Stamped<T> {
        self.next_seq += 1;
        Stamped {
            seq: self.next_seq,
            value,
        }
    }

    fn event(&self, event_id: &str) -> ServiceResult<&Event> {
        self.events
            .get(event_id)
            .map(|row| &row.value)
            .ok_or_else(|| ServiceError::not_found(EVENT_NOT_FOUND))
    }

    fn owned_event(&self, caller: &str, event_id: &str) -> ServiceResult<&Event> {
        let event = self.event(event_id)?;
        if event.owner_id != caller {
            debug!(caller = %caller, event_id = %event_id, "Caller does not own event");
            return Err(ServiceError::forbidden(NOT_OWNER));
        }
        Ok(event)
    }

    fn room_in_event(&self, event_id: &str, room_id: &str) -> ServiceResult<&Room> {
        self.rooms
            .get(room_id)
            .filter(|room| room.event_id == event_id)
            .ok_or_else(|| ServiceError::not_found(ROOM_NOT_FOUND))
    }

    /// Room lookup for owner-only operations; absence wins over ownership.
    fn owned_room(&self, caller: &str, event_id: &str, room_id: &str) -> ServiceResult<&Room> {
        self.event(event_id)?;
        let room = self.room_in_event(event_id, room_id)?;
        self.owned_event(caller, event_id)?;
        Ok(room)
    }

    fn owned_session(
        &self,
        caller: &str,
        event_id: &str,
        session_id: &str,
    ) -> ServiceResult<&Session> {
        self.event(event_id)?;
        let session = self.session_in_event(event_id, session_id)?;
        self.owned_event(caller, event_id)?;
        Ok(session)
    }

    fn session_in_event(&self, event_id: &str, session_id: &str) -> ServiceResult<&Session> {
        self.sessions
            .get(session_id)
            .filter(|session| {
                self.rooms
                    .get(&session.room_id)
                    .is_some_and(|room| room.event_id == event_id)
            })
            .ok_or_else(|| ServiceError::not_found(SESSION_NOT_FOUND))
    }

    fn user(&self, user_id: &str) -> ServiceResult<&User> {
        self.users
            .get(user_id)
            .map(|record| &record.user)
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))
    }

    /// Rooms of an event sorted by name.
    fn rooms_of(&self, event_id: &str) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .rooms
            .values()
            .filter(|room| room.event_id == event_id)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rooms
    }

    /// Sessions held in `room_id` sorted by start time.
    fn sessions_in_room(&self, room_id: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .values()
            .filter(|session| session.room_id == room_id)
            .cloned()
            .collect();
        sort_sessions(&mut sessions);
        sessions
    }

    fn team_member(&self, event_id: &str, user_id: &str, added_at: DateTime<Utc>) -> TeamMember {
        let (email, name) = self
            .users
            .get(user_id)
            .map(|record| (record.user.email.clone(), record.user.name.clone()))
            .unwrap_or_default();
        TeamMember {
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            email,
            name,
            added_at,
        }
    }

    fn unique_event_code(&self) -> ServiceResult<String> {
        let mut rng = rand::rng();
        for _ in 0..EVENT_CODE_ATTEMPTS {
            let code: String = (0..EVENT_CODE_LENGTH)
                .map(|_| {
                    char::from(EVENT_CODE_ALPHABET[rng.random_range(0..EVENT_CODE_ALPHABET.len())])
                })
                .collect();
            if !self.event_codes.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(ServiceError::internal("could not allocate a unique event code"))
    }

    fn register(&mut self, user_id: &str, event_id: &str) -> RegistrationOutcome {
        let key = (event_id.to_string(), user_id.to_string());
        if let Some(existing) = self.registrations.get(&key) {
            return RegistrationOutcome {
                registration: existing.value.clone(),
                created: false,
            };
        }

        let registration = Registration {
            id: new_id(),
            event_id: event_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        let row = self.stamp(registration.clone());
        self.registrations.insert(key, row);

        info!(user_id = %user_id, event_id = %event_id, "Registered attendee");

        RegistrationOutcome {
            registration,
            created: true,
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn sort_sessions(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn check_times(start: DateTime<Utc>, end: DateTime<Utc>) -> ServiceResult<()> {
    if end < start {
        return Err(ServiceError::validation(END_BEFORE_START));
    }
    Ok(())
}

/// Process-local implementation of the persistence traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> ServiceResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| ServiceError::internal("store lock poisoned"))
    }

    fn write(&self) -> ServiceResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| ServiceError::internal("store lock poisoned"))
    }
}

#[async_trait]
impl UserService for MemoryStore {
    async fn sign_up(&self, new_user: NewUser) -> ServiceResult<User> {
        let password_hash = hash_password_blocking(new_user.password).await?;
        let mut tables = self.write()?;

        if tables.user_emails.contains_key(&new_user.email) {
            return Err(ServiceError::conflict("email already registered"));
        }

        let now = Utc::now();
        let user = User {
            id: new_id(),
            email: new_user.email,
            name: new_user.name,
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };

        tables
            .user_emails
            .insert(user.email.clone(), user.id.clone());
        tables.users.insert(
            user.id.clone(),
            UserRecord {
                user: user.clone(),
                password_hash,
            },
        );

        info!(user_id = %user.id, role = user.role.as_str(), "Created user");
        Ok(user)
    }

    async fn authenticate(&self, email: &str, password: &str) -> ServiceResult<User> {
        let record = {
            let tables = self.read()?;
            tables
                .user_emails
                .get(email)
                .and_then(|id| tables.users.get(id))
                .cloned()
        };

        let Some(record) = record else {
            return Err(ServiceError::unauthenticated("invalid email or password"));
        };
        if verify_password_blocking(password.to_string(), record.password_hash).await? {
            Ok(record.user)
        } else {
            Err(ServiceError::unauthenticated("invalid email or password"))
        }
    }

    async fn get_user(&self, user_id: &str) -> ServiceResult<User> {
        self.read()?.user(user_id).cloned()
    }

    async fn find_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let tables = self.read()?;
        Ok(tables
            .user_emails
            .get(email)
            .and_then(|id| tables.users.get(id))
            .map(|record| record.user.clone()))
    }

    async fn update_profile(&self, user_id: &str, patch: ProfilePatch) -> ServiceResult<User> {
        let mut tables = self.write()?;
        let tables = &mut *tables;

        let current_email = tables.user(user_id)?.email.clone();

        if let Some(email) = patch.email.as_ref().filter(|e| **e != current_email) {
            if tables.user_emails.contains_key(email) {
                return Err(ServiceError::conflict("email already in use"));
            }
            tables.user_emails.remove(&current_email);
            tables
                .user_emails
                .insert(email.clone(), user_id.to_string());
        }

        let record = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| ServiceError::not_found(USER_NOT_FOUND))?;
        if let Some(name) = patch.name {
            record.user.name = name;
        }
        if let Some(email) = patch.email {
            record.user.email = email;
        }
        record.user.updated_at = Utc::now();

        debug!(user_id = %user_id, "Updated profile");
        Ok(record.user.clone())
    }
}

#[async_trait]
impl EventService for MemoryStore {
    async fn create_event(&self, owner_id: &str, new_event: NewEvent) -> ServiceResult<Event> {
        let mut tables = self.write()?;
        let event_code = tables.unique_event_code()?;

        let now = Utc::now();
        let event = Event {
            id: new_id(),
            name: new_event.name,
            slug: new_event.slug,
            description: new_event.description,
            date: new_event.date,
            latitude: new_event.latitude,
            longitude: new_event.longitude,
            owner_id: owner_id.to_string(),
            event_code,
            created_at: now,
            updated_at: now,
        };

        tables
            .event_codes
            .insert(event.event_code.clone(), event.id.clone());
        let row = tables.stamp(event.clone());
        tables.events.insert(event.id.clone(), row);

        info!(event_id = %event.id, owner_id = %owner_id, "Created event");
        Ok(event)
    }

    async fn get_event_details(&self, event_id: &str) -> ServiceResult<EventDetails> {
        let tables = self.read()?;
        let event = tables.event(event_id)?.clone();
        let rooms = tables.rooms_of(event_id);
        let mut sessions: Vec<Session> = rooms
            .iter()
            .flat_map(|room| tables.sessions_in_room(&room.id))
            .collect();
        sort_sessions(&mut sessions);

        Ok(EventDetails {
            event,
            rooms,
            sessions,
        })
    }

    async fn owned_event(&self, caller: &str, event_id: &str) -> ServiceResult<Event> {
        self.read()?.owned_event(caller, event_id).cloned()
    }

    async fn update_event(
        &self,
        caller: &str,
        event_id: &str,
        patch: EventPatch,
    ) -> ServiceResult<Event> {
        let mut tables = self.write()?;
        tables.owned_event(caller, event_id)?;

        let row = tables
            .events
            .get_mut(event_id)
            .ok_or_else(|| ServiceError::not_found(EVENT_NOT_FOUND))?;
        let event = &mut row.value;
        if let Some(name) = patch.name {
            event.name = name;
        }
        if let Some(slug) = patch.slug {
            event.slug = Some(slug);
        }
        if let Some(description) = patch.description {
            event.description = Some(description);
        }
        if let Some(date) = patch.date {
            event.date = Some(date);
        }
        if let Some(latitude) = patch.latitude {
            event.latitude = Some(latitude);
        }
        if let Some(longitude) = patch.longitude {
            event.longitude = Some(longitude);
        }
        event.updated_at = Utc::now();

        debug!(event_id = %event_id, "Updated event");
        Ok(event.clone())
    }

    async fn delete_event(&self, caller: &str, event_id: &str) -> ServiceResult<()> {
        let mut tables = self.write()?;
        let event_code = tables.owned_event(caller, event_id)?.event_code.clone();

        let room_ids: Vec<String> = tables
            .rooms
            .values()
            .filter(|room| room.event_id == event_id)
            .map(|room| room.id.clone())
            .collect();

        tables
            .sessions
            .retain(|_, session| !room_ids.contains(&session.room_id));
        tables.rooms.retain(|_, room| room.event_id != event_id);
        tables.team_members.retain(|(eid, _), _| eid != event_id);
        tables.registrations.retain(|(eid, _), _| eid != event_id);
        tables
            .invitations
            .retain(|_, row| row.value.event_id != event_id);
        tables.event_codes.remove(&event_code);
        tables.events.remove(event_id);

        info!(event_id = %event_id, rooms_removed = room_ids.len(), "Deleted event");
        Ok(())
    }

    async fn list_owned_events(&self, owner_id: &str) -> ServiceResult<Vec<Event>> {
        let tables = self.read()?;
        let mut rows: Vec<&Stamped<Event>> = tables
            .events
            .values()
            .filter(|row| row.value.owner_id == owner_id)
            .collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(rows.into_iter().map(|row| row.value.clone()).collect())
    }

    async fn create_room(
        &self,
        caller: &str,
        event_id: &str,
        new_room: NewRoom,
    ) -> ServiceResult<Room> {
        let mut tables = self.write()?;
        tables.owned_event(caller, event_id)?;

        let now = Utc::now();
        let room = Room {
            id: new_id(),
            event_id: event_id.to_string(),
            name: new_room.name,
            capacity: new_room.capacity,
            description: new_room.description,
            how_to_get_there: new_room.how_to_get_there,
            not_bookable: new_room.not_bookable,
            created_at: now,
            updated_at: now,
        };
        tables.rooms.insert(room.id.clone(), room.clone());

        debug!(event_id = %event_id, room_id = %room.id, "Created room");
        Ok(room)
    }

    async fn list_rooms(&self, caller: &str, event_id: &str) -> ServiceResult<Vec<Room>> {
        let tables = self.read()?;
        tables.owned_event(caller, event_id)?;
        Ok(tables.rooms_of(event_id))
    }

    async fn get_room(&self, caller: &str, event_id: &str, room_id: &str) -> ServiceResult<Room> {
        let tables = self.read()?;
        tables.owned_room(caller, event_id, room_id).cloned()
    }

    async fn update_room(
        &self,
        caller: &str,
        event_id: &str,
        room_id: &str,
        patch: RoomPatch,
    ) -> ServiceResult<Room> {
        let mut tables = self.write()?;
        tables.owned_room(caller, event_id, room_id)?;

        let room = tables
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| ServiceError::not_found(ROOM_NOT_FOUND))?;
        if let Some(name) = patch.name {
            room.name = name;
        }
        if let Some(capacity) = patch.capacity {
            room.capacity = capacity;
        }
        if let Some(description) = patch.description {
            room.description = description;
        }
        if let Some(how_to_get_there) = patch.how_to_get_there {
            room.how_to_get_there = how_to_get_there;
        }
        if let Some(not_bookable) = patch.not_bookable {
            room.not_bookable = not_bookable;
        }
        room.updated_at = Utc::now();

        Ok(room.clone())
    }

    async fn toggle_room_not_bookable(
        &self,
        caller: &str,
        event_id: &str,
        room_id: &str,
    ) -> ServiceResult<Room> {
        let mut tables = self.write()?;
        tables.owned_room(caller, event_id, room_id)?;

        let room = tables
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| ServiceError::not_found(ROOM_NOT_FOUND))?;
        room.not_bookable = !room.not_bookable;
        room.updated_at = Utc::now();

        debug!(room_id = %room_id, not_bookable = room.not_bookable, "Toggled room");
        Ok(room.clone())
    }

    async fn delete_room(&self, caller: &str, event_id: &str, room_id: &str) -> ServiceResult<()> {
        let mut tables = self.write()?;
        tables.owned_room(caller, event_id, room_id)?;

        tables.sessions.retain(|_, session| session.room_id != room_id);
        tables.rooms.remove(room_id);

        debug!(event_id = %event_id, room_id = %room_id, "Deleted room");
        Ok(())
    }

    async fn create_session(
        &self,
        caller: &str,
        event_id: &str,
        new_session: NewSession,
    ) -> ServiceResult<Session> {
        let mut tables = self.write()?;
        tables.owned_room(caller, event_id, &new_session.room_id)?;
        check_times(new_session.start_time, new_session.end_time)?;

        let now = Utc::now();
        let session = Session {
            id: new_id(),
            room_id: new_session.room_id,
            title: new_session.title,
            description: new_session.description,
            start_time: new_session.start_time,
            end_time: new_session.end_time,
            tags: new_session.tags,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.insert(session.id.clone(), session.clone());

        debug!(event_id = %event_id, session_id = %session.id, "Created session");
        Ok(session)
    }

    async fn update_session_schedule(
        &self,
        caller: &str,
        event_id: &str,
        session_id: &str,
        patch: SessionSchedulePatch,
    ) -> ServiceResult<Session> {
        let mut tables = self.write()?;
        let current = tables.owned_session(caller, event_id, session_id)?.clone();

        if let Some(room_id) = patch.room_id.as_deref() {
            tables.room_in_event(event_id, room_id)?;
        }
        let start_time = patch.start_time.unwrap_or(current.start_time);
        let end_time = patch.end_time.unwrap_or(current.end_time);
        check_times(start_time, end_time)?;

        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ServiceError::not_found(SESSION_NOT_FOUND))?;
        if let Some(room_id) = patch.room_id {
            session.room_id = room_id;
        }
        session.start_time = start_time;
        session.end_time = end_time;
        session.updated_at = Utc::now();

        Ok(session.clone())
    }

    async fn update_session_content(
        &self,
        caller: &str,
        event_id: &str,
        session_id: &str,
        patch: SessionContentPatch,
    ) -> ServiceResult<Session> {
        let mut tables = self.write()?;
        tables.owned_session(caller, event_id, session_id)?;

        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ServiceError::not_found(SESSION_NOT_FOUND))?;
        if let Some(title) = patch.title {
            session.title = title;
        }
        if let Some(description) = patch.description {
            session.description = description;
        }
        if let Some(tags) = patch.tags {
            session.tags = tags;
        }
        session.updated_at = Utc::now();

        Ok(session.clone())
    }

    async fn delete_session(
        &self,
        caller: &str,
        event_id: &str,
        session_id: &str,
    ) -> ServiceResult<()> {
        let mut tables = self.write()?;
        tables.owned_session(caller, event_id, session_id)?;
        tables.sessions.remove(session_id);
        Ok(())
    }

    async fn add_team_member(
        &self,
        caller: &str,
        event_id: &str,
        user_id: &str,
    ) -> ServiceResult<TeamMember> {
        let mut tables = self.write()?;
        let owner_id = tables.owned_event(caller, event_id)?.owner_id.clone();
        tables.user(user_id)?;

        if owner_id == user_id {
            return Err(ServiceError::conflict("user is already the event owner"));
        }

        let key = (event_id.to_string(), user_id.to_string());
        if tables.team_members.contains_key(&key) {
            return Err(ServiceError::conflict("user is already a team member"));
        }

        let added_at = Utc::now();
        let row = tables.stamp(added_at);
        tables.team_members.insert(key, row);

        info!(event_id = %event_id, user_id = %user_id, "Added team member");
        Ok(tables.team_member(event_id, user_id, added_at))
    }

    async fn list_team_members(
        &self,
        caller: &str,
        event_id: &str,
    ) -> ServiceResult<Vec<TeamMember>> {
        let tables = self.read()?;
        tables.owned_event(caller, event_id)?;

        let mut rows: Vec<(&String, &Stamped<DateTime<Utc>>)> = tables
            .team_members
            .iter()
            .filter(|((eid, _), _)| eid == event_id)
            .map(|((_, uid), row)| (uid, row))
            .collect();
        rows.sort_by_key(|(_, row)| row.seq);

        Ok(rows
            .into_iter()
            .map(|(uid, row)| tables.team_member(event_id, uid, row.value))
            .collect())
    }

    async fn remove_team_member(
        &self,
        caller: &str,
        event_id: &str,
        user_id: &str,
    ) -> ServiceResult<()> {
        let mut tables = self.write()?;
        tables.event(event_id)?;

        let key = (event_id.to_string(), user_id.to_string());
        if !tables.team_members.contains_key(&key) {
            return Err(ServiceError::not_found("user is not a team member"));
        }
        tables.owned_event(caller, event_id)?;
        tables.team_members.remove(&key);

        info!(event_id = %event_id, user_id = %user_id, "Removed team member");
        Ok(())
    }

    async fn list_invitations(
        &self,
        caller: &str,
        event_id: &str,
        query: InvitationQuery,
    ) -> ServiceResult<InvitationPage> {
        let tables = self.read()?;
        tables.owned_event(caller, event_id)?;

        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<&Stamped<Invitation>> = tables
            .invitations
            .values()
            .filter(|row| row.value.event_id == event_id)
            .filter(|row| {
                needle
                    .as_deref()
                    .is_none_or(|n| row.value.email.to_lowercase().contains(n))
            })
            .collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));

        let pagination = Pagination::new(query.page, query.page_size, rows.len() as u64);
        let items = rows
            .into_iter()
            .skip(pagination.offset())
            .take(query.page_size as usize)
            .map(|row| row.value.clone())
            .collect();

        Ok(InvitationPage { items, pagination })
    }

    async fn record_invitation(
        &self,
        caller: &str,
        event_id: &str,
        email: &str,
    ) -> ServiceResult<Option<Invitation>> {
        let mut tables = self.write()?;
        tables.owned_event(caller, event_id)?;

        let already_invited = tables
            .invitations
            .values()
            .any(|row| row.value.event_id == event_id && row.value.email == email);
        if already_invited {
            debug!(
                event_id = %event_id,
                address = %email_fingerprint(email),
                "Skipping already invited address"
            );
            return Ok(None);
        }

        let invitation = Invitation {
            id: new_id(),
            event_id: event_id.to_string(),
            email: email.to_string(),
            sent_at: Utc::now(),
        };
        let row = tables.stamp(invitation.clone());
        tables.invitations.insert(invitation.id.clone(), row);

        Ok(Some(invitation))
    }

    async fn revoke_invitation(&self, event_id: &str, invitation_id: &str) -> ServiceResult<()> {
        let mut tables = self.write()?;
        match tables.invitations.get(invitation_id) {
            Some(row) if row.value.event_id == event_id => {
                tables.invitations.remove(invitation_id);
                Ok(())
            }
            _ => Err(ServiceError::not_found("invitation not found")),
        }
    }
}

#[async_trait]
impl AttendeeService for MemoryStore {
    async fn register(&self, user_id: &str, event_id: &str) -> ServiceResult<RegistrationOutcome> {
        let mut tables = self.write()?;
        tables.event(event_id)?;
        Ok(tables.register(user_id, event_id))
    }

    async fn register_by_code(
        &self,
        user_id: &str,
        event_code: &str,
    ) -> ServiceResult<RegistrationOutcome> {
        let mut tables = self.write()?;
        let event_id = tables
            .event_codes
            .get(event_code)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(EVENT_NOT_FOUND))?;
        Ok(tables.register(user_id, &event_id))
    }

    async fn list_registered_events(&self, user_id: &str) -> ServiceResult<Vec<RegisteredEvent>> {
        let tables = self.read()?;
        let mut rows: Vec<&Stamped<Registration>> = tables
            .registrations
            .iter()
            .filter(|((_, uid), _)| uid == user_id)
            .map(|(_, row)| row)
            .collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                tables.events.get(&row.value.event_id).map(|event| RegisteredEvent {
                    event: event.value.clone(),
                    registration: row.value.clone(),
                })
            })
            .collect())
    }

    async fn event_schedule(&self, user_id: &str, event_id: &str) -> ServiceResult<EventSchedule> {
        let tables = self.read()?;
        let event = tables.event(event_id)?;

        let is_owner = event.owner_id == user_id;
        let is_registered = tables
            .registrations
            .contains_key(&(event_id.to_string(), user_id.to_string()));
        if !is_owner && !is_registered {
            return Err(ServiceError::forbidden(
                "you must be registered for this event to view its schedule",
            ));
        }

        let rooms = tables
            .rooms_of(event_id)
            .into_iter()
            .filter(|room| !room.not_bookable)
            .map(|room| {
                let sessions = tables.sessions_in_room(&room.id);
                RoomSchedule { room, sessions }
            })
            .collect();

        Ok(EventSchedule {
            event: event.clone(),
            rooms,
        })
    }
}
