//! Domain types exchanged between the HTTP layer and the service layer.
//!
//! These are plain data transfer objects. Persistence concerns (password
//! hashes, indexes, uniqueness) live behind the service traits in
//! [`crate::service`]; nothing here is ever serialized with secrets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Organizer with access to event management.
    Admin,
    /// Regular attendee.
    Attendee,
}

impl Role {
    /// Returns the wire representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Attendee => "attendee",
        }
    }

    /// Parses an already-normalized role string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "attendee" => Some(Self::Attendee),
            _ => None,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Attendee
    }
}

/// A registered user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A conference or meetup owned by a single organizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub owner_id: String,
    /// Four character `[a-z0-9]` code attendees use to self-register.
    pub event_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A physical or virtual room belonging to exactly one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub capacity: i32,
    pub description: String,
    pub how_to_get_there: String,
    /// Rooms flagged as not bookable are hidden from attendee schedules.
    pub not_bookable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A scheduled talk or workshop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub room_id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user granted management rights over an event, enriched with the
/// member's contact details for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub event_id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub added_at: DateTime<Utc>,
}

/// An attendee's registration for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Record of an emailed invitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub event_id: String,
    pub email: String,
    pub sent_at: DateTime<Utc>,
}

/// Full organizer view of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub event: Event,
    pub rooms: Vec<Room>,
    pub sessions: Vec<Session>,
}

/// A bookable room together with its sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSchedule {
    #[serde(flatten)]
    pub room: Room,
    pub sessions: Vec<Session>,
}

/// Attendee-facing projection of an event: bookable rooms only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSchedule {
    pub event: Event,
    pub rooms: Vec<RoomSchedule>,
}

/// An event the caller is registered for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredEvent {
    pub event: Event,
    pub registration: Registration,
}

/// Outcome of a registration attempt.
///
/// `created` is false when the registration already existed.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub registration: Registration,
    pub created: bool,
}

/// Paging metadata returned with list pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Builds pagination metadata, computing `total_pages` by ceiling division.
    ///
    /// # Example
    ///
    /// ```rust
    /// use eventdesk_server::types::Pagination;
    ///
    /// assert_eq!(Pagination::new(2, 5, 10).total_pages, 2);
    /// assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
    /// ```
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(page_size))
        };
        Self {
            page,
            page_size,
            total,
            total_pages,
        }
    }

    /// Number of items to skip for the current page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }
}

/// A page of invitations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationPage {
    pub items: Vec<Invitation>,
    pub pagination: Pagination,
}

/// Result of sending a batch of invitations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationBatch {
    pub sent: usize,
    pub failed: Vec<String>,
}

/// Summary of a Sessionize import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub rooms_created: usize,
    pub sessions_created: usize,
}
