//! Sessionize schedule import.
//!
//! This module provides two pieces:
//! - [`SessionizeClient`] fetches the public "All" view of a Sessionize
//!   event (`GET {base}/api/v2/{id}/view/All`)
//! - [`SessionizeImport`] maps that schedule onto an EventDesk event through
//!   the [`EventService`] trait, reusing rooms that already exist by name
//!
//! Sessionize timestamps usually carry no offset; those are taken as UTC.
//! Sessions that are not scheduled yet (no start, end or room) are skipped.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eventdesk_server::sessionize::{SessionizeClient, SessionizeImport};
//! use eventdesk_server::store::MemoryStore;
//!
//! let client = SessionizeClient::new("https://sessionize.com")?;
//! let importer = SessionizeImport::new(client, Arc::new(MemoryStore::new()));
//! let summary = importer.import("owner-id", "event-id", "abc123").await?;
//! println!("{} sessions imported", summary.sessions_created);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::{ServiceError, ServiceResult};
use crate::service::{EventService, NewRoom, NewSession, SessionizeImporter};
use crate::types::ImportSummary;

/// Timeout for Sessionize API requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to Sessionize.
#[derive(Debug, Error)]
pub enum SessionizeError {
    /// The request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Sessionize could not be reached.
    #[error("sessionize unavailable: {0}")]
    Unavailable(String),

    /// Sessionize answered with something we cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("client configuration error: {0}")]
    Configuration(String),

    /// The Sessionize id is not a plain alphanumeric token.
    #[error("invalid sessionize id {0:?}")]
    InvalidId(String),
}

/// Sessionize ids are numbers for rooms and categories and strings for
/// sessions; both are accepted everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn key(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    id: RawId,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    starts_at: Option<String>,
    #[serde(default)]
    ends_at: Option<String>,
    #[serde(default)]
    room_id: Option<RawId>,
    #[serde(default)]
    category_items: Vec<RawId>,
}

#[derive(Debug, Deserialize)]
struct RawRoom {
    id: RawId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawCategoryItem {
    id: RawId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    items: Vec<RawCategoryItem>,
}

#[derive(Debug, Deserialize)]
struct RawSchedule {
    #[serde(default)]
    sessions: Vec<RawSession>,
    #[serde(default)]
    rooms: Vec<RawRoom>,
    #[serde(default)]
    categories: Vec<RawCategory>,
}

/// A schedulable session from Sessionize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSession {
    pub sessionize_id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Name of the room the session is held in.
    pub room: String,
    pub tags: Vec<String>,
}

/// The parts of a Sessionize schedule EventDesk imports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Room names in Sessionize order.
    pub rooms: Vec<String>,
    pub sessions: Vec<ScheduledSession>,
}

impl Schedule {
    fn from_raw(raw: RawSchedule) -> Result<Self, SessionizeError> {
        let room_names: HashMap<String, String> = raw
            .rooms
            .iter()
            .map(|room| (room.id.key(), room.name.trim().to_string()))
            .collect();
        let tag_names: HashMap<String, String> = raw
            .categories
            .iter()
            .flat_map(|category| category.items.iter())
            .map(|item| (item.id.key(), item.name.clone()))
            .collect();

        let mut sessions = Vec::with_capacity(raw.sessions.len());
        for session in raw.sessions {
            let (Some(starts_at), Some(ends_at), Some(room_id)) =
                (session.starts_at, session.ends_at, session.room_id)
            else {
                debug!(session_id = %session.id.key(), "Skipping unscheduled session");
                continue;
            };

            let room = room_names.get(&room_id.key()).cloned().ok_or_else(|| {
                SessionizeError::InvalidResponse(format!(
                    "session {} references unknown room {}",
                    session.id.key(),
                    room_id.key()
                ))
            })?;

            sessions.push(ScheduledSession {
                sessionize_id: session.id.key(),
                title: session.title.trim().to_string(),
                description: session.description.unwrap_or_default(),
                start_time: parse_timestamp(&starts_at)?,
                end_time: parse_timestamp(&ends_at)?,
                room,
                tags: session
                    .category_items
                    .iter()
                    .filter_map(|id| tag_names.get(&id.key()).cloned())
                    .collect(),
            });
        }

        Ok(Self {
            rooms: raw.rooms.into_iter().map(|room| room.name.trim().to_string()).collect(),
            sessions,
        })
    }
}

/// Parses a Sessionize timestamp. Values without an offset are UTC.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SessionizeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| SessionizeError::InvalidResponse(format!("invalid timestamp {value:?}: {e}")))
}

/// HTTP client for the Sessionize public API.
#[derive(Debug, Clone)]
pub struct SessionizeClient {
    http_client: Client,
    base_url: String,
}

impl SessionizeClient {
    /// Creates a client for the given base URL (e.g. `https://sessionize.com`).
    ///
    /// # Errors
    ///
    /// Returns [`SessionizeError::Configuration`] if the HTTP client cannot be
    /// created.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SessionizeError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                SessionizeError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Fetches and parses the schedule of a Sessionize event.
    pub async fn fetch_schedule(&self, sessionize_id: &str) -> Result<Schedule, SessionizeError> {
        if sessionize_id.is_empty() || !sessionize_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionizeError::InvalidId(sessionize_id.to_string()));
        }
        let url = format!("{}/api/v2/{}/view/All", self.base_url, sessionize_id);

        debug!(url = %url, "Fetching Sessionize schedule");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SessionizeError::Timeout(REQUEST_TIMEOUT)
            } else if e.is_connect() {
                SessionizeError::Unavailable(format!("connection failed: {e}"))
            } else {
                SessionizeError::Unavailable(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Unexpected response from Sessionize");
            return Err(SessionizeError::InvalidResponse(format!(
                "unexpected status {status}: {body}"
            )));
        }

        let raw: RawSchedule = response.json().await.map_err(|e| {
            SessionizeError::InvalidResponse(format!("failed to parse schedule: {e}"))
        })?;

        let schedule = Schedule::from_raw(raw)?;
        debug!(
            rooms = schedule.rooms.len(),
            sessions = schedule.sessions.len(),
            "Fetched Sessionize schedule"
        );

        Ok(schedule)
    }

    #[cfg(test)]
    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Imports Sessionize schedules into events.
pub struct SessionizeImport {
    client: SessionizeClient,
    events: Arc<dyn EventService>,
}

impl SessionizeImport {
    pub fn new(client: SessionizeClient, events: Arc<dyn EventService>) -> Self {
        Self { client, events }
    }
}

#[async_trait]
impl SessionizeImporter for SessionizeImport {
    async fn import(
        &self,
        caller: &str,
        event_id: &str,
        sessionize_id: &str,
    ) -> ServiceResult<ImportSummary> {
        self.events.owned_event(caller, event_id).await?;

        let schedule = self
            .client
            .fetch_schedule(sessionize_id)
            .await
            .map_err(|e| ServiceError::internal(format!("sessionize fetch failed: {e}")))?;

        let mut room_ids: HashMap<String, String> = self
            .events
            .list_rooms(caller, event_id)
            .await?
            .into_iter()
            .map(|room| (room.name, room.id))
            .collect();

        let mut summary = ImportSummary::default();

        for name in schedule.rooms {
            if name.is_empty() || room_ids.contains_key(&name) {
                continue;
            }
            let room = self
                .events
                .create_room(
                    caller,
                    event_id,
                    NewRoom {
                        name: name.clone(),
                        capacity: 0,
                        description: String::new(),
                        how_to_get_there: String::new(),
                        not_bookable: false,
                    },
                )
                .await?;
            room_ids.insert(name, room.id);
            summary.rooms_created += 1;
        }

        for session in schedule.sessions {
            let room_id = room_ids.get(&session.room).cloned().ok_or_else(|| {
                ServiceError::internal(format!("no room named {:?} after import", session.room))
            })?;

            self.events
                .create_session(
                    caller,
                    event_id,
                    NewSession {
                        room_id,
                        title: session.title,
                        description: session.description,
                        start_time: session.start_time,
                        end_time: session.end_time,
                        tags: session.tags,
                    },
                )
                .await?;
            summary.sessions_created += 1;
        }

        info!(
            event_id = %event_id,
            sessionize_id = %sessionize_id,
            rooms_created = summary.rooms_created,
            sessions_created = summary.sessions_created,
            "Imported Sessionize schedule"
        );

        Ok(summary)
    }
}
