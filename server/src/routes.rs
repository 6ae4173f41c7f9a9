//! Router assembly for the EventDesk server.
//!
//! # Architecture
//!
//! All handlers share application state through [`AppState`], which holds
//! the configuration and every collaborator behind a capability trait:
//!
//! - user, event and attendee services (one [`MemoryStore`] by default)
//! - the Sessionize importer
//! - the token verifier and issuer
//! - the login code store, its per-address request limiter and the mailer
//!
//! Public routes (`/health`, `/auth/*`) are merged with the protected
//! routes, which sit behind [`require_auth`]. The whole router is wrapped in
//! a body size limit, CORS and request logging.
//!
//! # Example
//!
//! ```rust,no_run
//! use eventdesk_server::config::Config;
//! use eventdesk_server::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config).expect("failed to build state");
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
    Router,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use crate::auth::{require_auth, AuthError, SignedTokens, TokenIssuer, TokenVerifier};
use crate::config::Config;
use crate::handlers::{self, attendee, events, users};
use crate::login_code::{LoginCodeConfig, LoginCodeStore};
use crate::mailer::{LogMailer, Mailer};
use crate::middleware::{cors, trace_layer, CorsPolicy};
use crate::rate_limit::RateLimiter;
use crate::service::{AttendeeService, EventService, SessionizeImporter, UserService};
use crate::sessionize::{SessionizeClient, SessionizeError, SessionizeImport};
use crate::store::MemoryStore;

/// Maximum accepted request body size (1 MiB).
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Errors that can occur while wiring up [`AppState`].
#[derive(Debug, Error)]
pub enum InitError {
    #[error("no token key configured and dev mode is off")]
    MissingTokenKey,

    #[error("invalid token key: {0}")]
    TokenKey(#[from] AuthError),

    #[error("sessionize client: {0}")]
    Sessionize(#[from] SessionizeError),
}

/// Shared application state for all route handlers.
///
/// Cloned per request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserService>,
    pub events: Arc<dyn EventService>,
    pub attendees: Arc<dyn AttendeeService>,
    pub importer: Arc<dyn SessionizeImporter>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub issuer: Arc<dyn TokenIssuer>,
    pub login_codes: Arc<LoginCodeStore>,
    pub code_requests: RateLimiter,
    pub mailer: Arc<dyn Mailer>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Builds the production wiring: an in-memory store, Ed25519 tokens,
    /// a logging mailer and the Sessionize importer.
    ///
    /// # Errors
    ///
    /// Fails if the token key is missing outside dev mode, the key does not
    /// decode, or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, InitError> {
        let tokens = match config.token_key.as_deref() {
            Some(key) => SignedTokens::from_base64_seed(key, config.token_ttl)?,
            None if config.dev_mode => {
                warn!("No token key configured; tokens will not survive a restart");
                SignedTokens::ephemeral(config.token_ttl)
            }
            None => return Err(InitError::MissingTokenKey),
        };
        let tokens = Arc::new(tokens);

        let store = Arc::new(MemoryStore::new());
        let client = SessionizeClient::new(config.sessionize_url.clone())?;
        let importer = SessionizeImport::new(client, store.clone());
        let login_codes = LoginCodeStore::new(LoginCodeConfig::with_ttl(config.login_code_ttl));

        Ok(Self {
            config: Arc::new(config),
            users: store.clone(),
            events: store.clone(),
            attendees: store,
            importer: Arc::new(importer),
            verifier: tokens.clone(),
            issuer: tokens,
            login_codes: Arc::new(login_codes),
            code_requests: RateLimiter::default(),
            mailer: Arc::new(LogMailer::new()),
            start_time: Instant::now(),
        })
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: Arc<dyn TokenIssuer>) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn with_code_requests(mut self, limiter: RateLimiter) -> Self {
        self.code_requests = limiter;
        self
    }

    #[must_use]
    pub fn with_importer(mut self, importer: Arc<dyn SessionizeImporter>) -> Self {
        self.importer = importer;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("login_codes", &self.login_codes)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

/// Creates the application router with all routes configured.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/signup", post(users::sign_up))
        .route("/auth/login", post(users::login))
        .route("/auth/login/request", post(users::request_login_code))
        .route("/auth/login/verify", post(users::verify_login_code));

    let protected = Router::new()
        .route(
            "/users/me",
            get(users::get_profile).patch(users::update_profile),
        )
        .route("/events", post(events::create_event))
        .route("/events/me", get(events::list_my_events))
        .route(
            "/events/{event_id}",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route(
            "/events/{event_id}/rooms",
            get(events::list_rooms).post(events::create_room),
        )
        .route(
            "/events/{event_id}/rooms/{room_id}",
            get(events::get_room)
                .patch(events::update_room)
                .delete(events::delete_room),
        )
        .route(
            "/events/{event_id}/rooms/{room_id}/not-bookable",
            patch(events::toggle_room_not_bookable),
        )
        .route("/events/{event_id}/sessions", post(events::create_session))
        .route(
            "/events/{event_id}/sessions/{session_id}",
            patch(events::update_session_schedule).delete(events::delete_session),
        )
        .route(
            "/events/{event_id}/sessions/{session_id}/content",
            patch(events::update_session_content),
        )
        .route(
            "/events/{event_id}/import/sessionize/{sessionize_id}",
            post(events::import_sessionize),
        )
        .route(
            "/events/{event_id}/team-members",
            get(events::list_team_members).post(events::add_team_member),
        )
        .route(
            "/events/{event_id}/team-members/{user_id}",
            delete(events::remove_team_member),
        )
        .route(
            "/events/{event_id}/invitations",
            get(events::list_invitations).post(events::send_invitations),
        )
        .route("/attendee/registrations", post(attendee::register_by_code))
        .route("/attendee/events", get(attendee::list_registered_events))
        .route(
            "/attendee/events/{event_id}/registrations",
            post(attendee::register),
        )
        .route(
            "/attendee/events/{event_id}/schedule",
            get(attendee::event_schedule),
        )
        .route_layer(from_fn_with_state(state.verifier.clone(), require_auth));

    let cors_policy = CorsPolicy::new(state.config.cors_origins.iter().cloned());

    public
        .merge(protected)
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(from_fn_with_state(cors_policy, cors))
        .layer(trace_layer())
        .with_state(state)
}
