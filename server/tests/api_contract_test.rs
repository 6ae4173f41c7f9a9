//! HTTP contract tests driven through the full router.
//!
//! Requests go through `create_router` with `tower::ServiceExt::oneshot`, so
//! middleware (auth, CORS, body limits) runs exactly as in production.
//! Bearer tokens are resolved by [`TokenIsUserId`], which treats the token
//! itself as the caller's user id.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use eventdesk_server::auth::{AuthError, TokenIssuer, TokenVerifier};
use eventdesk_server::config::Config;
use eventdesk_server::error::{ServiceError, ServiceResult};
use eventdesk_server::mailer::{MailError, Mailer};
use eventdesk_server::routes::{create_router, AppState};
use eventdesk_server::service::SessionizeImporter;
use eventdesk_server::types::{Event, ImportSummary};

// ============================================================================
// Test Doubles
// ============================================================================

/// Verifier that accepts any token and returns it as the user id.
struct TokenIsUserId;

impl TokenVerifier for TokenIsUserId {
    fn verify(&self, token: &str) -> Result<String, AuthError> {
        Ok(token.to_string())
    }
}

/// Verifier that always returns the same user.
struct FixedUser(&'static str);

impl TokenVerifier for FixedUser {
    fn verify(&self, _token: &str) -> Result<String, AuthError> {
        Ok(self.0.to_string())
    }
}

/// Issuer whose key is unusable.
struct BrokenIssuer;

impl TokenIssuer for BrokenIssuer {
    fn issue(&self, _user_id: &str) -> Result<String, AuthError> {
        Err(AuthError::InvalidKey("key unavailable".to_string()))
    }
}

/// Mailer that fails for chosen recipients and records the rest.
#[derive(Default)]
struct SelectiveMailer {
    reject: Vec<String>,
    delivered: Mutex<Vec<String>>,
}

impl SelectiveMailer {
    fn rejecting(addresses: &[&str]) -> Self {
        Self {
            reject: addresses.iter().map(|a| a.to_string()).collect(),
            delivered: Mutex::new(Vec::new()),
        }
    }

    fn check(&self, to: &str) -> Result<(), MailError> {
        if self.reject.iter().any(|r| r == to) {
            return Err(MailError::Delivery("mailbox unavailable".to_string()));
        }
        self.delivered.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

#[async_trait]
impl Mailer for SelectiveMailer {
    async fn send_login_code(&self, to: &str, _code: &str, _ttl: Duration) -> Result<(), MailError> {
        self.check(to)
    }

    async fn send_invitation(&self, to: &str, _event: &Event) -> Result<(), MailError> {
        self.check(to)
    }
}

/// Mailer that keeps every login code it is asked to send.
#[derive(Default)]
struct CodeInbox {
    codes: Mutex<Vec<(String, String)>>,
}

impl CodeInbox {
    fn codes_for(&self, to: &str) -> Vec<String> {
        self.codes
            .lock()
            .unwrap()
            .iter()
            .filter(|(address, _)| address == to)
            .map(|(_, code)| code.clone())
            .collect()
    }

    fn latest_for(&self, to: &str) -> String {
        self.codes_for(to).pop().unwrap()
    }
}

#[async_trait]
impl Mailer for CodeInbox {
    async fn send_login_code(&self, to: &str, code: &str, _ttl: Duration) -> Result<(), MailError> {
        self.codes
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string()));
        Ok(())
    }

    async fn send_invitation(&self, _to: &str, _event: &Event) -> Result<(), MailError> {
        Ok(())
    }
}

/// Importer whose upstream is always down.
struct UnreachableImporter;

#[async_trait]
impl SessionizeImporter for UnreachableImporter {
    async fn import(
        &self,
        _caller: &str,
        _event_id: &str,
        _sessionize_id: &str,
    ) -> ServiceResult<ImportSummary> {
        Err(ServiceError::internal("connection refused by sessionize.com"))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_state() -> AppState {
    AppState::new(Config::default())
        .unwrap()
        .with_verifier(Arc::new(TokenIsUserId))
}

fn test_app() -> Router {
    create_router(test_state())
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn create_event(app: &Router, owner: &str, name: &str) -> Value {
    let (status, body) = send(
        app,
        request(Method::POST, "/events", Some(owner), Some(json!({ "name": name }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

async fn create_room(app: &Router, owner: &str, event_id: &str, name: &str) -> Value {
    let (status, body) = send(
        app,
        request(
            Method::POST,
            &format!("/events/{event_id}/rooms"),
            Some(owner),
            Some(json!({ "name": name, "capacity": 50 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

async fn sign_up(app: &Router, email: &str) -> Value {
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({ "email": email, "password": "correct-horse", "name": "Ada" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

fn assert_error(body: &Value, code: &str, message: &str) {
    assert!(body["data"].is_null(), "data should be null: {body}");
    assert_eq!(body["error"]["code"], code, "{body}");
    assert_eq!(body["error"]["message"], message, "{body}");
}

// ============================================================================
// Envelope & Validation
// ============================================================================

#[tokio::test]
async fn success_envelope_has_null_error() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;

    let (status, body) = send(
        &app,
        request(Method::GET, &format!("/events/{}", event["id"].as_str().unwrap()), Some("anyone"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["error"].is_null());
    assert_eq!(body["data"]["event"]["name"], "Conf");
    assert_eq!(body["data"]["rooms"], json!([]));
    assert_eq!(body["data"]["sessions"], json!([]));
}

#[tokio::test]
async fn unknown_field_is_rejected() {
    let app = test_app();
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/events",
            Some("owner-1"),
            Some(json!({ "name": "Conf", "venue": "somewhere" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unknown field"));
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = test_app();
    let req = Request::post("/events")
        .header(header::AUTHORIZATION, "Bearer owner-1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\":"))
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn basic_scheme_is_invalid_format() {
    let app = test_app();
    let req = Request::get("/events/me")
        .header(header::AUTHORIZATION, "Basic abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "unauthorized", "invalid authorization format");
}

#[tokio::test]
async fn bearer_without_token_is_missing_token() {
    let app = test_app();
    let req = Request::get("/events/me")
        .header(header::AUTHORIZATION, "Bearer ")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "unauthorized", "missing token");
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    // Production verifier: a made-up token does not verify.
    let app = create_router(AppState::new(Config::default()).unwrap());
    let (status, body) = send(
        &app,
        request(Method::GET, "/events/me", Some("not-a-real-token"), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "unauthorized", "invalid or expired token");
}

#[tokio::test]
async fn handler_sees_verified_user_id() {
    let state = AppState::new(Config::default())
        .unwrap()
        .with_verifier(Arc::new(FixedUser("u1")));
    let app = create_router(state);

    let (status, body) = send(
        &app,
        request(Method::POST, "/events", Some("whatever"), Some(json!({ "name": "Conf" }))),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["owner_id"], "u1");
}

#[tokio::test]
async fn issued_tokens_authenticate_the_user() {
    let app = create_router(AppState::new(Config::default()).unwrap());
    let payload = sign_up(&app, "ada@example.com").await;
    let token = payload["token"].as_str().unwrap();

    let (status, body) = send(&app, request(Method::GET, "/users/me", Some(token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert_eq!(body["data"]["role"], "attendee");
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn duplicate_sign_up_is_bad_request() {
    let app = test_app();
    sign_up(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({ "email": " ADA@example.com ", "password": "another-pass" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "bad_request", "email already registered");
}

#[tokio::test]
async fn sign_up_never_returns_password_material() {
    let app = test_app();
    let payload = sign_up(&app, "ada@example.com").await;

    let serialized = payload.to_string();
    assert!(!serialized.contains("correct-horse"));
    assert!(payload["user"].get("password").is_none());
    assert!(payload["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn token_issuance_failure_is_internal_error() {
    let app = create_router(test_state().with_issuer(Arc::new(BrokenIssuer)));
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({ "email": "ada@example.com", "password": "correct-horse" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
    assert!(!body.to_string().contains("key unavailable"));
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = test_app();
    sign_up(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "unauthorized", "invalid email or password");

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "correct-horse" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"]["token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn login_code_request_does_not_reveal_accounts() {
    let app = test_app();
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/login/request",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "sent");
}

#[tokio::test]
async fn login_code_mail_failure_is_internal_error() {
    let mailer = Arc::new(SelectiveMailer::rejecting(&["ada@example.com"]));
    let app = create_router(test_state().with_mailer(mailer));
    sign_up(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/login/request",
            None,
            Some(json!({ "email": "ada@example.com" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
    assert!(!body.to_string().contains("mailbox unavailable"));
}

#[tokio::test]
async fn wrong_login_code_is_unauthorized() {
    let app = test_app();
    sign_up(&app, "ada@example.com").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/auth/login/verify",
            None,
            Some(json!({ "email": "ada@example.com", "code": "000000" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_error(&body, "unauthorized", "invalid or expired code");
}

fn different_code(code: &str) -> &'static str {
    if code == "000000" {
        "111111"
    } else {
        "000000"
    }
}

async fn request_code(app: &Router, email: &str) {
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/auth/login/request",
            None,
            Some(json!({ "email": email })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "sent");
}

async fn verify_code(app: &Router, email: &str, code: &str) -> StatusCode {
    let (status, _) = send(
        app,
        request(
            Method::POST,
            "/auth/login/verify",
            None,
            Some(json!({ "email": email, "code": code })),
        ),
    )
    .await;
    status
}

#[tokio::test]
async fn login_code_round_trip() {
    let inbox = Arc::new(CodeInbox::default());
    let app = create_router(test_state().with_mailer(inbox.clone()));
    sign_up(&app, "ada@example.com").await;

    request_code(&app, "ada@example.com").await;
    let code = inbox.latest_for("ada@example.com");

    assert_eq!(verify_code(&app, "ada@example.com", &code).await, StatusCode::OK);
    // Single use.
    assert_eq!(
        verify_code(&app, "ada@example.com", &code).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn requesting_a_new_code_does_not_reset_failed_attempts() {
    let inbox = Arc::new(CodeInbox::default());
    let app = create_router(test_state().with_mailer(inbox.clone()));
    sign_up(&app, "ada@example.com").await;

    request_code(&app, "ada@example.com").await;
    let first = inbox.latest_for("ada@example.com");
    for _ in 0..4 {
        assert_eq!(
            verify_code(&app, "ada@example.com", different_code(&first)).await,
            StatusCode::UNAUTHORIZED
        );
    }

    request_code(&app, "ada@example.com").await;
    let second = inbox.latest_for("ada@example.com");
    assert_eq!(
        verify_code(&app, "ada@example.com", different_code(&second)).await,
        StatusCode::UNAUTHORIZED
    );

    // The fifth wrong guess overall invalidated the reissued code too.
    assert_eq!(
        verify_code(&app, "ada@example.com", &second).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn login_code_requests_are_throttled_per_address() {
    let inbox = Arc::new(CodeInbox::default());
    let app = create_router(test_state().with_mailer(inbox.clone()));
    sign_up(&app, "ada@example.com").await;
    sign_up(&app, "bob@example.com").await;

    for _ in 0..5 {
        request_code(&app, "ada@example.com").await;
    }
    let delivered = inbox.codes_for("ada@example.com");
    assert_eq!(delivered.len(), 3);

    request_code(&app, "bob@example.com").await;
    assert_eq!(inbox.codes_for("bob@example.com").len(), 1);

    // Throttled requests leave the last delivered code usable.
    let last = delivered.last().unwrap();
    assert_eq!(verify_code(&app, "ada@example.com", last).await, StatusCode::OK);
}

#[tokio::test]
async fn profile_update_is_partial() {
    let app = test_app();
    let payload = sign_up(&app, "ada@example.com").await;
    let user_id = payload["user"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(Method::PATCH, "/users/me", Some(&user_id), Some(json!({ "name": "Ada L." }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Ada L.");
    assert_eq!(body["data"]["email"], "ada@example.com");
}

#[tokio::test]
async fn profile_email_taken_is_conflict() {
    let app = test_app();
    sign_up(&app, "grace@example.com").await;
    let payload = sign_up(&app, "ada@example.com").await;
    let user_id = payload["user"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            Method::PATCH,
            "/users/me",
            Some(&user_id),
            Some(json!({ "email": "Grace@Example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn profile_of_missing_user_is_not_found() {
    let app = test_app();
    let (status, body) = send(&app, request(Method::GET, "/users/me", Some("ghost"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn create_event_assigns_owner_id_and_code() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;

    assert_eq!(event["owner_id"], "owner-1");
    assert!(!event["id"].as_str().unwrap().is_empty());
    let code = event["event_code"].as_str().unwrap();
    assert_eq!(code.len(), 4);
    assert!(code.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
}

#[tokio::test]
async fn lists_are_empty_arrays_not_null() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let event_id = event["id"].as_str().unwrap();

    for uri in [
        format!("/events/{event_id}/rooms"),
        format!("/events/{event_id}/team-members"),
    ] {
        let (status, body) = send(&app, request(Method::GET, &uri, Some("owner-1"), None)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["data"], json!([]), "{uri}");
    }

    let (_, body) = send(&app, request(Method::GET, "/events/me", Some("nobody"), None)).await;
    assert_eq!(body["data"], json!([]));

    let (_, body) = send(&app, request(Method::GET, "/attendee/events", Some("nobody"), None)).await;
    assert_eq!(body["data"], json!([]));

    let (_, body) = send(
        &app,
        request(Method::GET, &format!("/events/{event_id}/invitations"), Some("owner-1"), None),
    )
    .await;
    assert_eq!(body["data"]["items"], json!([]));
    assert_eq!(body["data"]["pagination"]["total"], 0);
    assert_eq!(body["data"]["pagination"]["total_pages"], 0);
}

#[tokio::test]
async fn my_events_are_newest_first() {
    let app = test_app();
    create_event(&app, "owner-1", "First").await;
    create_event(&app, "owner-1", "Second").await;
    create_event(&app, "owner-2", "Elsewhere").await;

    let (_, body) = send(&app, request(Method::GET, "/events/me", Some("owner-1"), None)).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Second", "First"]);
}

#[tokio::test]
async fn non_owner_is_forbidden_but_missing_is_not_found() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let event_id = event["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        request(
            Method::PATCH,
            &format!("/events/{event_id}"),
            Some("intruder"),
            Some(json!({ "name": "Mine now" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, _) = send(
        &app,
        request(Method::DELETE, &format!("/events/{event_id}"), Some("intruder"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request(
            Method::PATCH,
            "/events/does-not-exist",
            Some("intruder"),
            Some(json!({ "name": "x" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "event not found");
}

struct OwnerOnlyFixture {
    event_id: String,
    room_id: String,
    session_id: String,
    member_id: String,
}

async fn owner_only_fixture(app: &Router) -> OwnerOnlyFixture {
    let owner = sign_up(app, "owner@example.com").await;
    let owner_id = owner["user"]["id"].as_str().unwrap().to_string();
    let member = sign_up(app, "member@example.com").await;
    let member_id = member["user"]["id"].as_str().unwrap().to_string();

    let event = create_event(app, &owner_id, "Conf").await;
    let event_id = event["id"].as_str().unwrap().to_string();
    let room = create_room(app, &owner_id, &event_id, "Hall A").await;
    let room_id = room["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        request(
            Method::POST,
            &format!("/events/{event_id}/sessions"),
            Some(&owner_id),
            Some(json!({
                "room_id": room_id,
                "title": "Keynote",
                "start_time": "2026-05-01T09:00:00Z",
                "end_time": "2026-05-01T10:00:00Z"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let session_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        request(
            Method::POST,
            &format!("/events/{event_id}/team-members"),
            Some(&owner_id),
            Some(json!({ "email": "member@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    OwnerOnlyFixture {
        event_id,
        room_id,
        session_id,
        member_id,
    }
}

fn session_body(room_id: &str) -> Value {
    json!({
        "room_id": room_id,
        "title": "Talk",
        "start_time": "2026-05-01T11:00:00Z",
        "end_time": "2026-05-01T12:00:00Z"
    })
}

#[tokio::test]
async fn every_owner_only_route_forbids_other_users() {
    let app = test_app();
    let f = owner_only_fixture(&app).await;
    let (e, r, s, m) = (&f.event_id, &f.room_id, &f.session_id, &f.member_id);

    let cases: Vec<(Method, String, Option<Value>)> = vec![
        (Method::PATCH, format!("/events/{e}"), Some(json!({ "name": "x" }))),
        (Method::DELETE, format!("/events/{e}"), None),
        (Method::GET, format!("/events/{e}/rooms"), None),
        (Method::POST, format!("/events/{e}/rooms"), Some(json!({ "name": "B", "capacity": 1 }))),
        (Method::GET, format!("/events/{e}/rooms/{r}"), None),
        (Method::PATCH, format!("/events/{e}/rooms/{r}"), Some(json!({ "name": "x" }))),
        (Method::PATCH, format!("/events/{e}/rooms/{r}/not-bookable"), None),
        (Method::DELETE, format!("/events/{e}/rooms/{r}"), None),
        (Method::POST, format!("/events/{e}/sessions"), Some(session_body(r))),
        (
            Method::PATCH,
            format!("/events/{e}/sessions/{s}"),
            Some(json!({ "end_time": "2026-05-01T11:00:00Z" })),
        ),
        (
            Method::PATCH,
            format!("/events/{e}/sessions/{s}/content"),
            Some(json!({ "title": "x" })),
        ),
        (Method::DELETE, format!("/events/{e}/sessions/{s}"), None),
        (Method::GET, format!("/events/{e}/team-members"), None),
        (
            Method::POST,
            format!("/events/{e}/team-members"),
            Some(json!({ "email": "member@example.com" })),
        ),
        (Method::DELETE, format!("/events/{e}/team-members/{m}"), None),
        (Method::GET, format!("/events/{e}/invitations"), None),
        (
            Method::POST,
            format!("/events/{e}/invitations"),
            Some(json!({ "emails": "guest@example.com" })),
        ),
    ];

    for (method, uri, body) in cases {
        let (status, response) =
            send(&app, request(method.clone(), &uri, Some("intruder"), body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}: {response}");
        assert_error(&response, "forbidden", "only the event owner can do that");
    }

    // Nothing was changed by the rejected calls.
    let (status, body) = send(
        &app,
        request(Method::GET, &format!("/events/{e}"), Some("intruder"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["event"]["name"], "Conf");
    assert_eq!(body["data"]["rooms"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_resources_are_not_found_even_for_other_users() {
    let app = test_app();
    let f = owner_only_fixture(&app).await;
    let (e, r) = (&f.event_id, &f.room_id);

    let cases: Vec<(Method, String, Option<Value>, &str)> = vec![
        (Method::GET, format!("/events/{e}/rooms/no-such-room"), None, "room not found"),
        (
            Method::PATCH,
            format!("/events/{e}/rooms/no-such-room"),
            Some(json!({ "name": "x" })),
            "room not found",
        ),
        (
            Method::PATCH,
            format!("/events/{e}/rooms/no-such-room/not-bookable"),
            None,
            "room not found",
        ),
        (Method::DELETE, format!("/events/{e}/rooms/no-such-room"), None, "room not found"),
        (
            Method::POST,
            format!("/events/{e}/sessions"),
            Some(session_body("no-such-room")),
            "room not found",
        ),
        (
            Method::PATCH,
            format!("/events/{e}/sessions/no-such-session"),
            Some(json!({ "room_id": r })),
            "session not found",
        ),
        (
            Method::PATCH,
            format!("/events/{e}/sessions/no-such-session/content"),
            Some(json!({ "title": "x" })),
            "session not found",
        ),
        (
            Method::DELETE,
            format!("/events/{e}/sessions/no-such-session"),
            None,
            "session not found",
        ),
        (
            Method::DELETE,
            format!("/events/{e}/team-members/not-a-member"),
            None,
            "user is not a team member",
        ),
        (Method::GET, "/events/no-such-event/rooms".to_string(), None, "event not found"),
        (Method::GET, "/events/no-such-event/team-members".to_string(), None, "event not found"),
        (Method::GET, "/events/no-such-event/invitations".to_string(), None, "event not found"),
        (
            Method::POST,
            "/events/no-such-event/invitations".to_string(),
            Some(json!({ "emails": "guest@example.com" })),
            "event not found",
        ),
        (Method::DELETE, "/events/no-such-event".to_string(), None, "event not found"),
    ];

    for (method, uri, body, message) in cases {
        let (status, response) =
            send(&app, request(method.clone(), &uri, Some("intruder"), body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}: {response}");
        assert_error(&response, "not_found", message);
    }
}

#[tokio::test]
async fn delete_event_cascades() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let event_id = event["id"].as_str().unwrap();
    create_room(&app, "owner-1", event_id, "Hall A").await;

    let (status, body) = send(
        &app,
        request(Method::DELETE, &format!("/events/{event_id}"), Some("owner-1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "deleted");

    let (status, _) = send(
        &app,
        request(Method::GET, &format!("/events/{event_id}/rooms"), Some("owner-1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Rooms & Sessions
// ============================================================================

#[tokio::test]
async fn room_patch_without_not_bookable_keeps_flag() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let event_id = event["id"].as_str().unwrap();
    let room = create_room(&app, "owner-1", event_id, "Hall A").await;
    let room_uri = format!("/events/{event_id}/rooms/{}", room["id"].as_str().unwrap());

    let (_, body) = send(
        &app,
        request(
            Method::PATCH,
            &format!("{room_uri}/not-bookable"),
            Some("owner-1"),
            None,
        ),
    )
    .await;
    assert_eq!(body["data"]["not_bookable"], true);

    let (_, body) = send(
        &app,
        request(Method::PATCH, &room_uri, Some("owner-1"), Some(json!({ "capacity": 80 }))),
    )
    .await;
    assert_eq!(body["data"]["capacity"], 80);
    assert_eq!(body["data"]["not_bookable"], true);

    let (_, body) = send(
        &app,
        request(
            Method::PATCH,
            &room_uri,
            Some("owner-1"),
            Some(json!({ "not_bookable": false })),
        ),
    )
    .await;
    assert_eq!(body["data"]["not_bookable"], false);
}

#[tokio::test]
async fn room_of_another_event_is_not_found() {
    let app = test_app();
    let first = create_event(&app, "owner-1", "First").await;
    let second = create_event(&app, "owner-1", "Second").await;
    let room = create_room(&app, "owner-1", first["id"].as_str().unwrap(), "Hall A").await;

    let (status, body) = send(
        &app,
        request(
            Method::GET,
            &format!(
                "/events/{}/rooms/{}",
                second["id"].as_str().unwrap(),
                room["id"].as_str().unwrap()
            ),
            Some("owner-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "room not found");
}

#[tokio::test]
async fn session_lifecycle() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let event_id = event["id"].as_str().unwrap();
    let room = create_room(&app, "owner-1", event_id, "Hall A").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/events/{event_id}/sessions"),
            Some("owner-1"),
            Some(json!({
                "room_id": room["id"],
                "title": "Keynote",
                "start_time": "2026-05-01T09:00:00Z",
                "end_time": "2026-05-01T10:00:00Z",
                "tags": ["opening"]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let session_uri = format!(
        "/events/{event_id}/sessions/{}",
        body["data"]["id"].as_str().unwrap()
    );

    let (status, body) = send(
        &app,
        request(
            Method::PATCH,
            &session_uri,
            Some("owner-1"),
            Some(json!({ "end_time": "2026-05-01T08:00:00Z" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "end_time must not be before start_time");

    let (status, body) = send(
        &app,
        request(
            Method::PATCH,
            &format!("{session_uri}/content"),
            Some("owner-1"),
            Some(json!({ "title": "Opening Keynote" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Opening Keynote");
    assert_eq!(body["data"]["tags"], json!(["opening"]));

    let (status, body) = send(&app, request(Method::DELETE, &session_uri, Some("owner-1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "deleted");
}

#[tokio::test]
async fn sessionize_failure_is_internal_error_without_detail() {
    let app = create_router(test_state().with_importer(Arc::new(UnreachableImporter)));
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!(
        "/events/{}/import/sessionize/abc123",
        event["id"].as_str().unwrap()
    );

    let (status, body) = send(&app, request(Method::POST, &uri, Some("owner-1"), None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error(&body, "internal_error", "internal server error");
    assert!(!body.to_string().contains("sessionize.com"));
}

#[tokio::test]
async fn sessionize_import_by_non_owner_is_internal_error() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!(
        "/events/{}/import/sessionize/abc123",
        event["id"].as_str().unwrap()
    );

    let (status, body) = send(&app, request(Method::POST, &uri, Some("intruder"), None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error(&body, "internal_error", "internal server error");
}

#[tokio::test]
async fn sessionize_id_with_path_characters_is_internal_error() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!(
        "/events/{}/import/sessionize/abc%2F..%2Fx",
        event["id"].as_str().unwrap()
    );

    let (status, body) = send(&app, request(Method::POST, &uri, Some("owner-1"), None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error(&body, "internal_error", "internal server error");
}

// ============================================================================
// Team Members
// ============================================================================

#[tokio::test]
async fn team_member_management() {
    let app = test_app();
    let owner = sign_up(&app, "owner@example.com").await;
    let owner_id = owner["user"]["id"].as_str().unwrap().to_string();
    let helper = sign_up(&app, "helper@example.com").await;
    let helper_id = helper["user"]["id"].as_str().unwrap().to_string();

    let event = create_event(&app, &owner_id, "Conf").await;
    let members_uri = format!("/events/{}/team-members", event["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &members_uri,
            Some(&owner_id),
            Some(json!({ "email": "Helper@Example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["user_id"], helper_id.as_str());

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            &members_uri,
            Some(&owner_id),
            Some(json!({ "email": "helper@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &members_uri,
            Some(&owner_id),
            Some(json!({ "email": "owner@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "user is already the event owner");

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &members_uri,
            Some(&owner_id),
            Some(json!({ "email": "stranger@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "no user with that email");

    let (status, _) = send(
        &app,
        request(Method::DELETE, &format!("{members_uri}/{helper_id}"), Some(&owner_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request(Method::DELETE, &format!("{members_uri}/{helper_id}"), Some(&owner_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Invitations
// ============================================================================

#[tokio::test]
async fn invitation_blob_is_split_and_paginated() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!("/events/{}/invitations", event["id"].as_str().unwrap());

    let emails: Vec<String> = (0..10).map(|i| format!("guest{i}@example.com")).collect();
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &uri,
            Some("owner-1"),
            Some(json!({ "emails": emails.join(", ") })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["sent"], 10);
    assert_eq!(body["data"]["failed"], json!([]));

    let (status, body) = send(
        &app,
        request(Method::GET, &format!("{uri}?page=2&page_size=5"), Some("owner-1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 5);
    assert_eq!(
        body["data"]["pagination"],
        json!({ "page": 2, "page_size": 5, "total": 10, "total_pages": 2 })
    );

    let (_, body) = send(
        &app,
        request(Method::GET, &format!("{uri}?search=GUEST3"), Some("owner-1"), None),
    )
    .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["email"], "guest3@example.com");
}

#[tokio::test]
async fn invitation_blob_without_valid_emails_is_rejected() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!("/events/{}/invitations", event["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &uri,
            Some("owner-1"),
            Some(json!({ "emails": "not-valid, also-invalid" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "bad_request", "no valid emails found");
}

#[tokio::test]
async fn already_invited_addresses_are_skipped() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!("/events/{}/invitations", event["id"].as_str().unwrap());

    send(
        &app,
        request(Method::POST, &uri, Some("owner-1"), Some(json!({ "emails": "a@example.com" }))),
    )
    .await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &uri,
            Some("owner-1"),
            Some(json!({ "emails": "a@example.com, b@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sent"], 1);
    assert_eq!(body["data"]["failed"], json!([]));
}

#[tokio::test]
async fn failed_invitation_is_reported_and_retryable() {
    let mailer = Arc::new(SelectiveMailer::rejecting(&["bounce@example.com"]));
    let app = create_router(test_state().with_mailer(mailer.clone()));
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!("/events/{}/invitations", event["id"].as_str().unwrap());

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &uri,
            Some("owner-1"),
            Some(json!({ "emails": "ok@example.com bounce@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sent"], 1);
    assert_eq!(body["data"]["failed"], json!(["bounce@example.com"]));
    assert_eq!(*mailer.delivered.lock().unwrap(), vec!["ok@example.com"]);

    let (_, body) = send(&app, request(Method::GET, &uri, Some("owner-1"), None)).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn invitations_to_foreign_event_are_forbidden() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!("/events/{}/invitations", event["id"].as_str().unwrap());

    let (status, _) = send(
        &app,
        request(Method::POST, &uri, Some("intruder"), Some(json!({ "emails": "a@example.com" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Attendees
// ============================================================================

#[tokio::test]
async fn repeat_registration_returns_same_id() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let uri = format!("/attendee/events/{}/registrations", event["id"].as_str().unwrap());

    let (status, first) = send(&app, request(Method::POST, &uri, Some("attendee-1"), None)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = send(&app, request(Method::POST, &uri, Some("attendee-1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["id"], second["data"]["id"]);
}

#[tokio::test]
async fn registration_for_missing_event_is_not_found() {
    let app = test_app();
    let (status, body) = send(
        &app,
        request(Method::POST, "/attendee/events/missing/registrations", Some("attendee-1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "event not found");
}

#[tokio::test]
async fn register_by_code() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let code = event["event_code"].as_str().unwrap().to_uppercase();

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/attendee/registrations",
            Some("attendee-1"),
            Some(json!({ "event_code": code })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["event_id"], event["id"]);

    for bad in ["ab", "ab@d"] {
        let (status, body) = send(
            &app,
            request(
                Method::POST,
                "/attendee/registrations",
                Some("attendee-1"),
                Some(json!({ "event_code": bad })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(body["error"]["code"], "bad_request");
    }
}

#[tokio::test]
async fn schedule_requires_registration_and_hides_unbookable_rooms() {
    let app = test_app();
    let event = create_event(&app, "owner-1", "Conf").await;
    let event_id = event["id"].as_str().unwrap();
    create_room(&app, "owner-1", event_id, "Hall A").await;
    let hidden = create_room(&app, "owner-1", event_id, "Backstage").await;
    send(
        &app,
        request(
            Method::PATCH,
            &format!("/events/{event_id}/rooms/{}/not-bookable", hidden["id"].as_str().unwrap()),
            Some("owner-1"),
            None,
        ),
    )
    .await;

    let schedule_uri = format!("/attendee/events/{event_id}/schedule");
    let (status, _) = send(&app, request(Method::GET, &schedule_uri, Some("attendee-1"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request(Method::GET, "/attendee/events/missing/schedule", Some("attendee-1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(
        &app,
        request(
            Method::POST,
            &format!("/attendee/events/{event_id}/registrations"),
            Some("attendee-1"),
            None,
        ),
    )
    .await;

    let (status, body) = send(&app, request(Method::GET, &schedule_uri, Some("attendee-1"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let rooms = body["data"]["rooms"].as_array().unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["name"], "Hall A");
    assert_eq!(rooms[0]["sessions"], json!([]));

    let (_, body) = send(&app, request(Method::GET, "/attendee/events", Some("attendee-1"), None)).await;
    assert_eq!(body["data"][0]["event"]["id"], event_id);
}

// ============================================================================
// CORS & Routing
// ============================================================================

fn app_with_origins(origins: &[&str]) -> Router {
    let config = Config {
        cors_origins: origins.iter().map(|o| o.to_string()).collect(),
        ..Config::default()
    };
    create_router(
        AppState::new(config)
            .unwrap()
            .with_verifier(Arc::new(TokenIsUserId)),
    )
}

#[tokio::test]
async fn preflight_from_disallowed_origin_has_no_cors_headers() {
    let app = app_with_origins(&["https://app.example.com"]);
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/events")
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn allowed_origin_is_echoed_on_errors_too() {
    let app = app_with_origins(&["https://app.example.com"]);
    let req = Request::get("/events/me")
        .header(header::ORIGIN, "https://app.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example.com"
    );
}

#[tokio::test]
async fn unsupported_method_is_enveloped_not_found() {
    let app = test_app();
    let (status, body) = send(&app, request(Method::PUT, "/auth/login", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn unsupported_method_on_protected_path_requires_auth_first() {
    let app = test_app();

    let (status, body) = send(&app, request(Method::DELETE, "/events/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, body) =
        send(&app, request(Method::DELETE, "/events/me", Some("owner-1"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "not_found", "route not found");
}
