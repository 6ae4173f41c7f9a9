//! Authentication and profile endpoints.
//!
//! - `POST /auth/signup` - create an account, returns `{token, user}`
//! - `POST /auth/login` - email + password, returns `{token, user}`
//! - `POST /auth/login/request` - mail a one-time login code
//! - `POST /auth/login/verify` - exchange the code for `{token, user}`
//! - `GET /users/me`, `PATCH /users/me` - the caller's profile

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::envelope::{ApiResponse, StatusBody};
use crate::error::{ApiError, ApiResult, ServiceError};
use crate::extract::ValidJson;
use crate::rate_limit::RateLimitResult;
use crate::routes::AppState;
use crate::service::{NewUser, ProfilePatch};
use crate::types::{Role, User};
use crate::validation::{
    check_email, check_login_code, normalize_email, normalize_role, trim_opt, Validate,
    MIN_PASSWORD_LENGTH,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Validate for SignUpRequest {
    fn normalize(&mut self) {
        self.email = normalize_email(&self.email);
        trim_opt(&mut self.name);
        if let Some(role) = self.role.as_mut() {
            *role = normalize_role(role);
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        check_email("email", &self.email, &mut violations);
        check_password(&self.password, &mut violations);
        if let Some(role) = self.role.as_deref() {
            if Role::parse(role).is_none() {
                violations.push("role must be admin or attendee".to_string());
            }
        }
        violations
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn normalize(&mut self) {
        self.email = normalize_email(&self.email);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        check_email("email", &self.email, &mut violations);
        if self.password.is_empty() {
            violations.push("password is required".to_string());
        }
        violations
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginCodeRequest {
    pub email: String,
}

impl Validate for LoginCodeRequest {
    fn normalize(&mut self) {
        self.email = normalize_email(&self.email);
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        check_email("email", &self.email, &mut violations);
        violations
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyLoginCodeRequest {
    pub email: String,
    pub code: String,
}

impl Validate for VerifyLoginCodeRequest {
    fn normalize(&mut self) {
        self.email = normalize_email(&self.email);
        self.code = self.code.trim().to_string();
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        check_email("email", &self.email, &mut violations);
        if let Err(violation) = check_login_code(&self.code) {
            violations.push(violation);
        }
        violations
    }
}

impl Validate for ProfilePatch {
    fn normalize(&mut self) {
        trim_opt(&mut self.name);
        if let Some(email) = self.email.as_mut() {
            *email = normalize_email(email);
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.name.as_deref() == Some("") {
            violations.push("name must not be empty".to_string());
        }
        if let Some(email) = self.email.as_deref() {
            check_email("email", email, &mut violations);
        }
        violations
    }
}

fn check_password(password: &str, violations: &mut Vec<String>) {
    if password.is_empty() {
        violations.push("password is required".to_string());
    } else if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        ));
    }
}

/// Returned by every endpoint that logs a user in.
#[derive(Debug, Clone, Serialize)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
}

fn issue_token(state: &AppState, user: User) -> Result<AuthPayload, ApiError> {
    let token = state
        .issuer
        .issue(&user.id)
        .map_err(|e| ApiError::internal(format!("token issuance failed: {e}")))?;
    Ok(AuthPayload { token, user })
}

/// POST /auth/signup
pub async fn sign_up(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<SignUpRequest>,
) -> ApiResult<AuthPayload> {
    let role = body
        .role
        .as_deref()
        .and_then(Role::parse)
        .unwrap_or_default();

    let user = state
        .users
        .sign_up(NewUser {
            email: body.email,
            password: body.password,
            name: body.name.unwrap_or_default(),
            role,
        })
        .await
        .map_err(|err| match err {
            ServiceError::Conflict(_) => ApiError::bad_request("email already registered"),
            other => other.into(),
        })?;

    info!(user_id = %user.id, "User signed up");
    Ok(ApiResponse::created(issue_token(&state, user)?))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<LoginRequest>,
) -> ApiResult<AuthPayload> {
    let user = state
        .users
        .authenticate(&body.email, &body.password)
        .await
        .map_err(|err| match err {
            ServiceError::Unauthenticated(_) | ServiceError::NotFound(_) => {
                ApiError::unauthorized("invalid email or password")
            }
            other => other.into(),
        })?;

    debug!(user_id = %user.id, "Password login succeeded");
    Ok(ApiResponse::ok(issue_token(&state, user)?))
}

/// POST /auth/login/request
///
/// Always answers `{"status": "sent"}` so the endpoint cannot be used to
/// discover which addresses have accounts. Requests over the per-address limit
/// are answered the same way but send nothing; the pending code stays valid.
pub async fn request_login_code(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<LoginCodeRequest>,
) -> ApiResult<StatusBody> {
    if let RateLimitResult::Limited { retry_after_secs } =
        state.code_requests.check(&body.email).await
    {
        debug!(retry_after_secs, "Login code request throttled");
        return Ok(ApiResponse::ok(StatusBody::sent()));
    }

    let Some(user) = state.users.find_by_email(&body.email).await? else {
        debug!("Login code requested for unknown address");
        return Ok(ApiResponse::ok(StatusBody::sent()));
    };

    let code = state
        .login_codes
        .issue(&user.email)
        .map_err(|e| ApiError::internal(format!("login code issuance failed: {e}")))?;

    if let Err(err) = state
        .mailer
        .send_login_code(&user.email, &code, state.login_codes.ttl())
        .await
    {
        state.login_codes.revoke(&user.email);
        return Err(ApiError::internal(format!("login code mail failed: {err}")));
    }

    debug!(user_id = %user.id, "Login code sent");
    Ok(ApiResponse::ok(StatusBody::sent()))
}

/// POST /auth/login/verify
pub async fn verify_login_code(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<VerifyLoginCodeRequest>,
) -> ApiResult<AuthPayload> {
    if let Err(err) = state.login_codes.verify(&body.email, &body.code) {
        warn!(error = %err, "Login code rejected");
        return Err(ApiError::unauthorized("invalid or expired code"));
    }

    let user = state
        .users
        .find_by_email(&body.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired code"))?;

    debug!(user_id = %user.id, "Passwordless login succeeded");
    Ok(ApiResponse::ok(issue_token(&state, user)?))
}

/// GET /users/me
pub async fn get_profile(State(state): State<AppState>, auth: AuthUser) -> ApiResult<User> {
    let user = state.users.get_user(&auth.user_id).await?;
    Ok(ApiResponse::ok(user))
}

/// PATCH /users/me
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidJson(patch): ValidJson<ProfilePatch>,
) -> ApiResult<User> {
    let user = state.users.update_profile(&auth.user_id, patch).await?;
    Ok(ApiResponse::ok(user))
}
