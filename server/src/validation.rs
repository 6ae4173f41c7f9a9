//! Input normalization and validation rules shared by all controllers.
//!
//! Request bodies implement [`Validate`]: `normalize` canonicalizes fields
//! in place (trim, lowercase, typo correction) and `validate` returns an
//! ordered list of human-readable violations. The JSON extractor in
//! [`crate::extract`] runs both after a strict decode.
//!
//! One email pattern is used everywhere: [`EMAIL_PATTERN`].

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// The email pattern applied to every email field and every invitation token.
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Minimum accepted password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Exact length of an event code.
pub const EVENT_CODE_LENGTH: usize = 4;

/// Exact length of a passwordless login code.
pub const LOGIN_CODE_LENGTH: usize = 6;

/// Default and maximum invitation page sizes.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"));

/// A request body that can canonicalize and check itself.
pub trait Validate {
    /// Canonicalizes fields in place. Runs before [`Validate::validate`].
    fn normalize(&mut self) {}

    /// Returns violations in field order; empty when the request is valid.
    fn validate(&self) -> Vec<String>;
}

/// Trims and lowercases an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Stable, non-reversible tag for an address, for use in log records.
pub fn email_fingerprint(email: &str) -> String {
    let digest = Sha256::digest(normalize_email(email).as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

/// Returns `true` if the (already normalized) address matches [`EMAIL_PATTERN`].
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Pushes the violation for a required email field, if any.
pub fn check_email(field: &str, email: &str, violations: &mut Vec<String>) {
    if email.is_empty() {
        violations.push(format!("{field} is required"));
    } else if !is_valid_email(email) {
        violations.push(format!("{field} must be a valid email address"));
    }
}

/// Normalizes a role string, correcting the common "atendee" typo.
///
/// # Example
///
/// ```rust
/// use eventdesk_server::validation::normalize_role;
///
/// assert_eq!(normalize_role(" Atendee "), "attendee");
/// assert_eq!(normalize_role("ADMIN"), "admin");
/// ```
pub fn normalize_role(role: &str) -> String {
    let role = role.trim().to_lowercase();
    if role == "atendee" {
        "attendee".to_string()
    } else {
        role
    }
}

/// Lowercases and trims an event code.
pub fn normalize_event_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Checks a normalized event code: required, four characters, `[a-z0-9]`.
pub fn check_event_code(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("event_code is required".to_string());
    }
    if code.chars().count() != EVENT_CODE_LENGTH {
        return Err(format!(
            "event_code must be exactly {EVENT_CODE_LENGTH} characters"
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err("event_code may only contain letters and digits".to_string());
    }
    Ok(())
}

/// Checks a passwordless login code: six ASCII digits.
pub fn check_login_code(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("code is required".to_string());
    }
    if code.len() != LOGIN_CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("code must be {LOGIN_CODE_LENGTH} digits"));
    }
    Ok(())
}

/// Pushes violations for optional geo coordinates.
pub fn check_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
    violations: &mut Vec<String>,
) {
    if let Some(lat) = latitude {
        if !(-90.0..=90.0).contains(&lat) {
            violations.push("latitude must be between -90 and 90".to_string());
        }
    }
    if let Some(lng) = longitude {
        if !(-180.0..=180.0).contains(&lng) {
            violations.push("longitude must be between -180 and 180".to_string());
        }
    }
}

/// Trims an optional string in place.
pub fn trim_opt(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        *v = v.trim().to_string();
    }
}

/// Splits a free-text blob of addresses into a deduplicated list of valid,
/// normalized emails. Order of first appearance is preserved.
///
/// # Example
///
/// ```rust
/// use eventdesk_server::validation::parse_email_list;
///
/// let emails = parse_email_list("a@example.com, B@example.com\nnot-an-email a@example.com");
/// assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
/// ```
pub fn parse_email_list(blob: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    blob.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(normalize_email)
        .filter(|token| !token.is_empty() && is_valid_email(token))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

/// Resolves `page`/`page_size` query values, falling back to defaults for
/// missing, unparsable or non-positive values and clamping the size.
pub fn page_params(page: Option<&str>, page_size: Option<&str>) -> (u32, u32) {
    let parse = |value: Option<&str>| {
        value
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v >= 1)
    };

    let page = parse(page).map_or(1, |p| p.min(i64::from(u32::MAX)) as u32);
    let page_size = parse(page_size).map_or(DEFAULT_PAGE_SIZE, |s| {
        s.min(i64::from(MAX_PAGE_SIZE)) as u32
    });

    (page, page_size)
}
