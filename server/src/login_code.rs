//! Passwordless login codes.
//!
//! A user who asks to sign in by email receives a six-digit code. The code is
//! kept here, keyed by the normalized email address, until it is used, it
//! expires, or too many wrong guesses were made against it.
//!
//! # Lifecycle
//!
//! - [`LoginCodeStore::issue`] replaces any previous code for the address;
//!   wrong guesses made against a still-live code carry over
//! - [`LoginCodeStore::verify`] consumes the code on success
//! - each mismatch counts as an attempt; at `max_attempts` the code is dropped
//!
//! # Example
//!
//! ```rust
//! use eventdesk_server::login_code::{LoginCodeConfig, LoginCodeStore};
//!
//! let store = LoginCodeStore::new(LoginCodeConfig::default());
//! let code = store.issue("ada@example.com").expect("store has capacity");
//!
//! assert!(store.verify("ada@example.com", &code).is_ok());
//! // Codes are single-use.
//! assert!(store.verify("ada@example.com", &code).is_err());
//! ```

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use rand::Rng;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::validation::{email_fingerprint, LOGIN_CODE_LENGTH};

/// Default code lifetime (10 minutes).
const DEFAULT_TTL_SECS: u64 = 600;

/// Wrong guesses tolerated before a code is invalidated.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Maximum number of outstanding codes.
const DEFAULT_MAX_CAPACITY: usize = 10_000;

/// Errors that can occur while issuing or checking login codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginCodeError {
    /// Too many outstanding codes.
    #[error("login code store at maximum capacity ({max_capacity} codes)")]
    AtCapacity { max_capacity: usize },

    /// No code is outstanding for the address.
    #[error("no login code pending")]
    NotFound,

    /// The code outlived its TTL.
    #[error("login code expired")]
    Expired,

    /// The code did not match.
    #[error("login code mismatch ({remaining_attempts} attempts left)")]
    Mismatch { remaining_attempts: u32 },

    /// The last allowed attempt failed; the code is gone.
    #[error("too many failed attempts")]
    TooManyAttempts,
}

/// Configuration for the login code store.
#[derive(Debug, Clone)]
pub struct LoginCodeConfig {
    pub ttl: Duration,
    pub max_attempts: u32,
    pub max_capacity: usize,
}

impl Default for LoginCodeConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

impl LoginCodeConfig {
    /// Default configuration with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct PendingCode {
    code: String,
    expires_at: Instant,
    failed_attempts: u32,
}

impl PendingCode {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe in-memory store of outstanding login codes.
pub struct LoginCodeStore {
    codes: RwLock<HashMap<String, PendingCode>>,
    config: LoginCodeConfig,
}

impl LoginCodeStore {
    pub fn new(config: LoginCodeConfig) -> Self {
        debug!(
            ttl_secs = config.ttl.as_secs(),
            max_attempts = config.max_attempts,
            max_capacity = config.max_capacity,
            "Creating login code store"
        );
        Self {
            codes: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Code lifetime.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Issues a fresh code for `email`, replacing any earlier one.
    ///
    /// The failed-attempt count of an unexpired earlier code is kept, so
    /// re-requesting never buys extra guesses.
    ///
    /// # Errors
    ///
    /// Returns [`LoginCodeError::AtCapacity`] if the store is full and the
    /// address has no code to replace.
    pub fn issue(&self, email: &str) -> Result<String, LoginCodeError> {
        let code = generate_login_code();

        let mut codes = self.codes.write().unwrap();

        if codes.len() >= self.config.max_capacity && !codes.contains_key(email) {
            codes.retain(|_, pending| !pending.is_expired());
            if codes.len() >= self.config.max_capacity {
                warn!(
                    max_capacity = self.config.max_capacity,
                    "Login code store at capacity, rejecting new code"
                );
                return Err(LoginCodeError::AtCapacity {
                    max_capacity: self.config.max_capacity,
                });
            }
        }

        let failed_attempts = codes
            .get(email)
            .filter(|pending| !pending.is_expired())
            .map_or(0, |pending| pending.failed_attempts);

        codes.insert(
            email.to_string(),
            PendingCode {
                code: code.clone(),
                expires_at: Instant::now() + self.config.ttl,
                failed_attempts,
            },
        );

        trace!(
            address = %email_fingerprint(email),
            ttl_secs = self.config.ttl.as_secs(),
            "Issued login code"
        );

        Ok(code)
    }

    /// Checks `code` for `email`, consuming it on success.
    pub fn verify(&self, email: &str, code: &str) -> Result<(), LoginCodeError> {
        let mut codes = self.codes.write().unwrap();

        let pending = codes.get_mut(email).ok_or(LoginCodeError::NotFound)?;

        if pending.is_expired() {
            codes.remove(email);
            trace!(address = %email_fingerprint(email), "Removed expired login code");
            return Err(LoginCodeError::Expired);
        }

        if bool::from(pending.code.as_bytes().ct_eq(code.as_bytes())) {
            codes.remove(email);
            trace!(address = %email_fingerprint(email), "Login code accepted");
            return Ok(());
        }

        pending.failed_attempts += 1;
        if pending.failed_attempts >= self.config.max_attempts {
            codes.remove(email);
            warn!(
                address = %email_fingerprint(email),
                "Login code invalidated after too many failed attempts"
            );
            return Err(LoginCodeError::TooManyAttempts);
        }

        Err(LoginCodeError::Mismatch {
            remaining_attempts: self.config.max_attempts - pending.failed_attempts,
        })
    }

    /// Removes the pending code for `email`, if any.
    pub fn revoke(&self, email: &str) -> bool {
        self.codes.write().unwrap().remove(email).is_some()
    }

    /// Removes every expired code. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut codes = self.codes.write().unwrap();
        let initial_len = codes.len();
        codes.retain(|_, pending| !pending.is_expired());
        let removed = initial_len - codes.len();

        if removed > 0 {
            debug!(removed_count = removed, "Cleaned up expired login codes");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.codes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.read().unwrap().is_empty()
    }
}

impl Default for LoginCodeStore {
    fn default() -> Self {
        Self::new(LoginCodeConfig::default())
    }
}

impl std::fmt::Debug for LoginCodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.codes.read().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("LoginCodeStore")
            .field("pending_count", &len)
            .field("config", &self.config)
            .finish()
    }
}

/// Generates a uniformly random code of [`LOGIN_CODE_LENGTH`] digits.
fn generate_login_code() -> String {
    let mut rng = rand::rng();
    (0..LOGIN_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
