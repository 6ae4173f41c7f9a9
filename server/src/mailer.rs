//! Outbound email.
//!
//! The server only needs two messages: a passwordless login code and an
//! event invitation. [`LogMailer`] is the shipped implementation; it writes
//! a structured log record per message instead of talking to an SMTP relay.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::Event;
use crate::validation::email_fingerprint;

/// Errors raised by a mail transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailError {
    /// The relay refused or dropped the message. Carries no address.
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Sends transactional email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_login_code(&self, to: &str, code: &str, ttl: Duration) -> Result<(), MailError>;

    async fn send_invitation(&self, to: &str, event: &Event) -> Result<(), MailError>;
}

/// Mailer that logs instead of sending.
///
/// The login code itself is only emitted at DEBUG.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl LogMailer {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_login_code(&self, to: &str, code: &str, ttl: Duration) -> Result<(), MailError> {
        info!(
            to = %to,
            expires_in_secs = ttl.as_secs(),
            "Login code email"
        );
        debug!(to = %to, code = %code, "Login code email body");
        Ok(())
    }

    async fn send_invitation(&self, to: &str, event: &Event) -> Result<(), MailError> {
        info!(
            to = %to,
            event_id = %event.id,
            event_name = %event.name,
            event_code = %event.event_code,
            "Invitation email"
        );
        Ok(())
    }
}
