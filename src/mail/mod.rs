//! Mail boundary — outbound message type and sender trait.

pub mod mock;
pub mod smtp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailError;

pub use mock::MockMailSender;
pub use smtp::SmtpMailer;

/// Header fields of an outbound mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailHeader {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Wall-clock time at composition; rendered as RFC 2822 on the wire.
    pub date: DateTime<Utc>,
}

/// An outbound mail, built fresh per recipient and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub header: MailHeader,
    pub body: String,
}

/// Interface to the mail system.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Deliver one mail. `use_tls` selects a direct TLS session instead of
    /// an in-session STARTTLS upgrade.
    async fn send(&self, mail: &OutboundMail, use_tls: bool) -> Result<(), MailError>;
}
