//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use tracing::debug;

use crate::error::MailError;
use crate::mail::{MailSender, OutboundMail};

/// Mail sender backed by an SMTP server with PLAIN authentication.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    user: String,
    password: String,
}

impl SmtpMailer {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }

    /// Blocking send; runs on the blocking pool via [`MailSender::send`].
    fn send_blocking(&self, mail: &OutboundMail, use_tls: bool) -> Result<(), MailError> {
        let tls_params = TlsParameters::new(self.host.clone()).map_err(|e| {
            MailError::SendFailed {
                to: mail.header.to.clone(),
                reason: format!("TLS setup failed: {e}"),
            }
        })?;

        // Direct TLS session vs. mandatory in-session STARTTLS upgrade.
        let tls = if use_tls {
            Tls::Wrapper(tls_params)
        } else {
            Tls::Required(tls_params)
        };

        let transport = SmtpTransport::builder_dangerous(&self.host)
            .port(self.port)
            .tls(tls)
            .credentials(Credentials::new(self.user.clone(), self.password.clone()))
            .build();

        let from: Mailbox =
            mail.header
                .from
                .parse()
                .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
                    field: "from",
                    value: mail.header.from.clone(),
                    reason: e.to_string(),
                })?;
        let to: Mailbox =
            mail.header
                .to
                .parse()
                .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
                    field: "to",
                    value: mail.header.to.clone(),
                    reason: e.to_string(),
                })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.header.subject)
            .date(mail.header.date.into())
            .body(mail.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        transport
            .send(&message)
            .map_err(|e| MailError::SendFailed {
                to: mail.header.to.clone(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: &OutboundMail, use_tls: bool) -> Result<(), MailError> {
        debug!(
            "sending mail (per {}) - host: {}, from: {}, to: {}",
            if use_tls { "TLS" } else { "STARTTLS" },
            self.host,
            mail.header.from,
            mail.header.to
        );

        let mailer = self.clone();
        let to = mail.header.to.clone();
        let mail = mail.clone();
        tokio::task::spawn_blocking(move || mailer.send_blocking(&mail, use_tls))
            .await
            .map_err(|e| MailError::SendFailed {
                to,
                reason: format!("send task panicked: {e}"),
            })?
    }
}
