//! Recording mail sender for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::MailError;
use crate::mail::{MailSender, OutboundMail};

/// Mail sender that records every delivery attempt and can be switched
/// into a failing mode.
#[derive(Default)]
pub struct MockMailSender {
    sent: Mutex<Vec<OutboundMail>>,
    error: Mutex<Option<String>>,
}

impl MockMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.error.lock().unwrap() = Some(reason.into());
    }

    /// Successfully delivered mails, in send order.
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for MockMailSender {
    async fn send(&self, mail: &OutboundMail, _use_tls: bool) -> Result<(), MailError> {
        if let Some(reason) = self.error.lock().unwrap().clone() {
            return Err(MailError::SendFailed {
                to: mail.header.to.clone(),
                reason,
            });
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
