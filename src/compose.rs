//! Mail composition from chat messages via configurable templates.

use chrono::Utc;
use minijinja::{Environment, Value, context};
use tracing::error;

use crate::chat::ChatMessage;
use crate::error::ConfigError;
use crate::mail::{MailHeader, OutboundMail};

pub const DEFAULT_SUBJECT_TEMPLATE: &str =
    "Forwarding from chat: {{ user }} writes in channel {{ channel }}";
pub const DEFAULT_BODY_TEMPLATE: &str = "{{ content }}";

/// Renders outbound mails from chat messages.
///
/// Both templates are compiled once at construction; a syntax error is a
/// fatal configuration error. Template context: `user`, `channel`,
/// `content`.
#[derive(Debug)]
pub struct MailComposer {
    env: Environment<'static>,
    from: String,
}

impl MailComposer {
    pub fn new(
        from: impl Into<String>,
        subject_template: &str,
        body_template: &str,
    ) -> Result<Self, ConfigError> {
        let mut env = Environment::new();
        env.add_template_owned("subject".to_string(), subject_template.to_string())
            .map_err(|e| ConfigError::InvalidTemplate {
                name: "subject",
                reason: e.to_string(),
            })?;
        env.add_template_owned("body".to_string(), body_template.to_string())
            .map_err(|e| ConfigError::InvalidTemplate {
                name: "body",
                reason: e.to_string(),
            })?;
        Ok(Self {
            env,
            from: from.into(),
        })
    }

    /// Compose a mail to `to`, filling the templates from the message
    /// metadata and the marker-stripped `content`.
    pub fn compose(&self, msg: &ChatMessage, content: &str, to: &str) -> OutboundMail {
        let ctx = context! {
            user => msg.user_name.as_str(),
            channel => msg.channel_name.as_str(),
            content => content,
        };

        OutboundMail {
            header: MailHeader {
                from: self.from.clone(),
                to: to.to_string(),
                subject: self.render("subject", &ctx),
                date: Utc::now(),
            },
            body: self.render("body", &ctx),
        }
    }

    /// Render one template. A failure here (templates are validated at
    /// startup, so this is unexpected) is surfaced in-band as the rendered
    /// text so the operator sees it in the delivered mail.
    fn render(&self, name: &str, ctx: &Value) -> String {
        match self.env.get_template(name).and_then(|t| t.render(ctx)) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!("rendering the {name} template failed: {e}");
                e.to_string()
            }
        }
    }
}
