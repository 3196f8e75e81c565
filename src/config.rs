//! Command-line and environment configuration.

use clap::Parser;

use crate::compose::{DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE};

/// Forwards marked chat messages to mail recipients.
#[derive(Debug, Parser)]
#[command(name = "mailbridge", version, about)]
pub struct Settings {
    /// Chat server url (http://<HOST>:<PORT>)
    #[arg(long, env = "MAILBRIDGE_CHAT_URL", default_value = "http://127.0.0.1:8065")]
    pub chat_url: String,

    /// Chat login user
    #[arg(long, env = "MAILBRIDGE_CHAT_USER", default_value = "mailbridge")]
    pub chat_user: String,

    /// Chat login password
    #[arg(long, env = "MAILBRIDGE_CHAT_PASS", default_value = "egdirbliam")]
    pub chat_pass: String,

    /// Mail server host
    #[arg(long, env = "MAILBRIDGE_MAIL_HOST", default_value = "127.0.0.1")]
    pub mail_host: String,

    /// Mail server port
    #[arg(long, env = "MAILBRIDGE_MAIL_PORT", default_value_t = 25)]
    pub mail_port: u16,

    /// Mail login user, also used as the From address
    #[arg(long, env = "MAILBRIDGE_MAIL_USER", default_value = "mailbridge@localhost")]
    pub mail_user: String,

    /// Mail login password
    #[arg(long, env = "MAILBRIDGE_MAIL_PASS", default_value = "egdirbliam")]
    pub mail_pass: String,

    /// Use a direct TLS session instead of STARTTLS
    #[arg(long, env = "MAILBRIDGE_MAIL_USE_TLS")]
    pub mail_use_tls: bool,

    /// Mail subject template (fields: user, channel, content)
    #[arg(long, env = "MAILBRIDGE_MAIL_SUBJECT", default_value = DEFAULT_SUBJECT_TEMPLATE)]
    pub mail_subject: String,

    /// Mail body template (fields: user, channel, content)
    #[arg(long, env = "MAILBRIDGE_MAIL_BODY", default_value = DEFAULT_BODY_TEMPLATE)]
    pub mail_body: String,

    /// Marker to recipient table, e.g. 'user1=user1@mail.com,user2=abc@mail.com'
    #[arg(long, env = "MAILBRIDGE_FORWARD")]
    pub forward: String,

    /// Enable verbose / debug output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Settings {
    /// Default log filter derived from the verbosity flags; `RUST_LOG`
    /// overrides it.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_table_is_mandatory() {
        assert!(Settings::try_parse_from(["mailbridge"]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let settings =
            Settings::try_parse_from(["mailbridge", "--forward", "ml=ml@mail.com"]).unwrap();
        assert_eq!(settings.chat_url, "http://127.0.0.1:8065");
        assert_eq!(settings.mail_port, 25);
        assert!(!settings.mail_use_tls);
        assert_eq!(settings.mail_body, DEFAULT_BODY_TEMPLATE);
        assert_eq!(settings.log_level(), "info");
    }

    #[test]
    fn verbosity_flags_pick_the_filter() {
        let settings =
            Settings::try_parse_from(["mailbridge", "--forward", "a=b@c", "-v"]).unwrap();
        assert_eq!(settings.log_level(), "debug");

        let settings =
            Settings::try_parse_from(["mailbridge", "--forward", "a=b@c", "-q"]).unwrap();
        assert_eq!(settings.log_level(), "error");

        assert!(Settings::try_parse_from(["mailbridge", "--forward", "a=b@c", "-v", "-q"]).is_err());
    }
}
