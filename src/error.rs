//! Error types for mailbridge.
//!
//! The three domains never mix: configuration errors are fatal at
//! startup, chat errors propagate to the supervisor, mail errors are
//! contained per recipient and reported back into the chat.

/// Configuration-related errors. These are fatal at startup and never
/// reach the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("forward table is mandatory - example: 'user1=user1@mail.com,user2=abc@mail.com'")]
    MissingForwardTable,

    #[error("invalid forward mapping '{entry}' - valid example: 'user=abc@mail.com'")]
    InvalidForwardMapping { entry: String },

    #[error("invalid {name} template: {reason}")]
    InvalidTemplate { name: &'static str, reason: String },

    #[error("invalid chat url '{url}' - expected format: 'http://<HOST>:<PORT>' - {reason}")]
    InvalidChatUrl { url: String, reason: String },
}

/// Chat-transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("connect to chat server failed: {reason}")]
    Connect { reason: String },

    #[error("chat login failed for '{login_id}': {reason}")]
    AuthFailed { login_id: String, reason: String },

    #[error("chat connection lost: {reason}")]
    Disconnected { reason: String },

    #[error("failed to post message in channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },
}

/// Mail-delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid {field} address '{value}': {reason}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to build mail message: {0}")]
    Build(String),

    #[error("failed to send mail to {to}: {reason}")]
    SendFailed { to: String, reason: String },
}
