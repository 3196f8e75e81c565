//! mailbridge — forwards marked chat messages to mail recipients.

pub mod chat;
pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mail;
pub mod markers;
pub mod supervisor;
