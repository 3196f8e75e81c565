//! Chat boundary — message type, event stream and server traits.

pub mod mattermost;
pub mod mock;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChatError;

pub use mattermost::{MattermostConnector, MattermostServer};
pub use mock::{MockChatServer, MockConnector};

/// A chat message, immutable once received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub text: String,
    /// Id of the message this one replies to; empty for top-level messages.
    pub reply_to_id: String,
}

impl ChatMessage {
    /// Build a reply to `original`, chained via `reply_to_id` and posted
    /// into the same channel.
    pub fn reply(original: &ChatMessage, text: impl Into<String>) -> Self {
        Self {
            reply_to_id: original.id.clone(),
            channel_id: original.channel_id.clone(),
            channel_name: original.channel_name.clone(),
            text: text.into(),
            ..Self::default()
        }
    }
}

/// The dual-channel event stream of one chat connection.
///
/// Messages arrive on `messages`; the transport pushes exactly one
/// terminal error on `errors` and then abandons both channels.
pub struct ChatEvents {
    pub messages: mpsc::UnboundedReceiver<ChatMessage>,
    pub errors: mpsc::Receiver<ChatError>,
}

/// Interface to a connected chat server.
#[async_trait]
pub trait ChatServer: Send + Sync {
    /// Post a message. `reply_to_id` chains the post to an existing one.
    async fn send(&self, msg: &ChatMessage) -> Result<(), ChatError>;

    /// Start listening for new messages. Returns the event stream; may be
    /// called once per connection.
    async fn listen(&self) -> Result<ChatEvents, ChatError>;
}

/// Establishes chat connections for the supervisor.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChatServer>, ChatError>;
}
