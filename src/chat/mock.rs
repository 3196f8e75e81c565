//! In-memory chat server and connector for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chat::{ChatEvents, ChatMessage, ChatServer, Connector};
use crate::error::ChatError;

/// Scriptable chat server. Inbound events are pushed with
/// [`trigger_message`](Self::trigger_message) /
/// [`trigger_error`](Self::trigger_error); outbound posts are recorded.
pub struct MockChatServer {
    sent: Mutex<Vec<ChatMessage>>,
    send_error: Mutex<Option<String>>,
    msg_tx: mpsc::UnboundedSender<ChatMessage>,
    err_tx: mpsc::Sender<ChatError>,
    events: Mutex<Option<ChatEvents>>,
}

impl MockChatServer {
    pub fn new() -> Self {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::channel(1);
        Self {
            sent: Mutex::new(Vec::new()),
            send_error: Mutex::new(None),
            msg_tx,
            err_tx,
            events: Mutex::new(Some(ChatEvents {
                messages: msg_rx,
                errors: err_rx,
            })),
        }
    }

    /// Queue an inbound chat message.
    pub fn trigger_message(&self, msg: ChatMessage) {
        let _ = self.msg_tx.send(msg);
    }

    /// Queue the terminal error. Only the first trigger is delivered.
    pub fn trigger_error(&self, err: ChatError) {
        let _ = self.err_tx.try_send(err);
    }

    /// Make subsequent [`ChatServer::send`] calls fail with `reason`.
    pub fn fail_sends_with(&self, reason: impl Into<String>) {
        *self.send_error.lock().unwrap() = Some(reason.into());
    }

    /// Messages posted through this server so far.
    pub fn sent(&self) -> Vec<ChatMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for MockChatServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatServer for MockChatServer {
    async fn send(&self, msg: &ChatMessage) -> Result<(), ChatError> {
        if let Some(reason) = self.send_error.lock().unwrap().clone() {
            return Err(ChatError::SendFailed {
                channel: msg.channel_name.clone(),
                reason,
            });
        }
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }

    async fn listen(&self) -> Result<ChatEvents, ChatError> {
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChatError::Disconnected {
                reason: "listen may only be called once per connection".to_string(),
            })
    }
}

/// Connector handing out a scripted sequence of servers; once the script
/// is exhausted every further attempt fails.
pub struct MockConnector {
    servers: Mutex<Vec<MockChatServer>>,
    attempts: AtomicUsize,
}

impl MockConnector {
    /// `servers` are handed out front to back, one per connect call.
    pub fn new(servers: Vec<MockChatServer>) -> Self {
        Self {
            servers: Mutex::new(servers),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of connect calls observed so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn ChatServer>, ChatError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut servers = self.servers.lock().unwrap();
        if servers.is_empty() {
            return Err(ChatError::Connect {
                reason: "mock connect failure".to_string(),
            });
        }
        Ok(Box::new(servers.remove(0)))
    }
}
