//! Mattermost chat server — REST API v4 for login/posting, websocket for
//! the inbound event stream.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::chat::{ChatEvents, ChatMessage, ChatServer, Connector};
use crate::error::ChatError;

#[derive(Serialize)]
struct LoginRequest<'a> {
    login_id: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct User {
    username: String,
}

#[derive(Deserialize)]
struct Channel {
    name: String,
}

/// The `data.post` payload of a `posted` websocket event. Mattermost
/// delivers it as a JSON string nested inside the event JSON.
#[derive(Deserialize)]
struct Post {
    id: String,
    user_id: String,
    channel_id: String,
    message: String,
    #[serde(default)]
    root_id: String,
}

#[derive(Serialize)]
struct PostRequest<'a> {
    channel_id: &'a str,
    message: &'a str,
    root_id: &'a str,
}

/// A logged-in Mattermost session.
#[derive(Clone)]
pub struct MattermostServer {
    base_url: Url,
    client: reqwest::Client,
    token: String,
}

impl MattermostServer {
    /// Log in and return a session handle.
    pub async fn connect(
        base_url: Url,
        login_id: &str,
        password: &str,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::new();

        debug!("trying to log in with login id '{login_id}'");
        let resp = client
            .post(api_url(&base_url, "users/login"))
            .json(&LoginRequest { login_id, password })
            .send()
            .await
            .map_err(|e| ChatError::Connect {
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::AuthFailed {
                login_id: login_id.to_string(),
                reason: format!("{status} {body}"),
            });
        }

        let token = resp
            .headers()
            .get("Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| ChatError::AuthFailed {
                login_id: login_id.to_string(),
                reason: "login response carried no session token".to_string(),
            })?;

        debug!("login succeeded for login id '{login_id}'");
        Ok(Self {
            base_url,
            client,
            token,
        })
    }

    fn api_url(&self, path: &str) -> String {
        api_url(&self.base_url, path)
    }

    /// Websocket endpoint derived from the REST url (http -> ws, https -> wss).
    fn websocket_url(&self) -> String {
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        let host = self.base_url.host_str().unwrap_or("127.0.0.1");
        match self.base_url.port() {
            Some(port) => format!("{scheme}://{host}:{port}/api/v4/websocket"),
            None => format!("{scheme}://{host}/api/v4/websocket"),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, reqwest::Error> {
        self.client
            .get(self.api_url(path))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }

    /// Resolve a user id to its username; falls back to `id:<raw>`.
    async fn user_name(&self, user_id: &str) -> String {
        match self.get_json::<User>(&format!("users/{user_id}")).await {
            Ok(user) => user.username,
            Err(e) => {
                debug!("user lookup for '{user_id}' failed: {e}");
                format!("id:{user_id}")
            }
        }
    }

    /// Resolve a channel id to its name; falls back to `id:<raw>`.
    async fn channel_name(&self, channel_id: &str) -> String {
        match self.get_json::<Channel>(&format!("channels/{channel_id}")).await {
            Ok(channel) => channel.name,
            Err(e) => {
                debug!("channel lookup for '{channel_id}' failed: {e}");
                format!("id:{channel_id}")
            }
        }
    }
}

#[async_trait]
impl ChatServer for MattermostServer {
    async fn send(&self, msg: &ChatMessage) -> Result<(), ChatError> {
        debug!(channel = %msg.channel_name, "posting chat message: {}", msg.text);
        let post = PostRequest {
            channel_id: &msg.channel_id,
            message: &msg.text,
            root_id: &msg.reply_to_id,
        };

        let resp = self
            .client
            .post(self.api_url("posts"))
            .bearer_auth(&self.token)
            .json(&post)
            .send()
            .await
            .map_err(|e| ChatError::SendFailed {
                channel: msg.channel_name.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::SendFailed {
                channel: msg.channel_name.clone(),
                reason: format!("{status} {body}"),
            });
        }

        Ok(())
    }

    async fn listen(&self) -> Result<ChatEvents, ChatError> {
        let ws_url = self.websocket_url();
        let (mut socket, _) =
            connect_async(ws_url.as_str())
                .await
                .map_err(|e| ChatError::Connect {
                    reason: format!("websocket connect to {ws_url} failed: {e}"),
                })?;

        // Authenticate the socket with the REST session token.
        let challenge = serde_json::json!({
            "seq": 1,
            "action": "authentication_challenge",
            "data": { "token": self.token },
        });
        socket
            .send(WsMessage::text(challenge.to_string()))
            .await
            .map_err(|e| ChatError::Connect {
                reason: format!("websocket authentication failed: {e}"),
            })?;

        info!("listening on {ws_url}");

        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::channel(1);
        let server = self.clone();

        tokio::spawn(async move {
            loop {
                match socket.next().await {
                    Some(Ok(WsMessage::Text(raw))) => {
                        let Ok(event) = serde_json::from_str::<serde_json::Value>(raw.as_str())
                        else {
                            warn!("discarding unparseable websocket frame");
                            continue;
                        };
                        if event.get("event").and_then(serde_json::Value::as_str) != Some("posted")
                        {
                            continue;
                        }
                        let Some(post_raw) = event
                            .get("data")
                            .and_then(|d| d.get("post"))
                            .and_then(serde_json::Value::as_str)
                        else {
                            continue;
                        };
                        let Ok(post) = serde_json::from_str::<Post>(post_raw) else {
                            warn!("discarding malformed post payload");
                            continue;
                        };

                        let user_name = server.user_name(&post.user_id).await;
                        let channel_name = server.channel_name(&post.channel_id).await;
                        debug!("publishing new message from '{user_name}' in channel '{channel_name}'");

                        let msg = ChatMessage {
                            id: post.id,
                            user_id: post.user_id,
                            user_name,
                            channel_id: post.channel_id,
                            channel_name,
                            text: post.message,
                            reply_to_id: post.root_id,
                        };
                        if msg_tx.send(msg).is_err() {
                            // consumer gone, stop reading
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        let _ = err_tx
                            .send(ChatError::Disconnected {
                                reason: "websocket closed by server".to_string(),
                            })
                            .await;
                        return;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary frames
                    Some(Err(e)) => {
                        let _ = err_tx
                            .send(ChatError::Disconnected {
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(ChatEvents {
            messages: msg_rx,
            errors: err_rx,
        })
    }
}

fn api_url(base_url: &Url, path: &str) -> String {
    format!("{}/api/v4/{path}", base_url.as_str().trim_end_matches('/'))
}

/// Connector that establishes fresh Mattermost sessions for the supervisor.
pub struct MattermostConnector {
    url: Url,
    login_id: String,
    password: String,
}

impl MattermostConnector {
    pub fn new(url: Url, login_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url,
            login_id: login_id.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Connector for MattermostConnector {
    async fn connect(&self) -> Result<Box<dyn ChatServer>, ChatError> {
        let server =
            MattermostServer::connect(self.url.clone(), &self.login_id, &self.password).await?;
        Ok(Box::new(server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_follows_rest_scheme() {
        let server = MattermostServer {
            base_url: Url::parse("http://127.0.0.1:8065").unwrap(),
            client: reqwest::Client::new(),
            token: "t".to_string(),
        };
        assert_eq!(server.websocket_url(), "ws://127.0.0.1:8065/api/v4/websocket");

        let server = MattermostServer {
            base_url: Url::parse("https://chat.example.org").unwrap(),
            client: reqwest::Client::new(),
            token: "t".to_string(),
        };
        assert_eq!(server.websocket_url(), "wss://chat.example.org/api/v4/websocket");
    }

    #[test]
    fn api_url_joins_without_double_slash() {
        let base = Url::parse("http://127.0.0.1:8065").unwrap();
        assert_eq!(api_url(&base, "users/login"), "http://127.0.0.1:8065/api/v4/users/login");
    }
}
