//! Connection supervisor — keeps the chat link alive forever.
//!
//! Two states: disconnected (connect with a fixed retry delay) and
//! connected (run the dispatch loop). The dispatch loop only ever returns
//! with an error, after which the supervisor reconnects immediately; the
//! retry delay applies to failed connect attempts only.

use std::time::Duration;

use tracing::{error, info};

use crate::chat::Connector;
use crate::compose::MailComposer;
use crate::dispatch::dispatch;
use crate::mail::MailSender;
use crate::markers::ForwardMapping;

/// Delay between failed connect attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Run the bridge until the process is killed.
pub async fn run(
    connector: &dyn Connector,
    mail: &dyn MailSender,
    composer: &MailComposer,
    mappings: &[ForwardMapping],
    use_tls: bool,
) {
    loop {
        info!("connecting to chat server ...");
        match connector.connect().await {
            Err(e) => {
                error!("{e}");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Ok(chat) => {
                info!("connected to chat server");
                let err = dispatch(chat.as_ref(), mail, composer, mappings, use_tls).await;
                error!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{MockChatServer, MockConnector};
    use crate::compose::{DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE};
    use crate::error::ChatError;
    use crate::mail::MockMailSender;

    fn composer() -> MailComposer {
        MailComposer::new(
            "bridge@localhost",
            DEFAULT_SUBJECT_TEMPLATE,
            DEFAULT_BODY_TEMPLATE,
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_error_triggers_exactly_one_immediate_reconnect() {
        let server = MockChatServer::new();
        server.trigger_error(ChatError::Disconnected {
            reason: "link lost".to_string(),
        });

        let connector = MockConnector::new(vec![server]);
        let mail = MockMailSender::new();
        let composer = composer();
        let mappings = vec![ForwardMapping::new("ml", "ml@mail.com")];

        // connect #1 succeeds, dispatch fails at once, connect #2 (the one
        // reconnect) fails and enters the retry delay, which outlives the
        // test window
        let _ = tokio::time::timeout(
            Duration::from_millis(10),
            run(&connector, &mail, &composer, &mappings, false),
        )
        .await;

        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_retry_with_fixed_delay() {
        let connector = MockConnector::new(Vec::new());
        let mail = MockMailSender::new();
        let composer = composer();
        let mappings = vec![ForwardMapping::new("ml", "ml@mail.com")];

        // attempts at t = 0, 2s, 4s, 6s; window closes just after 6s
        let _ = tokio::time::timeout(
            CONNECT_RETRY_DELAY * 3 + Duration::from_millis(5),
            run(&connector, &mail, &composer, &mappings, false),
        )
        .await;

        assert_eq!(connector.attempts(), 4);
    }
}
