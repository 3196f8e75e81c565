//! The dispatch loop — consumes chat events and fans marked messages out
//! to their mail recipients.
//!
//! The loop blocks until the chat event stream yields a terminal error and
//! returns that error to the supervisor. A mail that cannot be delivered is
//! reported back into the originating chat thread as a reply; a reply that
//! cannot be posted is logged and dropped.

use tracing::{debug, error, info};

use crate::chat::{ChatMessage, ChatServer};
use crate::compose::MailComposer;
use crate::error::ChatError;
use crate::mail::MailSender;
use crate::markers::{ForwardMapping, extract_markers};

/// Consume chat events until the connection dies; returns the terminal
/// error. Messages are processed strictly sequentially, recipients of one
/// message in marker-extraction order.
pub async fn dispatch(
    chat: &dyn ChatServer,
    mail: &dyn MailSender,
    composer: &MailComposer,
    mappings: &[ForwardMapping],
    use_tls: bool,
) -> ChatError {
    let mut events = match chat.listen().await {
        Ok(events) => events,
        Err(e) => return e,
    };

    info!("observing chat for messages to forward");
    loop {
        tokio::select! {
            // drain already-delivered messages before a queued terminal error
            biased;

            msg = events.messages.recv() => {
                let Some(msg) = msg else {
                    // transport task exited; prefer its terminal error if queued
                    return match events.errors.try_recv() {
                        Ok(err) => err,
                        Err(_) => ChatError::Disconnected {
                            reason: "chat message stream closed".to_string(),
                        },
                    };
                };
                forward_message(chat, mail, composer, mappings, use_tls, &msg).await;
            }

            err = events.errors.recv() => {
                return err.unwrap_or(ChatError::Disconnected {
                    reason: "chat error stream closed".to_string(),
                });
            }
        }
    }
}

/// Handle one inbound message: extract markers, send one mail per matched
/// mapping, report failures into the chat thread.
async fn forward_message(
    chat: &dyn ChatServer,
    mail: &dyn MailSender,
    composer: &MailComposer,
    mappings: &[ForwardMapping],
    use_tls: bool,
    msg: &ChatMessage,
) {
    let parsed = extract_markers(&msg.text, mappings);
    if !parsed.found() {
        debug!(
            "ignoring message from '{}' - no configured marker",
            msg.user_name
        );
        return;
    }

    info!(
        "{} marker(s) found - chat message from: {}, in channel: {} - forwarding to each recipient",
        parsed.mappings.len(),
        msg.user_name,
        msg.channel_name
    );

    for mapping in &parsed.mappings {
        info!(
            "forwarding message with marker '@{}' to {}",
            mapping.marker, mapping.mail_addr
        );

        let outbound = composer.compose(msg, &parsed.content, &mapping.mail_addr);
        match mail.send(&outbound, use_tls).await {
            Ok(()) => debug!("mail to {} delivered", mapping.mail_addr),
            Err(mail_err) => {
                error!("unable to send mail - notifying user in chat - mail error: {mail_err}");
                let reply = ChatMessage::reply(msg, format!("mailbridge error: {mail_err}"));
                if let Err(chat_err) = chat.send(&reply).await {
                    error!(
                        "unable to notify user about the mail error - chat error: {chat_err}"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChatServer;
    use crate::compose::{DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE};
    use crate::mail::MockMailSender;

    fn composer() -> MailComposer {
        MailComposer::new(
            "bridge@localhost",
            DEFAULT_SUBJECT_TEMPLATE,
            DEFAULT_BODY_TEMPLATE,
        )
        .unwrap()
    }

    fn table() -> Vec<ForwardMapping> {
        vec![ForwardMapping::new("ml", "ml@mail.com")]
    }

    fn message(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            user_name: "test-user".to_string(),
            channel_id: "c1".to_string(),
            channel_name: "test-channel".to_string(),
            text: text.to_string(),
            ..ChatMessage::default()
        }
    }

    fn terminal_error() -> ChatError {
        ChatError::Disconnected {
            reason: "test-error".to_string(),
        }
    }

    #[tokio::test]
    async fn forwards_only_messages_with_leading_marker() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();

        for text in [
            "without prefix",
            "@ml with prefix",
            "@mlwith prefix but without a space",
            "@ml,also with prefix",
        ] {
            chat.trigger_message(message("m", text));
        }
        chat.trigger_error(terminal_error());

        dispatch(&chat, &mail, &composer(), &table(), false).await;

        let sent = mail.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, "with prefix");
        assert_eq!(sent[1].body, "also with prefix");
        assert!(sent.iter().all(|m| m.header.to == "ml@mail.com"));
    }

    #[tokio::test]
    async fn returns_the_terminal_error_verbatim() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();

        chat.trigger_error(terminal_error());

        let err = dispatch(&chat, &mail, &composer(), &table(), false).await;
        assert!(matches!(err, ChatError::Disconnected { reason } if reason == "test-error"));
    }

    #[tokio::test]
    async fn drains_queued_messages_before_the_terminal_error() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();

        chat.trigger_message(message("m1", "@ml first"));
        chat.trigger_message(message("m2", "@ml second"));
        chat.trigger_error(terminal_error());

        let err = dispatch(&chat, &mail, &composer(), &table(), false).await;

        assert!(matches!(err, ChatError::Disconnected { .. }));
        let sent = mail.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, "first");
        assert_eq!(sent[1].body, "second");
    }

    #[tokio::test]
    async fn good_path_posts_no_chat_reply() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();

        chat.trigger_message(message("m1", "@ml dummy message"));
        chat.trigger_error(terminal_error());

        dispatch(&chat, &mail, &composer(), &table(), false).await;

        assert_eq!(mail.sent().len(), 1);
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_is_reported_as_chained_reply() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();
        mail.fail_with("mail-mock-test-error");

        chat.trigger_message(message("msg-42", "@ml dummy message"));
        chat.trigger_error(terminal_error());

        dispatch(&chat, &mail, &composer(), &table(), false).await;

        let replies = chat.sent();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("mail-mock-test-error"));
        assert_eq!(replies[0].reply_to_id, "msg-42");
        assert_eq!(replies[0].channel_id, "c1");
    }

    #[tokio::test]
    async fn failing_recipient_does_not_stop_the_fan_out() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();
        mail.fail_with("always down");

        let table = vec![
            ForwardMapping::new("user1", "a@mail.com"),
            ForwardMapping::new("user2", "b@mail.com"),
        ];
        chat.trigger_message(message("m1", "@user1 @user2 test message"));
        chat.trigger_error(terminal_error());

        dispatch(&chat, &mail, &composer(), &table, false).await;

        // one failure reply per attempted recipient
        assert_eq!(chat.sent().len(), 2);
    }

    #[tokio::test]
    async fn reply_failure_is_logged_and_dropped() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();
        mail.fail_with("mail down");
        chat.fail_sends_with("chat down too");

        chat.trigger_message(message("m1", "@ml one"));
        chat.trigger_message(message("m2", "@ml two"));
        chat.trigger_error(terminal_error());

        // the loop must survive both failures and still return the
        // terminal error
        let err = dispatch(&chat, &mail, &composer(), &table(), false).await;
        assert!(matches!(err, ChatError::Disconnected { .. }));
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn repeated_marker_sends_duplicate_mail() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();

        chat.trigger_message(message("m1", "@ml @ml twice"));
        chat.trigger_error(terminal_error());

        dispatch(&chat, &mail, &composer(), &table(), false).await;

        let sent = mail.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.body == "twice"));
    }

    #[tokio::test]
    async fn listen_failure_is_returned_immediately() {
        let chat = MockChatServer::new();
        let mail = MockMailSender::new();

        // exhaust the one allowed listen call
        let _events = chat.listen().await.unwrap();

        let err = dispatch(&chat, &mail, &composer(), &table(), false).await;
        assert!(matches!(err, ChatError::Disconnected { .. }));
        assert!(mail.sent().is_empty());
    }
}
