//! Plain messaging tests: formatting fallback, pin, timed delete, files, waits.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use telegram_activities::events::{EventRegistry, InboundContent, InboundMessage};
use telegram_activities::gateway::{ConversationId, MessageId, TextFormat};
use telegram_activities::messaging::{
    FileAttachment, Formatting, Messenger, MessagingError, OutgoingMessage, Reply, NO_MESSAGE,
};

use crate::fake_gateway::{wait_until, Call, FakeGateway, Op};

fn setup() -> (Arc<FakeGateway>, Arc<EventRegistry>, Arc<Messenger>) {
    let gateway = Arc::new(FakeGateway::new());
    let registry = Arc::new(EventRegistry::new());
    let messenger = Arc::new(Messenger::new(
        gateway.clone(),
        Arc::clone(&registry),
        TextFormat::Html,
    ));
    (gateway, registry, messenger)
}

fn message(text: &str) -> OutgoingMessage {
    OutgoingMessage {
        user_id: 42,
        text: text.to_owned(),
        ..OutgoingMessage::default()
    }
}

#[tokio::test]
async fn sends_rich_text_first() {
    let (gateway, _, messenger) = setup();

    let sent = messenger.send_message(message("<b>hi</b>")).await.expect("send");

    assert_eq!(sent.formatting, Formatting::Rich);
    assert_eq!(sent.message_id, 100);
    match &gateway.calls()[0] {
        Call::SendMessage { format, .. } => assert_eq!(*format, TextFormat::Html),
        other => panic!("expected SendMessage, got {other:?}"),
    }
}

#[tokio::test]
async fn formatting_failure_falls_back_to_plain() {
    let (gateway, _, messenger) = setup();
    gateway.fail(Op::SendRichMessage);

    let sent = messenger.send_message(message("<b>broken")).await.expect("send");

    assert_eq!(sent.formatting, Formatting::Plain);
    assert_eq!(sent.message_id, 100);
    match &gateway.calls()[0] {
        Call::SendMessage { format, text, .. } => {
            assert_eq!(*format, TextFormat::Plain);
            assert_eq!(text, "<b>broken");
        }
        other => panic!("expected SendMessage, got {other:?}"),
    }
}

#[tokio::test]
async fn total_send_failure_reports_no_message() {
    let (gateway, _, messenger) = setup();
    gateway.fail(Op::SendMessage);

    let sent = messenger.send_message(message("hi")).await.expect("send");

    assert_eq!(sent.message_id, NO_MESSAGE);
    assert_eq!(sent.formatting, Formatting::Failed);
}

#[tokio::test]
async fn pin_failure_is_surfaced() {
    let (gateway, _, messenger) = setup();
    gateway.fail(Op::Pin);

    let result = messenger
        .send_message(OutgoingMessage {
            pin: true,
            ..message("pinned")
        })
        .await;

    assert!(matches!(result, Err(MessagingError::Pin(_))));
}

#[tokio::test]
async fn pin_without_message_is_an_error() {
    let (gateway, _, messenger) = setup();
    gateway.fail(Op::SendMessage);

    let result = messenger
        .send_message(OutgoingMessage {
            pin: true,
            ..message("pinned")
        })
        .await;

    assert!(matches!(result, Err(MessagingError::NothingToPin)));
}

#[tokio::test]
async fn pin_targets_sent_message() {
    let (gateway, _, messenger) = setup();

    messenger
        .send_message(OutgoingMessage {
            pin: true,
            ..message("pinned")
        })
        .await
        .expect("send");

    assert!(gateway.calls().contains(&Call::Pin {
        chat: ConversationId(42),
        message: MessageId(100),
    }));
}

#[tokio::test(start_paused = true)]
async fn timed_delete_fires_after_delay() {
    let (gateway, _, messenger) = setup();

    messenger
        .send_message(OutgoingMessage {
            delete_after: Some(Duration::from_secs(5)),
            ..message("ephemeral")
        })
        .await
        .expect("send");

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(gateway.deleted().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let g = Arc::clone(&gateway);
    wait_until(|| g.deleted() == vec![MessageId(100)]).await;
}

#[tokio::test]
async fn attachment_is_decoded_and_sent_after_text() {
    let (gateway, _, messenger) = setup();
    let payload = base64::engine::general_purpose::STANDARD.encode(b"report body");

    messenger
        .send_message(OutgoingMessage {
            file: Some(FileAttachment {
                base64: payload,
                name: "report.txt".to_owned(),
            }),
            ..message("see attached")
        })
        .await
        .expect("send");

    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1],
        Call::SendDocument {
            chat: ConversationId(42),
            bytes: b"report body".to_vec(),
            name: "report.txt".to_owned(),
        }
    );
}

#[tokio::test]
async fn attachment_is_sent_even_when_text_fails() {
    let (gateway, _, messenger) = setup();
    gateway.fail(Op::SendMessage);
    let payload = base64::engine::general_purpose::STANDARD.encode(b"x");

    let sent = messenger
        .send_message(OutgoingMessage {
            file: Some(FileAttachment {
                base64: payload,
                name: "x.bin".to_owned(),
            }),
            ..message("text")
        })
        .await
        .expect("send");

    assert_eq!(sent.message_id, NO_MESSAGE);
    assert!(gateway
        .calls()
        .iter()
        .any(|c| matches!(c, Call::SendDocument { .. })));
}

#[tokio::test]
async fn invalid_base64_is_skipped() {
    let (gateway, _, messenger) = setup();

    let sent = messenger
        .send_message(OutgoingMessage {
            file: Some(FileAttachment {
                base64: "***not base64***".to_owned(),
                name: "x.bin".to_owned(),
            }),
            ..message("text")
        })
        .await
        .expect("send");

    assert_eq!(sent.message_id, 100);
    assert_eq!(gateway.calls().len(), 1);
}

#[tokio::test]
async fn update_and_delete_swallow_failures() {
    let (gateway, _, messenger) = setup();
    gateway.fail(Op::Edit);
    gateway.fail(Op::Delete);

    messenger.update_message(42, 7, "edited").await;
    messenger.delete_message(42, 7).await;

    assert_eq!(
        gateway.calls(),
        vec![
            Call::Edit {
                chat: ConversationId(42),
                message: MessageId(7),
                text: "edited".to_owned(),
            },
            Call::Delete {
                chat: ConversationId(42),
                message: MessageId(7),
            },
        ]
    );
}

#[tokio::test]
async fn wait_for_message_returns_text_from_requested_user() {
    let (_, registry, messenger) = setup();

    let m = Arc::clone(&messenger);
    let task = tokio::spawn(async move { m.wait_for_message(42).await });
    let r = Arc::clone(&registry);
    wait_until(|| r.waiting_conversations() == 1).await;

    registry.dispatch_message(InboundMessage {
        conversation: ConversationId(99),
        content: InboundContent::Text("someone else".to_owned()),
    });
    registry.dispatch_message(InboundMessage {
        conversation: ConversationId(42),
        content: InboundContent::Text("mine".to_owned()),
    });

    let reply = task.await.expect("task").expect("reply");
    assert_eq!(reply, Reply::Text("mine".to_owned()));
}

#[tokio::test]
async fn wait_for_message_resolves_photo_link() {
    let (_, registry, messenger) = setup();

    let m = Arc::clone(&messenger);
    let task = tokio::spawn(async move { m.wait_for_message(42).await });
    let r = Arc::clone(&registry);
    wait_until(|| r.waiting_conversations() == 1).await;

    registry.dispatch_message(InboundMessage {
        conversation: ConversationId(42),
        content: InboundContent::Photo {
            file_id: "big-photo".to_owned(),
        },
    });

    let reply = task.await.expect("task").expect("reply");
    assert_eq!(reply, Reply::Image("https://files.example/big-photo".to_owned()));
    assert_eq!(
        serde_json::to_value(&reply).expect("json"),
        serde_json::json!({"imageURL": "https://files.example/big-photo"})
    );
}

#[test]
fn text_reply_serializes_with_text_key() {
    let value = serde_json::to_value(Reply::Text("hi".to_owned())).expect("json");
    assert_eq!(value, serde_json::json!({"text": "hi"}));
}
