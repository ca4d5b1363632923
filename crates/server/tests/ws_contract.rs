use huddle_common::protocol::ws::{ChatFrame, ChatMessageBody};
use serde_json::Value;

const WS_SOURCE: &str = include_str!("../src/ws/mod.rs");

#[test]
fn the_chat_frame_wire_shape_is_stable() {
    let frame = ChatFrame::ChatMessage {
        workspace: Some("Wabcdefghijk".to_owned()),
        message: ChatMessageBody {
            body: Some("hello team".to_owned()),
            client_message_id: "cm-42".to_owned(),
            created_at: "2026-08-01T09:30:00Z".to_owned(),
        },
    };

    let serialized = serde_json::to_value(&frame).expect("frame should serialize");
    assert_eq!(serialized["type"], "chat-message");
    assert_eq!(serialized["workspace"], "Wabcdefghijk");
    assert_eq!(serialized["message"]["body"], "hello team");
    assert_eq!(serialized["message"]["client-message-id"], "cm-42");
    assert_eq!(serialized["message"]["createdAt"], "2026-08-01T09:30:00Z");
}

#[test]
fn fanout_frames_never_name_a_workspace() {
    let frame = ChatFrame::ChatMessage {
        workspace: Some("Wabcdefghijk".to_owned()),
        message: ChatMessageBody {
            body: None,
            client_message_id: "cm-43".to_owned(),
            created_at: "2026-08-01T09:30:00Z".to_owned(),
        },
    };

    let fanout = serde_json::to_value(frame.into_fanout()).expect("frame should serialize");
    assert!(fanout.get("workspace").is_none());
    assert_eq!(fanout["message"]["body"], Value::Null);
}

#[test]
fn unknown_frame_types_do_not_parse() {
    let raw = r#"{"type":"presence-ping","workspace":"W123"}"#;
    assert!(serde_json::from_str::<ChatFrame>(raw).is_err());
}

#[test]
fn the_gateway_closes_cleanly_and_unsubscribes() {
    assert!(
        WS_SOURCE.contains("unsubscribe"),
        "connection teardown must leave the topic registry"
    );
    assert!(
        WS_SOURCE.contains("Message::Close"),
        "a client close frame must end the socket loop"
    );
}

#[test]
fn malformed_frames_are_ignored_rather_than_fatal() {
    assert!(
        WS_SOURCE.contains("ignoring malformed websocket frame")
            || WS_SOURCE.contains("malformed"),
        "bad frames are logged and dropped, the socket stays open"
    );
}
