// WebSocket message types for the chat fan-out protocol.
//
// Frames are JSON text. An inbound chat-message frame names its workspace;
// the fan-out copy omits it because the topic already scopes delivery.

use serde::{Deserialize, Serialize};

/// All message types exchanged over the chat WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatFrame {
    /// Bidirectional: a chat message announcement.
    ///
    /// Client -> Server frames carry `workspace`; Server -> Client fan-out
    /// copies drop it. The origin peer receives its own echo and dedupes
    /// via `client-message-id`.
    ChatMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        workspace: Option<String>,
        message: ChatMessageBody,
    },
}

/// The normalized payload relayed to every peer of a workspace topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessageBody {
    pub body: Option<String>,
    #[serde(rename = "client-message-id")]
    pub client_message_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl ChatFrame {
    /// Strip the workspace field for fan-out delivery.
    pub fn into_fanout(self) -> Self {
        match self {
            Self::ChatMessage { message, .. } => Self::ChatMessage { workspace: None, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatFrame, ChatMessageBody};

    #[test]
    fn inbound_frame_round_trips() {
        let raw = r#"{"type":"chat-message","workspace":"W123","message":{"body":"hello","client-message-id":"cm-1","createdAt":"2026-01-01T00:00:00Z"}}"#;
        let frame: ChatFrame = serde_json::from_str(raw).expect("frame should parse");

        let ChatFrame::ChatMessage { workspace, message } = frame;
        assert_eq!(workspace.as_deref(), Some("W123"));
        assert_eq!(message.body.as_deref(), Some("hello"));
        assert_eq!(message.client_message_id, "cm-1");
    }

    #[test]
    fn fanout_copy_omits_workspace() {
        let frame = ChatFrame::ChatMessage {
            workspace: Some("W123".to_owned()),
            message: ChatMessageBody {
                body: Some("hi".to_owned()),
                client_message_id: "cm-2".to_owned(),
                created_at: "2026-01-01T00:00:00Z".to_owned(),
            },
        };

        let serialized =
            serde_json::to_string(&frame.into_fanout()).expect("frame should serialize");
        assert!(!serialized.contains("workspace"));
        assert!(serialized.contains("client-message-id"));
    }
}
