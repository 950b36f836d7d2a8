use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::ids::{ImageId, MessageId, SessionId};

/// Default title for sessions committed without a derivable one.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Storage-level speaker role. Serialized lowercase to match the persisted
/// snapshot schema the web client wrote (`"user"` / `"model"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

/// Base64 image payload inlined into a message or generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImageRecord {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRecord {
    pub id: MessageId,
    pub role: MessageRole,
    pub text: String,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<InlineImageRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionRecord {
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<ChatMessageRecord>,
    pub timestamp: u64,
}

/// Distinguishes fresh generations from edits of an uploaded reference image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedImageKind {
    Generation,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImageRecord {
    pub id: ImageId,
    pub url: String,
    pub prompt: String,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: GeneratedImageKind,
}

/// Signed-in user identity. Cosmetic only; carries no access-control meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileRecord {
    pub name: String,
}

/// Milliseconds since the unix epoch, the timestamp unit of every record.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_record_serializes_to_snapshot_schema() {
        let record = ChatMessageRecord {
            id: MessageId::new_v7(),
            role: MessageRole::Model,
            text: "hello".to_string(),
            timestamp: 1_700_000_000_000,
            image: Some(InlineImageRecord {
                data: "aGk=".to_string(),
                mime_type: "image/png".to_string(),
            }),
        };

        let json = serde_json::to_value(&record).expect("record must serialize");
        assert_eq!(json["role"], "model");
        assert_eq!(json["image"]["mimeType"], "image/png");
        assert!(json.get("mime_type").is_none());
    }

    #[test]
    fn image_record_kind_serializes_as_type_field() {
        let record = GeneratedImageRecord {
            id: ImageId::new_v7(),
            url: "data:image/png;base64,aGk=".to_string(),
            prompt: "a red door".to_string(),
            timestamp: 1_700_000_000_000,
            kind: GeneratedImageKind::Edit,
        };

        let json = serde_json::to_value(&record).expect("record must serialize");
        assert_eq!(json["type"], "edit");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn attachment_free_message_omits_image_field() {
        let record = ChatMessageRecord {
            id: MessageId::new_v7(),
            role: MessageRole::User,
            text: "hi".to_string(),
            timestamp: 0,
            image: None,
        };

        let json = serde_json::to_value(&record).expect("record must serialize");
        assert!(json.get("image").is_none());
    }
}
