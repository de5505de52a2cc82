use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{option_string_or_number, string_or_number};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStarted {
    #[serde(deserialize_with = "string_or_number")]
    pub live_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub post_id: String,
    #[serde(default)]
    pub stream_key: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LiveStopped {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Acknowledgement of an uploaded recording. `media_id` is absent when the
/// server accepted the upload but failed to persist it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadResult {
    #[serde(default, deserialize_with = "option_string_or_number")]
    pub media_id: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
}

impl UploadResult {
    pub fn is_saved(&self) -> bool {
        self.media_id.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Author {
    #[serde(alias = "username", alias = "display_name", default)]
    pub name: String,
    #[serde(alias = "profile_picture", alias = "avatar_url", default)]
    pub avatar: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "user")]
    pub author: Author,
    pub content: String,
    #[serde(alias = "created_at")]
    pub timestamp: DateTime<Utc>,
}

/// The transcript endpoint answers with a bare list or a paginated envelope.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum ChatHistory {
    List(Vec<ChatMessage>),
    Results { results: Vec<ChatMessage> },
    Messages { messages: Vec<ChatMessage> },
}

impl ChatHistory {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            ChatHistory::List(v) => v,
            ChatHistory::Results { results } => results,
            ChatHistory::Messages { messages } => messages,
        }
    }
}

/// Chat send answers either with the message itself or wraps it.
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum ChatSent {
    Message(ChatMessage),
    Wrapped { message: ChatMessage },
}

impl From<ChatSent> for ChatMessage {
    fn from(sent: ChatSent) -> Self {
        match sent {
            ChatSent::Message(m) => m,
            ChatSent::Wrapped { message } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_started_numeric_ids() {
        let v: LiveStarted =
            serde_json::from_str(r#"{"live_id": 12, "post_id": "34", "message": "ok"}"#).unwrap();
        assert_eq!(v.live_id, "12");
        assert_eq!(v.post_id, "34");
    }

    #[test]
    fn test_upload_result_without_media_id() {
        let v: UploadResult =
            serde_json::from_str(r#"{"file_url": "/media/live/1.webm"}"#).unwrap();
        assert!(!v.is_saved());
        assert_eq!(v.file_url.as_deref(), Some("/media/live/1.webm"));

        let v: UploadResult = serde_json::from_str(r#"{"media_id": 7, "file_url": "x"}"#).unwrap();
        assert_eq!(v.media_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_chat_history_shapes() {
        let msg = r#"{"id": 1, "author": {"username": "aissatou", "profile_picture": null}, "content": "salut", "created_at": "2024-05-01T10:00:00Z"}"#;
        let list: ChatHistory = serde_json::from_str(&format!("[{msg}]")).unwrap();
        assert_eq!(list.into_messages().len(), 1);

        let page: ChatHistory =
            serde_json::from_str(&format!(r#"{{"count": 1, "results": [{msg}]}}"#)).unwrap();
        let messages = page.into_messages();
        assert_eq!(messages[0].author.name, "aissatou");
        assert_eq!(messages[0].id, "1");
    }
}
