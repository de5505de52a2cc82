use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StartLive {
    pub title: String,
    pub description: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Text,
    Emoji,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SendChat {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
}

impl SendChat {
    pub fn text<T: ToString>(content: T) -> Self {
        Self {
            content: content.to_string(),
            kind: ChatKind::Text,
        }
    }

    pub fn emoji<T: ToString>(content: T) -> Self {
        Self {
            content: content.to_string(),
            kind: ChatKind::Emoji,
        }
    }
}
