use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use api::request::{ChatKind, SendChat};
use api::response::ChatMessage;
use libcast::Client;
use tracing::{debug, warn};

use crate::error::ChatError;

#[derive(Debug, Default)]
struct Transcript {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl Transcript {
    fn push(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// Live chat of one broadcast. Messages appear only once the server has
/// persisted them, so the local transcript mirrors the server's.
#[derive(Clone)]
pub struct ChatChannel {
    client: Client,
    transcript: Arc<Mutex<Transcript>>,
}

impl ChatChannel {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            transcript: Default::default(),
        }
    }

    /// Seeds the transcript with the server history. History always ends up
    /// ahead of messages sent locally in the meantime.
    pub async fn load_history(&self, post_id: &str) -> Result<usize, ChatError> {
        let history = self.client.chat_messages(post_id).await.inspect_err(|e| {
            warn!("[chat] load history for {} failed: {}", post_id, e);
        })?;

        let mut transcript = self.lock();
        let local = std::mem::take(&mut *transcript);
        for message in history {
            transcript.push(message);
        }
        for message in local.messages {
            transcript.push(message);
        }
        debug!(
            "[chat] history of {} loaded, {} messages",
            post_id,
            transcript.messages.len()
        );
        Ok(transcript.messages.len())
    }

    /// Sends `text`; the message is appended once the server acknowledged it.
    pub async fn send(&self, post_id: &str, text: &str) -> Result<ChatMessage, ChatError> {
        self.send_as(post_id, text, ChatKind::Text).await
    }

    pub async fn send_as(
        &self,
        post_id: &str,
        text: &str,
        kind: ChatKind,
    ) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Empty);
        }
        let req = match kind {
            ChatKind::Text => SendChat::text(text),
            ChatKind::Emoji => SendChat::emoji(text),
        };
        let message = self
            .client
            .send_chat(post_id, &req)
            .await
            .inspect_err(|e| warn!("[chat] send to {} failed: {}", post_id, e))?;
        self.lock().push(message.clone());
        Ok(message)
    }

    /// Fetches the transcript again and appends messages not seen yet.
    /// Returns the newly appended messages.
    pub async fn sync(&self, post_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        let remote = self.client.chat_messages(post_id).await?;
        let mut transcript = self.lock();
        Ok(remote
            .into_iter()
            .filter(|m| transcript.push(m.clone()))
            .collect())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn clear(&self) {
        *self.lock() = Transcript::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
