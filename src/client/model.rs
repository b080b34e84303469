use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::AI_RESPONSE_SENTINEL;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub is_user_message: bool,
}

impl ChatMessage {
    /// Local stand-in for a message the server has not stored yet.
    pub fn optimistic(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            text: text.into(),
            is_user_message: true,
        }
    }

    pub fn sentinel(text: impl Into<String>) -> Self {
        Self {
            id: AI_RESPONSE_SENTINEL.to_string(),
            created_at: Utc::now(),
            text: text.into(),
            is_user_message: false,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == AI_RESPONSE_SENTINEL
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesPage {
    pub messages: Vec<ChatMessage>,
    pub next_cursor: Option<String>,
}

/// Pages in fetch order; the first page holds the newest messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfiniteMessages {
    pub pages: Vec<MessagesPage>,
}

impl InfiniteMessages {
    pub fn single(page: MessagesPage) -> Self {
        Self { pages: vec![page] }
    }

    /// All loaded messages, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.pages.iter().flat_map(|p| p.messages.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor of the page after the last one loaded.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages.last().and_then(|p| p.next_cursor.as_deref())
    }

    pub fn sentinel(&self) -> Option<&ChatMessage> {
        self.pages.first().and_then(|p| p.messages.iter().find(|m| m.is_sentinel()))
    }

    fn first_page_mut(&mut self) -> &mut MessagesPage {
        if self.pages.is_empty() {
            self.pages.push(MessagesPage::default());
        }
        &mut self.pages[0]
    }

    pub fn prepend(&mut self, message: ChatMessage) {
        self.first_page_mut().messages.insert(0, message);
    }

    /// Overwrites the in-progress answer, inserting it at the head the first time.
    pub fn upsert_sentinel(&mut self, text: &str) {
        let page = self.first_page_mut();
        match page.messages.iter_mut().find(|m| m.is_sentinel()) {
            Some(message) => message.text = text.to_string(),
            None => page.messages.insert(0, ChatMessage::sentinel(text)),
        }
    }
}
