use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

pub const DEFAULT_TITLE: &str = "New Chat";

/// Titles derived from a first message keep at most this many characters.
pub const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub pinned: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
            pinned: false,
        }
    }

    pub fn message_index(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Title for a conversation whose first message is `content`.
pub fn title_from_content(content: &str) -> String {
    content.chars().take(TITLE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_conversation_defaults() {
        let conv = Conversation::new();
        assert_eq!(conv.title, "New Chat");
        assert!(conv.messages.is_empty());
        assert!(!conv.pinned);
        assert!(Uuid::parse_str(&conv.id).is_ok());
    }

    #[test]
    fn test_title_truncates_to_fifty_chars() {
        let long = "x".repeat(80);
        assert_eq!(title_from_content(&long).chars().count(), 50);
        assert_eq!(title_from_content("short"), "short");
    }

    #[test]
    fn test_title_counts_chars_not_bytes() {
        let text = "é".repeat(60);
        let title = title_from_content(&text);
        assert_eq!(title.chars().count(), 50);
        assert_eq!(title.len(), 100);
    }
}
