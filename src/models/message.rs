use chrono::{DateTime, TimeZone, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Written as RFC 3339. Stored values that are missing or unreadable
    /// load as the current time; unix milliseconds are also accepted.
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
        Other(IgnoredAny),
    }

    let parsed = match Raw::deserialize(deserializer)? {
        Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Raw::Millis(millis) => Utc.timestamp_millis_opt(millis).single(),
        Raw::Other(_) => None,
    };
    Ok(parsed.unwrap_or_else(|| {
        tracing::warn!("Replacing unreadable message timestamp with the current time");
        Utc::now()
    }))
}

/// A message that has not been added to a conversation yet. The store
/// assigns the id on append.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageDraft {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub(crate) fn into_message(self) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
        }
    }
}

/// Fields to merge into an existing message. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub(crate) fn apply(&self, message: &mut Message) {
        if let Some(role) = self.role {
            message.role = role;
        }
        if let Some(content) = &self.content {
            message.content.clone_from(content);
        }
        if let Some(timestamp) = self.timestamp {
            message.timestamp = timestamp;
        }
    }
}
