use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message. Session markers are not a role; see [`ChatEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// One entry in a chat session as the person sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEntry {
    Message(ConversationMessage),
    /// Visual separator between cooking sessions. Never sent to the model.
    SessionMarker {
        label: String,
        created_at: DateTime<Utc>,
    },
}

impl ChatEntry {
    pub fn marker(label: impl Into<String>) -> Self {
        ChatEntry::SessionMarker {
            label: label.into(),
            created_at: Utc::now(),
        }
    }

    pub fn as_message(&self) -> Option<&ConversationMessage> {
        match self {
            ChatEntry::Message(m) => Some(m),
            ChatEntry::SessionMarker { .. } => None,
        }
    }
}

/// Role/content pair as sent to the generative endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl From<&ConversationMessage> for PromptMessage {
    fn from(m: &ConversationMessage) -> Self {
        Self {
            role: m.role,
            content: m.content.clone(),
        }
    }
}

/// Row in the append-only chat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChatMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub recipe_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub user_id: Uuid,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub recipe_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_serializes_with_kind_tag() {
        let entry = ChatEntry::marker("New Cooking Session");
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["kind"], "session_marker");
        assert_eq!(v["label"], "New Cooking Session");
        assert!(entry.as_message().is_none());
    }

    #[test]
    fn test_message_without_timestamp_deserializes() {
        let m: ConversationMessage =
            serde_json::from_value(serde_json::json!({"role": "assistant", "content": "hi"}))
                .unwrap();
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(m.content, "hi");
    }

    #[test]
    fn test_divider_is_not_a_role() {
        let parsed: Result<PromptMessage, _> =
            serde_json::from_value(serde_json::json!({"role": "divider", "content": "x"}));
        assert!(parsed.is_err());
        assert_eq!(Role::parse("divider"), None);
        assert_eq!(Role::parse("system"), Some(Role::System));
    }
}
