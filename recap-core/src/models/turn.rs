use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Unknown roles map to `user`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A turn as owned by the transcript store. Never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub session_id: String,
    pub role: Role,
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// A turn handed over by the client directly (e.g. from its local buffer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTurn {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "text")]
    pub content: Option<String>,
}

impl ClientTurn {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            content: Some(content.to_string()),
        }
    }
}

/// The generator only sees a two-party dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueRole {
    User,
    Assistant,
}

impl DialogueRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueRole::User => "user",
            DialogueRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: DialogueRole,
    pub content: String,
}

impl DialogueTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: DialogueRole::Assistant,
            content: content.into(),
        }
    }

    /// Anything but `assistant` (including `system`) becomes `user`.
    /// Blank or missing text yields `None`.
    pub fn normalize(role: Option<&str>, text: Option<&str>) -> Option<Self> {
        let content = text?;
        if content.trim().is_empty() {
            return None;
        }
        let role = match role {
            Some(r) if r.trim().eq_ignore_ascii_case("assistant") => DialogueRole::Assistant,
            _ => DialogueRole::User,
        };
        Some(Self {
            role,
            content: content.to_string(),
        })
    }

    pub fn from_turn(turn: &ConversationTurn) -> Option<Self> {
        Self::normalize(Some(turn.role.as_str()), Some(&turn.text))
    }

    pub fn from_client(turn: &ClientTurn) -> Option<Self> {
        Self::normalize(turn.role.as_deref(), turn.content.as_deref())
    }

    /// `role: content`, the line format used in rendered summaries.
    pub fn render_line(&self) -> String {
        format!("{}: {}", self.role.as_str(), self.content)
    }
}
