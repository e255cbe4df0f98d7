use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::specialist::SpecialistId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Message,
    /// Triage asked the user to clarify which area the request belongs to.
    Clarification,
}

impl TurnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Clarification => "clarification",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "message" => Some(Self::Message),
            "clarification" => Some(Self::Clarification),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub kind: TurnKind,
    pub specialist: Option<SpecialistId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            kind: TurnKind::Message,
            specialist: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(specialist: SpecialistId, content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            kind: TurnKind::Message,
            specialist: Some(specialist),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn clarification(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            kind: TurnKind::Clarification,
            specialist: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
