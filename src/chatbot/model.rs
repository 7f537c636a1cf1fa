//! Chat message and lead data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::ChatStep;

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

/// One entry in the chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Monotonic within a session.
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// Insurance line a visitor is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    Saude,
    Vida,
    Empresarial,
    Outros,
}

impl std::fmt::Display for Interest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Saude => "saude",
            Self::Vida => "vida",
            Self::Empresarial => "empresarial",
            Self::Outros => "outros",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Interest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "saude" => Ok(Self::Saude),
            "vida" => Ok(Self::Vida),
            "empresarial" => Ok(Self::Empresarial),
            "outros" => Ok(Self::Outros),
            other => Err(format!("unknown interest: {other}")),
        }
    }
}

/// Lead data gathered during one chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest: Option<Interest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Lead {
    /// All four fields are present.
    pub fn is_complete(&self) -> bool {
        self.interest.is_some() && self.name.is_some() && self.email.is_some() && self.phone.is_some()
    }

    /// Names of the populated fields, in collection order.
    pub fn filled_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.interest.is_some() {
            fields.push("interest");
        }
        if self.name.is_some() {
            fields.push("name");
        }
        if self.email.is_some() {
            fields.push("email");
        }
        if self.phone.is_some() {
            fields.push("phone");
        }
        fields
    }
}

/// Read model handed to the UI shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatView {
    pub messages: Vec<ChatMessage>,
    pub quick_replies: Vec<String>,
    pub is_open: bool,
    pub step: ChatStep,
}
