//! Role-tagged conversation messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user input.
    User,
    /// Assistant output.
    Assistant,
    /// System instruction.
    System,
}

impl Role {
    /// Returns the lowercase string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parses a role string; unknown roles map to `System`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" | "human" => Self::User,
            "assistant" | "ai" => Self::Assistant,
            _ => Self::System,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped now.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Approximate token count (whitespace split).
    #[must_use]
    pub fn approx_tokens(&self) -> usize {
        approx_tokens(&self.content)
    }
}

/// Approximate token count of a text: whitespace-separated words.
#[must_use]
pub fn approx_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}
