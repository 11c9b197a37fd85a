//! Working memory: the bounded short-term message window.
//!
//! Token accounting is approximate (whitespace split). The cap is soft:
//! insertions always succeed, and when the running count exceeds the cap
//! the oldest messages are dropped until the count is back at or below 80%
//! of the cap.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::message::{Message, Role};

/// Fill fraction at which the memory reports itself full and trimming stops.
const FULL_FRACTION: f64 = 0.8;

/// Bounded ordered sequence of conversation messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    messages: Vec<Message>,
    max_tokens: usize,
    token_count: usize,
}

impl WorkingMemory {
    /// Creates an empty working memory with the given soft token cap.
    #[must_use]
    pub const fn new(max_tokens: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_tokens,
            token_count: 0,
        }
    }

    /// Appends a message, trimming oldest messages if the cap is exceeded.
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        let message = Message::new(role, content);
        self.token_count += message.approx_tokens();
        self.messages.push(message);

        if self.token_count > self.max_tokens {
            self.trim_to_fit();
        }
    }

    /// Drops oldest messages until the count is at or below 80% of the cap.
    fn trim_to_fit(&mut self) {
        let target = self.trigger_tokens();
        while self.token_count > target && !self.messages.is_empty() {
            let removed = self.messages.remove(0);
            self.token_count = self.token_count.saturating_sub(removed.approx_tokens());
        }
    }

    /// All messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Removes and returns the oldest `count` messages, updating the token
    /// count. Returns fewer when the memory holds fewer.
    pub fn remove_oldest(&mut self, count: usize) -> Vec<Message> {
        if count == 0 || self.messages.is_empty() {
            return Vec::new();
        }
        let count = count.min(self.messages.len());
        let removed: Vec<Message> = self.messages.drain(..count).collect();
        let removed_tokens: usize = removed.iter().map(Message::approx_tokens).sum();
        self.token_count = self.token_count.saturating_sub(removed_tokens);
        removed
    }

    /// Clears all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.token_count = 0;
    }

    /// Whether the memory is at or past 80% of its cap.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.token_count >= self.trigger_tokens()
    }

    /// Current approximate token count.
    #[must_use]
    pub const fn token_count(&self) -> usize {
        self.token_count
    }

    /// The configured soft cap.
    #[must_use]
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Number of messages held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the memory holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn trigger_tokens(&self) -> usize {
        (self.max_tokens as f64 * FULL_FRACTION) as usize
    }

    /// Exports the conversation as a JSON envelope.
    #[must_use]
    pub fn export_json(&self) -> String {
        let envelope = serde_json::json!({
            "type": "conversation",
            "version": "1.0",
            "messages": self.messages,
            "timestamp": Utc::now(),
        });
        serde_json::to_string_pretty(&envelope).unwrap_or_default()
    }

    /// Exports the conversation as Markdown with per-role headings.
    #[must_use]
    pub fn export_markdown(&self) -> String {
        let mut lines = vec!["# Conversation History".to_string(), String::new()];
        for message in &self.messages {
            let role = message.role.as_str();
            let mut chars = role.chars();
            let heading = chars.next().map_or_else(String::new, |first| {
                format!("### {}{}", first.to_uppercase(), chars.as_str())
            });
            lines.push(heading);
            lines.push(String::new());
            lines.push(message.content.clone());
            lines.push(String::new());
        }
        lines.join("\n")
    }
}
