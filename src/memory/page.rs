//! Active-memory pages.
//!
//! A page is the unit moved between the working and active tiers. Content
//! is a tagged variant rather than a free-form map so the serialisation
//! layer, archival text derivation, and promotion all dispatch on shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Role;

/// A role/content pair inside a page (timestamps live on the page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMessage {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// What a page holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageContent {
    /// A batch of conversation messages.
    Conversation {
        /// Messages in original order.
        messages: Vec<PageMessage>,
        /// When the batch was packaged.
        timestamp: DateTime<Utc>,
        /// Topic summary, present for completed conversations.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    /// Free-form text.
    Text {
        /// The text body.
        body: String,
    },
    /// Content promoted back from archival memory.
    Promoted {
        /// Archival item ID this page was promoted from.
        source_ref: String,
        /// The promoted text.
        body: String,
    },
}

impl PageContent {
    /// Derives the flat text used for embedding and archival storage.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Conversation { messages, .. } => messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Text { body } | Self::Promoted { body, .. } => body.clone(),
        }
    }
}

/// Classification of a page's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    /// Paged-out batch of an ongoing conversation.
    Conversation,
    /// A fully ended conversation.
    ConversationComplete,
    /// Re-promoted archival content.
    Promoted,
}

impl PageKind {
    /// Returns the snake_case string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::ConversationComplete => "conversation_complete",
            Self::Promoted => "promoted",
        }
    }
}

/// A page in active memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Opaque unique identifier.
    pub id: String,
    /// Page payload.
    pub content: PageContent,
    /// Origin classification.
    pub kind: PageKind,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last access time (drives LRU eviction).
    pub last_accessed: DateTime<Utc>,
    /// Number of accesses (LRU tie-break).
    pub access_count: u64,
}

impl Page {
    /// Creates a fresh page with a random ID.
    #[must_use]
    pub fn new(content: PageContent, kind: PageKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            kind,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Records an access: bumps the timestamp and counter.
    ///
    /// Idempotent with respect to retrieval semantics - repeated accesses
    /// only ever move the page further from eviction.
    pub fn access(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
    }

    /// JSON-serialised content, used as the embedding text for page-level
    /// semantic search.
    #[must_use]
    pub fn content_json(&self) -> String {
        serde_json::to_string(&self.content).unwrap_or_else(|_| self.content.as_text())
    }
}
