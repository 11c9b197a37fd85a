//! Tiered memory engine.
//!
//! Four tiers with automatic transitions between them:
//!
//! ```text
//! WorkingMemory  (bounded messages, FIFO trim)
//!   │ page-out at 80% of the token cap
//! ActiveMemory   (bounded pages, LRU eviction)
//!   │ eviction / end_conversation
//! ArchivalMemory (unbounded vector store)
//!   │ high-relevance promotion back to active
//! KnowledgeBase  (chunked documents)
//! ```
//!
//! [`MultiModelStorage`] runs alongside as an auxiliary index holding the
//! same text under several embedding models. [`MemoryOrchestrator`]
//! composes everything behind one interface.

pub mod active;
pub mod archival;
pub mod chunker;
pub mod knowledge;
pub mod message;
pub mod multi_model;
pub mod orchestrator;
pub mod page;
pub mod working;

pub use active::{ActiveMemory, EvictionSink};
pub use archival::{ArchivalHit, ArchivalMemory, ArchivedItem};
pub use knowledge::{Document, GitContext, KnowledgeBase, NewDocument, SourceType};
pub use message::{Message, Role};
pub use multi_model::{ModelMap, MultiModelEntry, MultiModelStorage};
pub use orchestrator::{
    ContextItem, ContextSource, ConversationSummary, DEFAULT_CONTEXT_ITEMS, MemoryOrchestrator,
};
pub use page::{Page, PageContent, PageKind, PageMessage};
pub use working::WorkingMemory;
