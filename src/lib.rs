//! mnemo-rs: tiered agent memory and MCP tool-execution server.
//!
//! Gives LLM clients a persistent, searchable memory and a catalog of
//! structured tools over the Model Context Protocol (JSON-RPC 2.0 on
//! stdio or HTTP/SSE).
//!
//! # Architecture
//!
//! ```text
//! Transport (stdio | HTTP/SSE)
//!   └── McpService (JSON-RPC methods)
//!         └── ToolRegistry (catalog + validated dispatch)
//!               └── MemoryOrchestrator
//!                     ├── WorkingMemory   (bounded messages)
//!                     ├── ActiveMemory    (bounded pages, LRU)
//!                     ├── ArchivalMemory  (unbounded vectors)
//!                     ├── KnowledgeBase   (chunked documents)
//!                     └── MultiModelStorage (per-model vector index)
//!                           └── Embedder (in-process | HTTP | API | random)
//! DreamingPipeline (offline A→B→C→D consolidation, versioned archives)
//! ```

pub mod cli;
pub mod config;
pub mod dreaming;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod persist;
pub mod search;
pub mod server;
pub mod tools;

pub use config::Config;
pub use error::Error;
