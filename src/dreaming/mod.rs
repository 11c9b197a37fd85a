//! Dreaming consolidation pipeline.
//!
//! Offline A→B→C→D transform over archived conversation text:
//!
//! ```text
//! A (raw conversation)
//!   │ ConversationChunker — LLM semantic chunking
//! B (chunks with labels, entities, language)
//!   │ Synthesizer — LLM clustering
//! C (topic/relationship/timeline/summary clusters)
//!   │ DreamingPipeline — versioned archive + manifest
//! D (immutable archive_v<N>.json, mutable manifest.json)
//! ```
//!
//! Parse failures are repaired once by the LLM and then FATAL. The
//! pipeline never substitutes rule-based artefacts for model output; a
//! degraded consolidation silently poisoning later versions is worse than
//! a loud failure.

pub mod chunker;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod synthesizer;

pub use chunker::ConversationChunker;
pub use models::{
    BChunk, CCluster, ChunkKind, ClusterKind, Manifest, QualityLevel, StorageLocation,
    VersionRecord, VersionStatus,
};
pub use pipeline::{DreamingPipeline, ProcessOutcome};
pub use synthesizer::Synthesizer;
