//! Data model for the A→B→C→D consolidation pipeline.
//!
//! A = raw conversation text, B = semantic chunks, C = synthesised
//! clusters, D = versioned archive snapshots with a per-conversation
//! manifest as the authoritative lifecycle record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline quality hint carried on artefacts so future re-runs can
/// upgrade earlier low-quality output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    /// Fast, low-cost pass.
    Basic,
    /// Standard quality.
    Good,
    /// Highest quality.
    Premium,
}

impl QualityLevel {
    /// Confidence assigned to artefacts produced at this level.
    #[must_use]
    pub const fn confidence(self) -> f32 {
        match self {
            Self::Basic => 0.7,
            Self::Good | Self::Premium => 0.9,
        }
    }

    /// Whether artefacts at this level should be flagged for upgrade.
    #[must_use]
    pub const fn needs_upgrade(self) -> bool {
        matches!(self, Self::Basic)
    }

    /// Parses a quality level; unknown values map to `Basic`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "good" => Self::Good,
            "premium" => Self::Premium,
            _ => Self::Basic,
        }
    }

    /// Returns the lowercase string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Good => "good",
            Self::Premium => "premium",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a B chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Topic or idea boundary.
    Semantic,
    /// One speaker's contribution.
    SpeakerTurn,
    /// Named entity occurrence.
    Entity,
    /// Connection between entities.
    Relationship,
}

/// A deconstructed semantic chunk (B), created from raw conversation
/// text with metadata extracted by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BChunk {
    /// Chunk identifier, `b_<parent>_<index>`.
    pub id: String,
    /// Source conversation (A) identifier.
    pub parent_id: String,
    /// Chunk classification.
    pub kind: ChunkKind,
    /// Original text, unchanged and untranslated.
    pub content: String,
    /// Topic tags.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Speaker attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Named entities mentioned.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f32,
    /// Approximate `(start, end)` token positions within the parent.
    pub token_range: (usize, usize),
    /// Relative position within the parent in `[0, 1]`.
    pub position_in_parent: f32,
    /// Detected language code for this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Quality level the chunk was produced at.
    pub quality_level: QualityLevel,
    /// Whether a higher-quality re-run should replace this chunk.
    pub needs_upgrade: bool,
    /// Model that produced the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_used: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Classification of a C cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    /// Thematic grouping.
    Topic,
    /// Explicit connections across chunks.
    Relationship,
    /// High-level overview.
    Summary,
    /// Chronological progression.
    Timeline,
}

impl ClusterKind {
    /// Parses the LLM's uppercase type names; unknown values map to
    /// `Topic`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "RELATIONSHIP" => Self::Relationship,
            "SUMMARY" => Self::Summary,
            "TIMELINE" => Self::Timeline,
            _ => Self::Topic,
        }
    }
}

/// A synthesised knowledge cluster (C) combining multiple B chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CCluster {
    /// Cluster identifier, `c_<session>_<index>`.
    pub id: String,
    /// Cluster classification.
    pub kind: ClusterKind,
    /// Synthesised summary text.
    pub content: String,
    /// IDs of the B chunks in this cluster.
    #[serde(default)]
    pub related_chunks: Vec<String>,
    /// IDs of related clusters.
    #[serde(default)]
    pub related_clusters: Vec<String>,
    /// Cluster title/theme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Key entities in the cluster.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Novel connections discovered during synthesis.
    #[serde(default)]
    pub insights: Vec<String>,
    /// Synthesis confidence in `[0, 1]`.
    pub confidence: f32,
    /// Cluster version, starting at 1.
    pub version: u32,
    /// Quality level the cluster was produced at.
    pub quality_level: QualityLevel,
    /// Whether a higher-quality re-run should replace this cluster.
    pub needs_upgrade: bool,
    /// Model that produced the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_used: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of one archive version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    /// The current version.
    Active,
    /// Replaced by a newer version.
    Superseded,
}

/// Storage tier of one archive version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    /// Fast storage, current version.
    Hot,
    /// Cold storage, superseded versions.
    Cold,
}

/// Per-version lifecycle record inside the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Whether this version is the latest.
    pub is_latest: bool,
    /// Lifecycle status.
    pub status: VersionStatus,
    /// Storage tier.
    pub storage_location: StorageLocation,
    /// The version before this one, if any.
    #[serde(default)]
    pub previous_version: Option<u32>,
    /// The version this one replaced, if any.
    #[serde(default)]
    pub supersedes_version: Option<u32>,
    /// The version that replaced this one, once superseded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by_version: Option<u32>,
    /// When this version was superseded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
}

/// The per-conversation authoritative lifecycle record.
///
/// Archive files are immutable once written; all lifecycle changes happen
/// here. Version keys are stringified numbers (`"1"`, `"2"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Highest version number written.
    pub latest_version: u32,
    /// Last manifest update time.
    pub updated_at: DateTime<Utc>,
    /// Per-version lifecycle records keyed by stringified version number.
    pub versions: BTreeMap<String, VersionRecord>,
}

impl Manifest {
    /// An empty manifest for a conversation with no archives yet.
    #[must_use]
    pub fn empty(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            latest_version: 0,
            updated_at: Utc::now(),
            versions: BTreeMap::new(),
        }
    }

    /// The lifecycle record for a version, if present.
    #[must_use]
    pub fn version(&self, version: u32) -> Option<&VersionRecord> {
        self.versions.get(&version.to_string())
    }
}
