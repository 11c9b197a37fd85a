//! A→B→C→D pipeline executor and versioned archive store.
//!
//! Archive files (`archive_v<N>.json`) are immutable once written: every
//! write goes through a temp file + atomic rename, and lifecycle changes
//! (supersession, storage tier) happen only in the per-conversation
//! `manifest.json`, which is the authoritative record. Archive files keep
//! their creation-time metadata for audit.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::DreamError;
use crate::llm::LlmClient;
use crate::persist;

use super::chunker::ConversationChunker;
use super::models::{
    Manifest, QualityLevel, StorageLocation, VersionRecord, VersionStatus,
};
use super::synthesizer::Synthesizer;

/// Matches archive filenames and captures the numeric version.
static ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^archive_v(\d+)\.json$").unwrap_or_else(|_| unreachable!()));

/// Result of one pipeline run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessOutcome {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Version number written (1-based, strictly increasing).
    pub version: u32,
    /// Path of the written archive file.
    pub archive_path: PathBuf,
    /// IDs of the B chunks produced.
    pub b_chunk_ids: Vec<String>,
    /// IDs of the C clusters produced.
    pub c_cluster_ids: Vec<String>,
    /// Distinct entities collected across chunks and clusters.
    pub entity_count: usize,
    /// Quality level of this run.
    pub quality_level: QualityLevel,
    /// Set when this run was a quality upgrade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgraded_from: Option<QualityLevel>,
}

/// The dreaming pipeline: chunk, synthesise, archive with lineage.
pub struct DreamingPipeline {
    llm: Arc<dyn LlmClient>,
    quality: QualityLevel,
    storage_path: PathBuf,
}

impl std::fmt::Debug for DreamingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DreamingPipeline")
            .field("quality", &self.quality)
            .field("storage_path", &self.storage_path)
            .finish_non_exhaustive()
    }
}

impl DreamingPipeline {
    /// Creates a pipeline archiving under `storage_path`
    /// (`<data_dir>/dreams`).
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, quality: QualityLevel, storage_path: PathBuf) -> Self {
        Self {
            llm,
            quality,
            storage_path,
        }
    }

    /// Runs the full pipeline for one conversation, producing the next
    /// archive version and updating the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`DreamError`] on LLM failure, unparseable output after the
    /// repair pass (no silent degradation), or storage failure. A failed
    /// run writes neither an archive file nor a manifest update.
    pub async fn process_conversation(
        &self,
        conversation_id: &str,
        conversation_text: &str,
        metadata: Value,
    ) -> Result<ProcessOutcome, DreamError> {
        self.run(conversation_id, conversation_text, metadata, self.quality, None)
            .await
    }

    async fn run(
        &self,
        conversation_id: &str,
        conversation_text: &str,
        metadata: Value,
        quality: QualityLevel,
        upgraded_from: Option<QualityLevel>,
    ) -> Result<ProcessOutcome, DreamError> {
        info!(conversation_id, quality = %quality, "dreaming pipeline started");

        // A→B
        let chunker = ConversationChunker::new(self.llm.clone(), quality);
        let b_chunks = chunker
            .chunk_conversation(conversation_id, conversation_text)
            .await?;
        debug!(conversation_id, count = b_chunks.len(), "chunking complete");

        // B→C
        let synthesizer = Synthesizer::new(self.llm.clone(), quality);
        let c_clusters = synthesizer
            .synthesize_chunks(&b_chunks, conversation_id)
            .await?;
        debug!(conversation_id, count = c_clusters.len(), "synthesis complete");

        // C→D
        let previous_version = self.latest_version(conversation_id);
        let version = previous_version.unwrap_or(0) + 1;

        let entities: BTreeSet<String> = b_chunks
            .iter()
            .flat_map(|c| c.entities.iter().cloned())
            .chain(c_clusters.iter().flat_map(|c| c.entities.iter().cloned()))
            .collect();
        let entity_count = entities.len();

        let mut archive_metadata = match metadata {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => json!({ "caller": other }),
        };
        archive_metadata["original_text"] = json!(conversation_text);
        archive_metadata["previous_version"] = json!(previous_version);
        archive_metadata["supersedes_version"] = json!(previous_version);
        archive_metadata["is_latest"] = json!(true);
        archive_metadata["status"] = json!("active");
        archive_metadata["storage_location"] = json!("hot");

        let archive = json!({
            "id": format!("d_{conversation_id}"),
            "conversation_id": conversation_id,
            "version": version,
            "quality_level": quality.as_str(),
            "created_at": Utc::now(),
            "entities": entities,
            "metadata": archive_metadata,
            "b_chunks": b_chunks,
            "c_clusters": c_clusters,
        });

        let archive_path = self.archive_path(conversation_id, version);
        persist::write_json_atomic(&archive_path, &archive).map_err(|e| DreamError::Storage {
            path: archive_path.clone(),
            message: e.to_string(),
        })?;

        // The manifest commit happens only after the archive file landed.
        self.commit_version(conversation_id, version, previous_version)?;

        info!(conversation_id, version, path = %archive_path.display(), "archived");
        Ok(ProcessOutcome {
            conversation_id: conversation_id.to_string(),
            version,
            archive_path,
            b_chunk_ids: b_chunks.into_iter().map(|c| c.id).collect(),
            c_cluster_ids: c_clusters.into_iter().map(|c| c.id).collect(),
            entity_count,
            quality_level: quality,
            upgraded_from,
        })
    }

    /// Re-runs the pipeline for an archived conversation at a higher
    /// quality level, producing a new version.
    ///
    /// # Errors
    ///
    /// Returns [`DreamError::ArchiveNotFound`] when the conversation has no
    /// archive, [`DreamError::MissingOriginalText`] when the latest archive
    /// carries no source text, and any pipeline error from the re-run.
    pub async fn upgrade_quality(
        &self,
        conversation_id: &str,
        target: QualityLevel,
    ) -> Result<ProcessOutcome, DreamError> {
        let archive = self.get_archive(conversation_id, None)?;

        let original_text = archive
            .get("metadata")
            .and_then(|m| m.get("original_text"))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| DreamError::MissingOriginalText {
                conversation_id: conversation_id.to_string(),
            })?
            .to_string();
        let old_quality = archive
            .get("quality_level")
            .and_then(Value::as_str)
            .map_or(QualityLevel::Basic, QualityLevel::parse);
        let metadata = archive.get("metadata").cloned().unwrap_or_else(|| json!({}));

        info!(conversation_id, from = %old_quality, to = %target, "quality upgrade");
        self.run(
            conversation_id,
            &original_text,
            metadata,
            target,
            Some(old_quality),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns an archive's contents; the latest version when `version` is
    /// omitted.
    ///
    /// # Errors
    ///
    /// Returns [`DreamError::ArchiveNotFound`] when the conversation or
    /// version does not exist.
    pub fn get_archive(
        &self,
        conversation_id: &str,
        version: Option<u32>,
    ) -> Result<Value, DreamError> {
        let version = match version {
            Some(v) => v,
            None => self
                .latest_version(conversation_id)
                .ok_or_else(|| DreamError::ArchiveNotFound {
                    conversation_id: conversation_id.to_string(),
                })?,
        };

        let path = self.archive_path(conversation_id, version);
        persist::load_json_opt(&path).ok_or_else(|| DreamError::ArchiveNotFound {
            conversation_id: conversation_id.to_string(),
        })
    }

    /// Returns the manifest for a conversation.
    ///
    /// When no manifest file exists but archives do, one is synthesised
    /// from the on-disk filenames WITHOUT being persisted - reads never
    /// mutate storage.
    #[must_use]
    pub fn get_manifest(&self, conversation_id: &str) -> Option<Manifest> {
        if let Some(manifest) = persist::load_json_opt(&self.manifest_path(conversation_id)) {
            return Some(manifest);
        }
        let conv_dir = self.conversation_dir(conversation_id);
        if !conv_dir.exists() {
            return None;
        }
        Some(self.manifest_from_files(conversation_id))
    }

    /// Lifecycle view of one version (latest when omitted), from the
    /// manifest.
    #[must_use]
    pub fn get_archive_lifecycle(
        &self,
        conversation_id: &str,
        version: Option<u32>,
    ) -> Option<Value> {
        let manifest = self.get_manifest(conversation_id)?;
        let version = version.unwrap_or(manifest.latest_version);
        let record = manifest.version(version)?;
        let mut value = serde_json::to_value(record).ok()?;
        value["conversation_id"] = json!(conversation_id);
        value["version"] = json!(version);
        Some(value)
    }

    /// Summaries of every archived conversation.
    #[must_use]
    pub fn list_archives(&self) -> Vec<Value> {
        let Ok(entries) = std::fs::read_dir(&self.storage_path) else {
            return Vec::new();
        };

        let mut archives = Vec::new();
        for entry in entries.filter_map(Result::ok) {
            if !entry.path().is_dir() {
                continue;
            }
            let conversation_id = entry.file_name().to_string_lossy().to_string();
            let Some(latest) = self.latest_version(&conversation_id) else {
                continue;
            };
            let Ok(archive) = self.get_archive(&conversation_id, Some(latest)) else {
                continue;
            };
            let lifecycle = self.get_archive_lifecycle(&conversation_id, Some(latest));

            archives.push(json!({
                "conversation_id": conversation_id,
                "latest_version": latest,
                "quality_level": archive.get("quality_level"),
                "created_at": archive.get("created_at"),
                "status": lifecycle.as_ref().and_then(|l| l.get("status").cloned()),
                "storage_location": lifecycle.as_ref().and_then(|l| l.get("storage_location").cloned()),
                "entities_count": archive.get("entities").and_then(Value::as_array).map_or(0, Vec::len),
                "chunks_count": archive.get("b_chunks").and_then(Value::as_array).map_or(0, Vec::len),
                "clusters_count": archive.get("c_clusters").and_then(Value::as_array).map_or(0, Vec::len),
            }));
        }
        archives.sort_by(|a, b| {
            a["conversation_id"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["conversation_id"].as_str().unwrap_or_default())
        });
        archives
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn conversation_dir(&self, conversation_id: &str) -> PathBuf {
        self.storage_path.join(conversation_id)
    }

    fn archive_path(&self, conversation_id: &str, version: u32) -> PathBuf {
        self.conversation_dir(conversation_id)
            .join(format!("archive_v{version}.json"))
    }

    fn manifest_path(&self, conversation_id: &str) -> PathBuf {
        self.conversation_dir(conversation_id).join("manifest.json")
    }

    /// Numeric versions present on disk, ascending.
    fn versions_on_disk(&self, conversation_id: &str) -> Vec<u32> {
        let Ok(entries) = std::fs::read_dir(self.conversation_dir(conversation_id)) else {
            return Vec::new();
        };
        let mut versions: Vec<u32> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                ARCHIVE_NAME
                    .captures(&name.to_string_lossy())
                    .and_then(|captures| captures.get(1))
                    .and_then(|m| m.as_str().parse().ok())
            })
            .collect();
        versions.sort_unstable();
        versions
    }

    /// Latest version per the manifest, falling back to a file scan.
    fn latest_version(&self, conversation_id: &str) -> Option<u32> {
        if let Some(manifest) = persist::load_json_opt::<Manifest>(&self.manifest_path(conversation_id))
            && manifest.latest_version > 0
            && self
                .archive_path(conversation_id, manifest.latest_version)
                .exists()
        {
            return Some(manifest.latest_version);
        }
        self.versions_on_disk(conversation_id).last().copied()
    }

    /// Bootstraps a manifest from on-disk archive filenames.
    fn manifest_from_files(&self, conversation_id: &str) -> Manifest {
        let versions = self.versions_on_disk(conversation_id);
        let latest = versions.last().copied().unwrap_or(0);

        let mut manifest = Manifest::empty(conversation_id);
        manifest.latest_version = latest;
        for v in versions {
            let is_latest = v == latest;
            manifest.versions.insert(
                v.to_string(),
                VersionRecord {
                    is_latest,
                    status: if is_latest {
                        VersionStatus::Active
                    } else {
                        VersionStatus::Superseded
                    },
                    storage_location: if is_latest {
                        StorageLocation::Hot
                    } else {
                        StorageLocation::Cold
                    },
                    previous_version: (v > 1).then_some(v - 1),
                    supersedes_version: (v > 1).then_some(v - 1),
                    superseded_by_version: None,
                    superseded_at: None,
                },
            );
        }
        manifest
    }

    /// Records a freshly written version in the manifest: the new version
    /// becomes latest/active/hot, the previous latest is demoted to
    /// superseded/cold with supersession lineage.
    fn commit_version(
        &self,
        conversation_id: &str,
        new_version: u32,
        previous_version: Option<u32>,
    ) -> Result<(), DreamError> {
        let mut manifest = persist::load_json_opt(&self.manifest_path(conversation_id))
            .unwrap_or_else(|| self.manifest_from_files(conversation_id));

        if let Some(previous) = previous_version
            && let Some(record) = manifest.versions.get_mut(&previous.to_string())
        {
            record.is_latest = false;
            record.status = VersionStatus::Superseded;
            record.storage_location = StorageLocation::Cold;
            record.superseded_by_version = Some(new_version);
            record.superseded_at = Some(Utc::now());
        }

        manifest.versions.insert(
            new_version.to_string(),
            VersionRecord {
                is_latest: true,
                status: VersionStatus::Active,
                storage_location: StorageLocation::Hot,
                previous_version,
                supersedes_version: previous_version,
                superseded_by_version: None,
                superseded_at: None,
            },
        );
        manifest.latest_version = new_version;
        manifest.updated_at = Utc::now();

        let path = self.manifest_path(conversation_id);
        persist::write_json_atomic(&path, &manifest).map_err(|e| DreamError::Storage {
            path,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Always returns a one-chunk/one-cluster pair for any conversation.
    struct FixedLlm {
        fail: Mutex<bool>,
        calls: Mutex<usize>,
    }

    impl FixedLlm {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: Mutex::new(false),
                calls: Mutex::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: Mutex::new(true),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn generate_response(
            &self,
            query: &str,
            _context: Option<&str>,
        ) -> Result<String, LlmError> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
            if self.fail.lock().map(|f| *f).unwrap_or(false) {
                return Ok("absolutely not json".to_string());
            }
            if query.contains("semantic analysis expert") {
                Ok(r#"{"chunks": [{"content": "hello", "language": "en",
                    "labels": ["greeting"], "speaker": "user",
                    "entities": ["greeter"], "summary": "hi"}]}"#
                    .to_string())
            } else {
                Ok(r#"{"clusters": [{"type": "TOPIC", "title": "Greeting",
                    "summary": "A greeting.", "chunk_ids": ["b_c_0"],
                    "entities": ["greeter"], "insights": [], "related_clusters": []}]}"#
                    .to_string())
            }
        }

        fn model_name(&self) -> String {
            "fixed".to_string()
        }
    }

    fn pipeline(dir: &Path) -> DreamingPipeline {
        DreamingPipeline::new(FixedLlm::new(), QualityLevel::Basic, dir.join("dreams"))
    }

    #[tokio::test]
    async fn test_versions_are_monotonic_from_one() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        let first = pipeline
            .process_conversation("c", "hello", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());
        let second = pipeline
            .process_conversation("c", "world", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let dreams = dir.path().join("dreams").join("c");
        assert!(dreams.join("archive_v1.json").exists());
        assert!(dreams.join("archive_v2.json").exists());
        assert!(dreams.join("manifest.json").exists());
    }

    #[tokio::test]
    async fn test_manifest_lifecycle_after_two_versions() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        pipeline
            .process_conversation("c", "hello", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());
        pipeline
            .process_conversation("c", "world", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());

        let manifest = pipeline.get_manifest("c").unwrap_or_else(|| unreachable!());
        assert_eq!(manifest.latest_version, 2);

        let v1 = manifest.version(1).unwrap_or_else(|| unreachable!());
        assert!(!v1.is_latest);
        assert_eq!(v1.status, VersionStatus::Superseded);
        assert_eq!(v1.storage_location, StorageLocation::Cold);
        assert_eq!(v1.superseded_by_version, Some(2));
        assert!(v1.superseded_at.is_some());

        let v2 = manifest.version(2).unwrap_or_else(|| unreachable!());
        assert!(v2.is_latest);
        assert_eq!(v2.status, VersionStatus::Active);
        assert_eq!(v2.storage_location, StorageLocation::Hot);
        assert_eq!(v2.previous_version, Some(1));
        assert_eq!(v2.supersedes_version, Some(1));
    }

    #[tokio::test]
    async fn test_archive_files_are_immutable() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        pipeline
            .process_conversation("c", "hello", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());
        let v1_path = dir.path().join("dreams").join("c").join("archive_v1.json");
        let before = std::fs::read(&v1_path).unwrap_or_else(|_| unreachable!());

        pipeline
            .process_conversation("c", "world", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());
        let after = std::fs::read(&v1_path).unwrap_or_else(|_| unreachable!());

        // Lifecycle demotion happened only in the manifest.
        assert_eq!(before, after);
        let archive = pipeline.get_archive("c", Some(1)).unwrap_or_else(|_| unreachable!());
        assert_eq!(archive["metadata"]["is_latest"], true);
        assert_eq!(archive["metadata"]["status"], "active");
    }

    #[tokio::test]
    async fn test_failed_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline =
            DreamingPipeline::new(FixedLlm::failing(), QualityLevel::Basic, dir.path().join("dreams"));

        let result = pipeline.process_conversation("c", "hello", json!({})).await;
        assert!(result.is_err());
        assert!(!dir.path().join("dreams").join("c").exists());
        assert!(pipeline.get_manifest("c").is_none());
    }

    #[tokio::test]
    async fn test_get_archive_selects_version() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        pipeline
            .process_conversation("c", "first text", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());
        pipeline
            .process_conversation("c", "second text", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());

        let v1 = pipeline.get_archive("c", Some(1)).unwrap_or_else(|_| unreachable!());
        assert_eq!(v1["metadata"]["original_text"], "first text");

        let latest = pipeline.get_archive("c", None).unwrap_or_else(|_| unreachable!());
        assert_eq!(latest["version"], 2);
        assert_eq!(latest["metadata"]["original_text"], "second text");

        assert!(pipeline.get_archive("missing", None).is_err());
        assert!(pipeline.get_archive("c", Some(9)).is_err());
    }

    #[tokio::test]
    async fn test_manifest_synthesised_from_files_without_persisting() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        pipeline
            .process_conversation("c", "hello", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());

        // Remove the manifest; reads must synthesise but not re-create it.
        let manifest_path = dir.path().join("dreams").join("c").join("manifest.json");
        std::fs::remove_file(&manifest_path).unwrap_or_else(|_| unreachable!());

        let manifest = pipeline.get_manifest("c").unwrap_or_else(|| unreachable!());
        assert_eq!(manifest.latest_version, 1);
        assert!(manifest.version(1).is_some_and(|v| v.is_latest));
        assert!(!manifest_path.exists());
    }

    #[tokio::test]
    async fn test_lifecycle_view() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        pipeline
            .process_conversation("c", "hello", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());

        let lifecycle = pipeline
            .get_archive_lifecycle("c", None)
            .unwrap_or_else(|| unreachable!());
        assert_eq!(lifecycle["conversation_id"], "c");
        assert_eq!(lifecycle["version"], 1);
        assert_eq!(lifecycle["status"], "active");
        assert_eq!(lifecycle["storage_location"], "hot");
    }

    #[tokio::test]
    async fn test_upgrade_quality_produces_new_version() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        pipeline
            .process_conversation("c", "hello", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());

        let outcome = pipeline
            .upgrade_quality("c", QualityLevel::Good)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(outcome.version, 2);
        assert_eq!(outcome.quality_level, QualityLevel::Good);
        assert_eq!(outcome.upgraded_from, Some(QualityLevel::Basic));

        let latest = pipeline.get_archive("c", None).unwrap_or_else(|_| unreachable!());
        assert_eq!(latest["quality_level"], "good");
        // The source text was re-read from the previous archive.
        assert_eq!(latest["metadata"]["original_text"], "hello");
    }

    #[tokio::test]
    async fn test_upgrade_without_original_text_fails() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        // Hand-craft a v1 archive without original_text.
        let conv_dir = dir.path().join("dreams").join("legacy");
        std::fs::create_dir_all(&conv_dir).unwrap_or_else(|_| unreachable!());
        std::fs::write(
            conv_dir.join("archive_v1.json"),
            r#"{"version": 1, "quality_level": "basic", "metadata": {}}"#,
        )
        .unwrap_or_else(|_| unreachable!());

        let result = pipeline.upgrade_quality("legacy", QualityLevel::Good).await;
        assert!(matches!(result, Err(DreamError::MissingOriginalText { .. })));
    }

    #[tokio::test]
    async fn test_list_archives() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let pipeline = pipeline(dir.path());

        pipeline
            .process_conversation("alpha", "hello", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());
        pipeline
            .process_conversation("beta", "world", json!({}))
            .await
            .unwrap_or_else(|_| unreachable!());

        let archives = pipeline.list_archives();
        assert_eq!(archives.len(), 2);
        assert_eq!(archives[0]["conversation_id"], "alpha");
        assert_eq!(archives[0]["latest_version"], 1);
        assert_eq!(archives[0]["status"], "active");
        assert_eq!(archives[0]["chunks_count"], 1);
    }
}
