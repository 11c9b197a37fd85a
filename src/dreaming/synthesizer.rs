//! B→C conversion: clustering semantic chunks into synthesised knowledge.
//!
//! The model returns clusters in one of several shapes (a direct list,
//! wrapped under `data.clusters` / `results.clusters` / `items`); all are
//! normalised before the repair pass. A second parse failure is fatal - no
//! rule-based clustering stands in for the model.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::error::DreamError;
use crate::llm::LlmClient;

use super::models::{BChunk, CCluster, ClusterKind, QualityLevel};
use super::parse;

/// Prompt for clustering B chunks into C clusters.
const SYNTHESIS_PROMPT: &str = r#"You are a knowledge synthesis expert. Analyze the following semantic chunks and cluster them into meaningful topics and relationships.

CHUNKS:
{chunks_json}

INSTRUCTIONS:
1. Identify natural clusters:
   - TOPIC: Thematic groupings (e.g., "scheduler architecture", "error handling")
   - RELATIONSHIP: Connected concepts across chunks
   - TIMELINE: Temporal or sequential patterns
   - SUMMARY: High-level overviews

2. For each cluster, provide:
   - type: One of [TOPIC, RELATIONSHIP, TIMELINE, SUMMARY]
   - title: Concise cluster name
   - summary: 1-2 sentence synthesis
   - chunk_ids: List of chunk IDs in this cluster
   - entities: Key entities/concepts
   - insights: Novel connections or patterns discovered

3. Cross-reference clusters when concepts relate

OUTPUT FORMAT (JSON):
{
  "clusters": [
    {
      "type": "TOPIC",
      "title": "<cluster name>",
      "summary": "<synthesis of cluster content>",
      "chunk_ids": ["b_xxx_0", "b_xxx_2"],
      "entities": ["<entity1>", "<entity2>"],
      "insights": ["<insight1>", "<insight2>"],
      "related_clusters": []
    }
  ]
}

Return ONLY valid JSON, no additional text."#;

/// Repair prompt asking the model to re-emit strict JSON.
const REPAIR_PROMPT: &str = r#"Convert the following content into STRICT valid JSON with this schema only:
{"clusters":[{"type":"TOPIC","title":"<string>","summary":"<string>","chunk_ids":["<string>"],"entities":["<string>"],"insights":["<string>"],"related_clusters":["<string>"]}]}
Return JSON only. No prose, no markdown.

CONTENT:
"#;

/// Characters of chunk content included in the synthesis prompt.
const PROMPT_CONTENT_LIMIT: usize = 200;

/// Synthesises B chunks into C clusters via the LLM.
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    quality: QualityLevel,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl Synthesizer {
    /// Creates a synthesizer targeting the given quality level.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, quality: QualityLevel) -> Self {
        Self { llm, quality }
    }

    /// Clusters B chunks into C clusters.
    ///
    /// # Errors
    ///
    /// Returns [`DreamError::SynthesisParse`] when the model's output
    /// cannot be normalised even after the repair pass, or
    /// [`DreamError::Llm`] on API failure.
    pub async fn synthesize_chunks(
        &self,
        chunks: &[BChunk],
        session_id: &str,
    ) -> Result<Vec<CCluster>, DreamError> {
        if chunks.is_empty() {
            debug!(session_id, "no chunks to synthesize");
            return Ok(Vec::new());
        }

        let chunks_json: Vec<Value> = chunks
            .iter()
            .map(|chunk| {
                json!({
                    "id": chunk.id,
                    "content": chunk.content.chars().take(PROMPT_CONTENT_LIMIT).collect::<String>(),
                    "labels": chunk.labels,
                    "speaker": chunk.speaker,
                    "entities": chunk.entities,
                })
            })
            .collect();
        let prompt = SYNTHESIS_PROMPT.replace(
            "{chunks_json}",
            &serde_json::to_string_pretty(&chunks_json).unwrap_or_default(),
        );

        let response = self.llm.generate_response(&prompt, None).await?;

        let payload = match parse_cluster_payload(&response) {
            Some(payload) => payload,
            None => self.repair(&response).await?,
        };

        Ok(self.build_clusters(session_id, &payload))
    }

    async fn repair(&self, raw: &str) -> Result<Value, DreamError> {
        let prompt = format!("{REPAIR_PROMPT}{raw}");
        let repaired = self.llm.generate_response(&prompt, None).await?;
        parse_cluster_payload(&repaired).ok_or_else(|| {
            error!("synthesis repair pass still unparseable");
            DreamError::SynthesisParse {
                message: "repair pass did not produce a clusters object".to_string(),
            }
        })
    }

    fn build_clusters(&self, session_id: &str, payload: &Value) -> Vec<CCluster> {
        let empty = Vec::new();
        let clusters = payload
            .get("clusters")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let model = self.llm.model_name();
        let now = Utc::now();

        clusters
            .iter()
            .enumerate()
            .map(|(i, cluster)| CCluster {
                id: format!("c_{session_id}_{i}"),
                kind: ClusterKind::parse(
                    cluster.get("type").and_then(Value::as_str).unwrap_or("TOPIC"),
                ),
                content: cluster
                    .get("summary")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                related_chunks: string_list(cluster.get("chunk_ids")),
                related_clusters: string_list(cluster.get("related_clusters")),
                theme: cluster
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                entities: string_list(cluster.get("entities")),
                insights: string_list(cluster.get("insights")),
                confidence: self.quality.confidence(),
                version: 1,
                quality_level: self.quality,
                needs_upgrade: self.quality.needs_upgrade(),
                llm_used: Some(model.clone()),
                created_at: now,
                updated_at: now,
            })
            .collect()
    }
}

/// Parses and normalises the synthesis response into `{"clusters": [...]}`.
///
/// Accepts the canonical shape plus `data.clusters`, `results.clusters`,
/// `items`, and a bare cluster array, via strict parse then brace-balanced
/// extraction.
fn parse_cluster_payload(response: &str) -> Option<Value> {
    let cleaned = parse::strip_code_fences(response);

    if let Ok(value) = serde_json::from_str::<Value>(cleaned)
        && let Some(normalised) = normalise_cluster_payload(&value)
    {
        return Some(normalised);
    }

    parse::balanced_objects(cleaned)
        .into_iter()
        .find_map(|value| normalise_cluster_payload(&value))
}

/// Normalises the accepted payload shapes; `None` when the structure
/// cannot be recovered.
fn normalise_cluster_payload(payload: &Value) -> Option<Value> {
    if let Some(array) = payload.as_array() {
        return Some(json!({ "clusters": array }));
    }
    if payload.get("clusters").is_some_and(Value::is_array) {
        return Some(payload.clone());
    }
    for path in [["data", "clusters"], ["results", "clusters"]] {
        if let Some(clusters) = payload
            .get(path[0])
            .and_then(|v| v.get(path[1]))
            .and_then(Value::as_array)
        {
            return Some(json!({ "clusters": clusters }));
        }
    }
    if let Some(items) = payload.get("items").and_then(Value::as_array) {
        return Some(json!({ "clusters": items }));
    }
    None
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate_response(
            &self,
            _query: &str,
            _context: Option<&str>,
        ) -> Result<String, LlmError> {
            let mut responses = self.responses.lock().map_err(|_| LlmError::EmptyResponse)?;
            if responses.is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            Ok(responses.remove(0))
        }

        fn model_name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn sample_chunk(id: &str) -> BChunk {
        BChunk {
            id: id.to_string(),
            parent_id: "conv".to_string(),
            kind: super::super::models::ChunkKind::Semantic,
            content: "scheduler discussion".to_string(),
            labels: vec!["technical".to_string()],
            speaker: Some("user".to_string()),
            entities: vec!["scheduler".to_string()],
            confidence: 0.9,
            token_range: (0, 10),
            position_in_parent: 0.0,
            language: Some("en".to_string()),
            quality_level: QualityLevel::Good,
            needs_upgrade: false,
            llm_used: None,
            created_at: Utc::now(),
        }
    }

    const CANONICAL: &str = r#"{"clusters": [{"type": "TOPIC", "title": "Scheduler",
        "summary": "Discussion of the scheduler.", "chunk_ids": ["b_conv_0"],
        "entities": ["scheduler"], "insights": [], "related_clusters": []}]}"#;

    #[tokio::test]
    async fn test_canonical_shape() {
        let synthesizer = Synthesizer::new(ScriptedLlm::new(vec![CANONICAL]), QualityLevel::Good);
        let clusters = synthesizer
            .synthesize_chunks(&[sample_chunk("b_conv_0")], "conv")
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, "c_conv_0");
        assert_eq!(clusters[0].kind, ClusterKind::Topic);
        assert_eq!(clusters[0].theme.as_deref(), Some("Scheduler"));
        assert_eq!(clusters[0].related_chunks, vec!["b_conv_0"]);
        assert_eq!(clusters[0].version, 1);
    }

    #[test]
    fn test_normalise_wrapped_shapes() {
        let data = json!({"data": {"clusters": [{"type": "SUMMARY"}]}});
        let normalised = normalise_cluster_payload(&data).unwrap_or_else(|| unreachable!());
        assert_eq!(normalised["clusters"].as_array().map(Vec::len), Some(1));

        let results = json!({"results": {"clusters": [{"type": "TOPIC"}]}});
        assert!(normalise_cluster_payload(&results).is_some());

        let items = json!({"items": [{"type": "TIMELINE"}]});
        assert!(normalise_cluster_payload(&items).is_some());

        let bare = json!([{"type": "TOPIC"}]);
        assert!(normalise_cluster_payload(&bare).is_some());

        let wrong = json!({"something": 1});
        assert!(normalise_cluster_payload(&wrong).is_none());
    }

    #[tokio::test]
    async fn test_prose_extraction() {
        let prose = format!("The clusters are as follows:\n{CANONICAL}\nDone.");
        let synthesizer =
            Synthesizer::new(ScriptedLlm::new(vec![prose.as_str()]), QualityLevel::Basic);
        let clusters = synthesizer
            .synthesize_chunks(&[sample_chunk("b_conv_0")], "conv")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(clusters.len(), 1);
        assert!((clusters[0].confidence - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_repair_then_fatal() {
        let synthesizer = Synthesizer::new(
            ScriptedLlm::new(vec!["nonsense", "more nonsense"]),
            QualityLevel::Basic,
        );
        let result = synthesizer
            .synthesize_chunks(&[sample_chunk("b_conv_0")], "conv")
            .await;
        assert!(matches!(result, Err(DreamError::SynthesisParse { .. })));
    }

    #[tokio::test]
    async fn test_empty_chunks_short_circuits() {
        let synthesizer = Synthesizer::new(ScriptedLlm::new(vec![]), QualityLevel::Basic);
        let clusters = synthesizer
            .synthesize_chunks(&[], "conv")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(clusters.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_maps_to_topic() {
        let odd = r#"{"clusters": [{"type": "WEIRD", "title": "t", "summary": "s",
            "chunk_ids": [], "entities": [], "insights": [], "related_clusters": []}]}"#;
        let synthesizer = Synthesizer::new(ScriptedLlm::new(vec![odd]), QualityLevel::Good);
        let clusters = synthesizer
            .synthesize_chunks(&[sample_chunk("b_conv_0")], "conv")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(clusters[0].kind, ClusterKind::Topic);
    }
}
