//! A→B conversion: semantic chunking of raw conversation text.
//!
//! The LLM is asked for a strict JSON document describing the chunks,
//! preserving each chunk's original language. Parse failures get one LLM
//! repair pass; a second failure is fatal. There is deliberately no
//! rule-based fallback - producing silently degraded chunks would poison
//! every later consolidation of the same conversation.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::DreamError;
use crate::llm::LlmClient;

use super::models::{BChunk, ChunkKind, QualityLevel};
use super::parse;

/// Prompt for semantic chunking. Works across languages; chunk content is
/// returned verbatim, untranslated.
const CHUNKING_PROMPT: &str = r#"You are a semantic analysis expert. Analyze the following conversation and break it into meaningful semantic chunks.

CONVERSATION:
{conversation_text}

INSTRUCTIONS:
1. Identify natural semantic boundaries (topic shifts, speaker turns, logical breaks)
2. Each chunk should be 100-800 tokens
3. Extract metadata for each chunk:
   - labels: List of topic tags (e.g., ["technical", "architecture", "billing"])
   - speaker: Who is speaking (user/assistant/system)
   - entities: Named entities mentioned (people, products, concepts)
   - summary: One-sentence summary of the chunk

IMPORTANT:
- Preserve the ORIGINAL language of each chunk (do not translate)
- Multi-lingual conversations: Keep each language as-is
- Detect language per chunk: "zh", "en", "ja", etc.

OUTPUT FORMAT (JSON):
{
  "chunks": [
    {
      "content": "<original text, unchanged>",
      "language": "<detected language code>",
      "labels": ["<tag1>", "<tag2>"],
      "speaker": "<user|assistant|system>",
      "entities": ["<entity1>", "<entity2>"],
      "summary": "<one-sentence summary>"
    }
  ]
}

Return ONLY valid JSON, no additional text."#;

/// Repair prompt asking the model to re-emit strict JSON.
const REPAIR_PROMPT: &str = r#"Convert the following content into STRICT valid JSON with this schema only:
{"chunks":[{"content":"<string>","language":"<string>","labels":["<string>"],"speaker":"<string>","entities":["<string>"],"summary":"<string>"}]}
Return JSON only. No prose, no markdown.

CONTENT:
"#;

/// Rough tokens-per-chunk estimate used for position bookkeeping.
const TOKENS_PER_CHUNK_ESTIMATE: usize = 400;

/// Chunks conversations into semantic pieces via the LLM.
pub struct ConversationChunker {
    llm: Arc<dyn LlmClient>,
    quality: QualityLevel,
}

impl std::fmt::Debug for ConversationChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationChunker")
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl ConversationChunker {
    /// Creates a chunker targeting the given quality level.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, quality: QualityLevel) -> Self {
        Self { llm, quality }
    }

    /// Chunks one conversation into B chunks.
    ///
    /// # Errors
    ///
    /// Returns [`DreamError::ChunkParse`] when the model's output cannot
    /// be parsed even after the repair pass, or [`DreamError::Llm`] on API
    /// failure.
    pub async fn chunk_conversation(
        &self,
        conversation_id: &str,
        conversation_text: &str,
    ) -> Result<Vec<BChunk>, DreamError> {
        debug!(
            conversation_id,
            chars = conversation_text.len(),
            "chunking conversation"
        );

        let prompt = CHUNKING_PROMPT.replace("{conversation_text}", conversation_text);
        let response = self.llm.generate_response(&prompt, None).await?;

        let payload = match parse_chunk_payload(&response) {
            Some(payload) => payload,
            None => self.repair(&response).await?,
        };

        Ok(self.build_chunks(conversation_id, &payload))
    }

    /// One LLM repair pass over unparseable output. A second parse failure
    /// is fatal.
    async fn repair(&self, raw: &str) -> Result<Value, DreamError> {
        let prompt = format!("{REPAIR_PROMPT}{raw}");
        let repaired = self.llm.generate_response(&prompt, None).await?;
        parse_chunk_payload(&repaired).ok_or_else(|| {
            error!("chunker repair pass still unparseable");
            DreamError::ChunkParse {
                message: "repair pass did not produce a chunks object".to_string(),
            }
        })
    }

    fn build_chunks(&self, parent_id: &str, payload: &Value) -> Vec<BChunk> {
        let empty = Vec::new();
        let chunks = payload
            .get("chunks")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let total = chunks.len();
        let model = self.llm.model_name();

        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let content = chunk
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let token_start = i * TOKENS_PER_CHUNK_ESTIMATE;
                let token_end = token_start + content.split_whitespace().count();

                #[allow(clippy::cast_precision_loss)]
                let position = if total == 0 { 0.0 } else { i as f32 / total as f32 };

                BChunk {
                    id: format!("b_{parent_id}_{i}"),
                    parent_id: parent_id.to_string(),
                    kind: ChunkKind::Semantic,
                    content,
                    labels: string_list(chunk.get("labels")),
                    speaker: chunk
                        .get("speaker")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    entities: string_list(chunk.get("entities")),
                    confidence: self.quality.confidence(),
                    token_range: (token_start, token_end),
                    position_in_parent: position,
                    language: chunk
                        .get("language")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    quality_level: self.quality,
                    needs_upgrade: self.quality.needs_upgrade(),
                    llm_used: Some(model.clone()),
                    created_at: Utc::now(),
                }
            })
            .collect()
    }
}

/// Parses the chunking response: strict parse first, then brace-balanced
/// extraction from mixed prose. Returns `None` when no candidate carries a
/// `chunks` array.
fn parse_chunk_payload(response: &str) -> Option<Value> {
    let has_chunks = |value: &Value| value.get("chunks").is_some_and(Value::is_array);

    if let Some(value) = parse_strict_checked(response, has_chunks) {
        return Some(value);
    }
    parse::balanced_objects(parse::strip_code_fences(response))
        .into_iter()
        .find(has_chunks)
}

fn parse_strict_checked(response: &str, check: impl Fn(&Value) -> bool) -> Option<Value> {
    parse::parse_strict(response).filter(check)
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

    /// Scripted client: returns queued responses in order.
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().map(|c| *c).unwrap_or(0)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate_response(
            &self,
            _query: &str,
            _context: Option<&str>,
        ) -> Result<String, LlmError> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
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

    const GOOD_RESPONSE: &str = r#"{"chunks": [
        {"content": "user: hello there", "language": "en", "labels": ["greeting"],
         "speaker": "user", "entities": [], "summary": "greeting"},
        {"content": "assistant: hi", "language": "en", "labels": [],
         "speaker": "assistant", "entities": [], "summary": "reply"}
    ]}"#;

    #[tokio::test]
    async fn test_clean_json_parses_first_try() {
        let llm = ScriptedLlm::new(vec![GOOD_RESPONSE]);
        let chunker = ConversationChunker::new(llm.clone(), QualityLevel::Good);

        let chunks = chunker
            .chunk_conversation("conv1", "user: hello there\nassistant: hi")
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "b_conv1_0");
        assert_eq!(chunks[0].speaker.as_deref(), Some("user"));
        assert!((chunks[0].confidence - 0.9).abs() < f32::EPSILON);
        assert!((chunks[1].position_in_parent - 0.5).abs() < f32::EPSILON);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        let fenced = format!("```json\n{GOOD_RESPONSE}\n```");
        let llm = ScriptedLlm::new(vec![fenced.as_str()]);
        let chunker = ConversationChunker::new(llm, QualityLevel::Basic);

        let chunks = chunker
            .chunk_conversation("c", "text")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(chunks.len(), 2);
        assert!((chunks[0].confidence - 0.7).abs() < f32::EPSILON);
        assert!(chunks[0].needs_upgrade);
    }

    #[tokio::test]
    async fn test_prose_wrapped_json_is_extracted() {
        let prose = format!("Sure! Here are the chunks:\n{GOOD_RESPONSE}\nLet me know.");
        let llm = ScriptedLlm::new(vec![prose.as_str()]);
        let chunker = ConversationChunker::new(llm.clone(), QualityLevel::Basic);

        let chunks = chunker
            .chunk_conversation("c", "text")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(chunks.len(), 2);
        // No repair call was needed.
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_pass_recovers() {
        let llm = ScriptedLlm::new(vec!["utter garbage, no json at all", GOOD_RESPONSE]);
        let chunker = ConversationChunker::new(llm.clone(), QualityLevel::Basic);

        let chunks = chunker
            .chunk_conversation("c", "text")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(chunks.len(), 2);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_double_failure_is_fatal() {
        let llm = ScriptedLlm::new(vec!["garbage one", "garbage two"]);
        let chunker = ConversationChunker::new(llm, QualityLevel::Basic);

        let result = chunker.chunk_conversation("c", "text").await;
        assert!(matches!(result, Err(DreamError::ChunkParse { .. })));
    }
}
