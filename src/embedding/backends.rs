//! Embedding backend implementations.
//!
//! Each backend turns text into vectors or fails with [`EmbeddingError`];
//! the service layer decides what a failure means (fall back to the
//! deterministic random backend). The random backend itself cannot fail.

use std::time::Duration;

use serde_json::{Value, json};

use crate::error::EmbeddingError;

/// Timeout for single-text local server calls.
const LOCAL_SINGLE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for batch local server calls.
const LOCAL_BATCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for single-text remote API calls.
const API_SINGLE_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for batch remote API calls.
const API_BATCH_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Deterministic random fallback
// ---------------------------------------------------------------------------

/// Generates a deterministic pseudo-random unit vector seeded by the hash
/// of the text.
///
/// The same text always produces the same vector (byte-for-byte), so even
/// the fallback backend gives stable rankings across calls and restarts.
#[must_use]
pub fn random_embedding(text: &str, dim: usize) -> Vec<f32> {
    let dim = if dim == 0 { 768 } else { dim };

    // Seed from the first eight bytes of the content hash.
    let digest = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.finalize()
    };
    let mut seed = u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);

    // splitmix64 stream mapped into [-1, 1).
    let mut vector: Vec<f32> = (0..dim)
        .map(|_| {
            seed = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = seed;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^= z >> 31;
            #[allow(clippy::cast_precision_loss)]
            let unit = (z >> 11) as f32 / (1u64 << 53) as f32;
            unit.mul_add(2.0, -1.0)
        })
        .collect();

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

// ---------------------------------------------------------------------------
// Response-shape helpers
// ---------------------------------------------------------------------------

/// Extracts a vector from a `Value` array of numbers.
fn as_vector(value: &Value) -> Option<Vec<f32>> {
    let array = value.as_array()?;
    let mut out = Vec::with_capacity(array.len());
    for item in array {
        #[allow(clippy::cast_possible_truncation)]
        out.push(item.as_f64()? as f32);
    }
    Some(out)
}

/// Accepts `{"embedding": [...]}` or `{"data": [{"embedding": [...]}]}`.
fn extract_single(value: &Value) -> Option<Vec<f32>> {
    if let Some(embedding) = value.get("embedding") {
        return as_vector(embedding);
    }
    value
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("embedding"))
        .and_then(as_vector)
}

/// Accepts `{"embeddings": [[...]]}` or `{"data": [{"embedding": [...]}]}`.
fn extract_batch(value: &Value) -> Option<Vec<Vec<f32>>> {
    if let Some(embeddings) = value.get("embeddings").and_then(Value::as_array) {
        return embeddings.iter().map(as_vector).collect();
    }
    value
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| {
            items
                .iter()
                .map(|item| item.get("embedding").and_then(as_vector))
                .collect::<Option<Vec<_>>>()
        })
}

fn backend_error(backend: &str, message: impl Into<String>) -> EmbeddingError {
    EmbeddingError::Backend {
        backend: backend.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Local HTTP server backend
// ---------------------------------------------------------------------------

/// Client for a local embedding server speaking `{text}` / `{texts}`.
#[derive(Debug, Clone)]
pub struct LocalHttpBackend {
    client: reqwest::Client,
    url: String,
}

impl LocalHttpBackend {
    /// Creates a backend pointing at `url`.
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Backend`] on network failure, non-success
    /// status, or an unrecognised response shape.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(LOCAL_SINGLE_TIMEOUT)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| backend_error("local", e.to_string()))?;

        if !response.status().is_success() {
            return Err(backend_error(
                "local",
                format!("server returned {}", response.status()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| backend_error("local", e.to_string()))?;
        extract_single(&body).ok_or_else(|| backend_error("local", "unrecognised response shape"))
    }

    /// Embeds a batch, falling back to per-text requests if the server
    /// does not understand `{texts}`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Backend`] when both the batch call and the
    /// per-text fallback fail.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let batch = self
            .client
            .post(&self.url)
            .timeout(LOCAL_BATCH_TIMEOUT)
            .json(&json!({ "texts": texts }))
            .send()
            .await;

        if let Ok(response) = batch
            && response.status().is_success()
        {
            let body = response.json::<Value>().await;
            if let Ok(body) = body
                && let Some(vectors) = extract_batch(&body)
                && vectors.len() == texts.len()
            {
                return Ok(vectors);
            }
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }
}

// ---------------------------------------------------------------------------
// Remote API backend
// ---------------------------------------------------------------------------

/// Which remote provider request/response shape to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    /// `input` + `model` → `data[i].embedding`, index-ordered.
    OpenAi,
    /// `texts` + `model` → `embeddings[i]`.
    Cohere,
    /// Generic passthrough, `{text|texts, model}` against a configured URL.
    Generic,
}

impl Provider {
    /// Infers the provider from the model name.
    fn detect(model_name: &str) -> Self {
        let lower = model_name.to_lowercase();
        if lower.contains("openai") {
            Self::OpenAi
        } else if lower.contains("cohere") {
            Self::Cohere
        } else {
            Self::Generic
        }
    }
}

/// Client for remote embedding provider APIs with bearer-token auth.
#[derive(Debug, Clone)]
pub struct RemoteApiBackend {
    client: reqwest::Client,
    model_name: String,
    api_key: Option<String>,
    generic_url: String,
}

impl RemoteApiBackend {
    /// Creates a backend for `model_name`; `generic_url` is used when no
    /// recognised provider matches.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        model_name: impl Into<String>,
        api_key: Option<String>,
        generic_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model_name: model_name.into(),
            api_key,
            generic_url: generic_url.into(),
        }
    }

    fn request(&self, url: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url).timeout(timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn post_json(
        &self,
        url: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, EmbeddingError> {
        let response = self
            .request(url, timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| backend_error("api", e.to_string()))?;

        if !response.status().is_success() {
            return Err(backend_error(
                "api",
                format!("provider returned {}", response.status()),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| backend_error("api", e.to_string()))
    }

    /// Embeds one text through the detected provider.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Backend`] on network failure, non-success
    /// status, or an unrecognised response shape.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = match Provider::detect(&self.model_name) {
            Provider::OpenAi => {
                self.post_json(
                    "https://api.openai.com/v1/embeddings",
                    &json!({ "input": text, "model": self.model_name }),
                    API_SINGLE_TIMEOUT,
                )
                .await?
            }
            Provider::Cohere => {
                let body = self
                    .post_json(
                        "https://api.cohere.ai/v1/embed",
                        &json!({ "texts": [text], "model": self.model_name }),
                        API_SINGLE_TIMEOUT,
                    )
                    .await?;
                return extract_batch(&body)
                    .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) })
                    .ok_or_else(|| backend_error("api", "unrecognised cohere response"));
            }
            Provider::Generic => {
                self.post_json(
                    &self.generic_url,
                    &json!({ "text": text, "model": self.model_name }),
                    API_SINGLE_TIMEOUT,
                )
                .await?
            }
        };

        extract_single(&body).ok_or_else(|| backend_error("api", "unrecognised response shape"))
    }

    /// Embeds a batch through the detected provider.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Backend`] when the batch call fails and the
    /// per-text fallback also fails.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let result = match Provider::detect(&self.model_name) {
            Provider::OpenAi => {
                let body = self
                    .post_json(
                        "https://api.openai.com/v1/embeddings",
                        &json!({ "input": texts, "model": self.model_name }),
                        API_BATCH_TIMEOUT,
                    )
                    .await?;
                // The API may return items out of order; re-sort by index.
                body.get("data").and_then(Value::as_array).and_then(|items| {
                    let mut indexed: Vec<(u64, Vec<f32>)> = items
                        .iter()
                        .map(|item| {
                            let idx = item.get("index").and_then(Value::as_u64)?;
                            let vector = item.get("embedding").and_then(as_vector)?;
                            Some((idx, vector))
                        })
                        .collect::<Option<Vec<_>>>()?;
                    indexed.sort_by_key(|(idx, _)| *idx);
                    Some(indexed.into_iter().map(|(_, v)| v).collect())
                })
            }
            Provider::Cohere => {
                let body = self
                    .post_json(
                        "https://api.cohere.ai/v1/embed",
                        &json!({ "texts": texts, "model": self.model_name }),
                        API_BATCH_TIMEOUT,
                    )
                    .await?;
                extract_batch(&body)
            }
            Provider::Generic => {
                let body = self
                    .post_json(
                        &self.generic_url,
                        &json!({ "texts": texts, "model": self.model_name }),
                        API_BATCH_TIMEOUT,
                    )
                    .await?;
                extract_batch(&body)
            }
        };

        match result {
            Some(vectors) if vectors.len() == texts.len() => Ok(vectors),
            _ => {
                // Batch shape failed; retry text by text.
                let mut vectors = Vec::with_capacity(texts.len());
                for text in texts {
                    vectors.push(self.embed_one(text).await?);
                }
                Ok(vectors)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-process backend (feature-gated)
// ---------------------------------------------------------------------------

/// In-process sentence-transformer backend via `fastembed`.
#[cfg(feature = "fastembed-embeddings")]
pub mod in_process {
    use std::sync::Mutex;

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use crate::error::EmbeddingError;

    /// Maps a model name to a bundled `fastembed` model and its dimension.
    fn resolve_model(model_name: &str) -> (EmbeddingModel, usize) {
        match model_name {
            "BAAI/bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "BAAI/bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            "BAAI/bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
            "nomic-ai/nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v2-moe" => {
                (EmbeddingModel::NomicEmbedTextV15, 768)
            }
            "intfloat/multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
            _ => (EmbeddingModel::AllMiniLML6V2, 384),
        }
    }

    /// A loaded in-process embedding model.
    pub struct InProcessModel {
        model: Mutex<TextEmbedding>,
        dim: usize,
    }

    impl std::fmt::Debug for InProcessModel {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("InProcessModel").field("dim", &self.dim).finish()
        }
    }

    impl InProcessModel {
        /// Loads the model mapped from `model_name`.
        ///
        /// # Errors
        ///
        /// Returns [`EmbeddingError::Backend`] if model initialisation fails.
        pub fn load(model_name: &str) -> Result<Self, EmbeddingError> {
            let (model, dim) = resolve_model(model_name);
            let text_embedding =
                TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
                    .map_err(|e| EmbeddingError::Backend {
                        backend: "in-process".to_string(),
                        message: e.to_string(),
                    })?;
            Ok(Self {
                model: Mutex::new(text_embedding),
                dim,
            })
        }

        /// Vector dimension of the loaded model.
        #[must_use]
        pub const fn dim(&self) -> usize {
            self.dim
        }

        /// Embeds a batch of texts.
        ///
        /// # Errors
        ///
        /// Returns [`EmbeddingError::Backend`] if inference fails.
        pub fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let model = self.model.lock().map_err(|_| EmbeddingError::Backend {
                backend: "in-process".to_string(),
                message: "model mutex poisoned".to_string(),
            })?;
            model.embed(texts, None).map_err(|e| EmbeddingError::Backend {
                backend: "in-process".to_string(),
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_embedding_deterministic() {
        let a = random_embedding("the same text", 64);
        let b = random_embedding("the same text", 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_embedding_distinct_texts_differ() {
        let a = random_embedding("alpha", 64);
        let b = random_embedding("beta", 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_embedding_is_unit_length() {
        let v = random_embedding("normalise me", 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_random_embedding_zero_dim_defaults() {
        assert_eq!(random_embedding("x", 0).len(), 768);
    }

    #[test]
    fn test_extract_single_shapes() {
        let direct = serde_json::json!({ "embedding": [0.1, 0.2] });
        assert_eq!(extract_single(&direct), Some(vec![0.1, 0.2]));

        let nested = serde_json::json!({ "data": [{ "embedding": [1.0] }] });
        assert_eq!(extract_single(&nested), Some(vec![1.0]));

        let bogus = serde_json::json!({ "vectors": [] });
        assert_eq!(extract_single(&bogus), None);
    }

    #[test]
    fn test_extract_batch_shapes() {
        let plural = serde_json::json!({ "embeddings": [[1.0], [2.0]] });
        assert_eq!(extract_batch(&plural), Some(vec![vec![1.0], vec![2.0]]));

        let data = serde_json::json!({ "data": [{ "embedding": [1.0] }, { "embedding": [2.0] }] });
        assert_eq!(extract_batch(&data), Some(vec![vec![1.0], vec![2.0]]));
    }

    #[test]
    fn test_provider_detection() {
        assert_eq!(Provider::detect("openai-text-embedding-3-small"), Provider::OpenAi);
        assert_eq!(Provider::detect("cohere-embed-v3"), Provider::Cohere);
        assert_eq!(Provider::detect("BAAI/bge-m3"), Provider::Generic);
    }
}
