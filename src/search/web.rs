//! Web search via the Google Custom Search API.
//!
//! Failures never propagate as errors: the tool contract returns a
//! structured `{error, query, results: [], total_results: 0}` map so the
//! calling LLM can see what happened and move on.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{error, info};

use crate::config::WebSearchConfig;

/// Request timeout for search calls.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
/// The API serves at most this many results per request.
const MAX_RESULTS_PER_CALL: usize = 10;
/// Custom Search endpoint.
const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Custom Search client.
#[derive(Debug, Clone)]
pub struct WebSearchClient {
    client: reqwest::Client,
    api_key: Option<String>,
    engine_id: Option<String>,
}

impl WebSearchClient {
    /// Creates a client from configuration; missing credentials are
    /// reported per-call rather than at construction.
    #[must_use]
    pub fn new(config: &WebSearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.google_api_key.clone(),
            engine_id: config.search_engine_id.clone(),
        }
    }

    /// Whether credentials are configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.engine_id.is_some()
    }

    /// Searches the web, returning a structured result map.
    ///
    /// On any failure (missing credentials, network, API error) returns
    /// the error shape instead of propagating.
    pub async fn search(&self, query: &str, limit: usize) -> Value {
        let (Some(api_key), Some(engine_id)) = (&self.api_key, &self.engine_id) else {
            return error_shape(
                query,
                "Google API credentials not available. Configure GOOGLE_API_KEY and GOOGLE_SEARCH_ENGINE_ID.",
            );
        };

        let limit = limit.clamp(1, MAX_RESULTS_PER_CALL);
        info!(query, limit, "web search");

        let num = limit.to_string();
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .timeout(SEARCH_TIMEOUT)
            .query(&[
                ("key", api_key.as_str()),
                ("cx", engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                error!(status = %response.status(), "web search returned non-success");
                return error_shape(query, &format!("Google API failed: {}", response.status()));
            }
            Err(e) => {
                error!(error = %e, "web search request failed");
                return error_shape(query, &format!("Google API failed: {e}"));
            }
        };

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return error_shape(query, &format!("Google API failed: {e}")),
        };

        let results: Vec<Value> = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(limit)
                    .map(|item| {
                        json!({
                            "title": item.get("title").and_then(Value::as_str).unwrap_or_default(),
                            "content": item.get("snippet").and_then(Value::as_str).unwrap_or_default(),
                            "url": item.get("link").and_then(Value::as_str).unwrap_or_default(),
                            "source": "google",
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total_results = body
            .get("searchInformation")
            .and_then(|info| info.get("totalResults"))
            .cloned()
            .unwrap_or_else(|| json!(results.len()));

        json!({
            "query": query,
            "results": results,
            "total_results": total_results,
            "source": "google",
        })
    }
}

/// The structured error shape shared by all failure paths.
fn error_shape(query: &str, message: &str) -> Value {
    json!({
        "error": message,
        "query": query,
        "results": [],
        "total_results": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_credentials_error_shape() {
        let client = WebSearchClient::new(&WebSearchConfig::default());
        assert!(!client.is_configured());

        let result = client.search("anything", 5).await;
        assert_eq!(result["query"], "anything");
        assert_eq!(result["total_results"], 0);
        assert!(result["results"].as_array().is_some_and(Vec::is_empty));
        assert!(result["error"].as_str().is_some_and(|e| e.contains("GOOGLE_API_KEY")));
    }

    #[test]
    fn test_is_configured() {
        let config = WebSearchConfig {
            google_api_key: Some("k".to_string()),
            search_engine_id: Some("cx".to_string()),
        };
        assert!(WebSearchClient::new(&config).is_configured());
    }

    #[test]
    fn test_error_shape_fields() {
        let shape = error_shape("q", "boom");
        assert_eq!(shape["error"], "boom");
        assert_eq!(shape["query"], "q");
        assert_eq!(shape["results"], serde_json::json!([]));
        assert_eq!(shape["total_results"], 0);
    }
}
