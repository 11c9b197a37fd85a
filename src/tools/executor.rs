//! Tool executor: dispatches tool calls to the memory orchestrator, web
//! search, and clock.
//!
//! Handlers return structured JSON maps. Precondition failures (nothing to
//! end, unknown IDs) come back as `{status: "error"|"not_found", ...}`
//! result maps rather than errors; only argument and execution failures
//! become [`ToolError`].

#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, Local, Timelike};
use serde_json::{Value, json};
use tracing::info;

use crate::error::ToolError;
use crate::memory::{MemoryOrchestrator, NewDocument};
use crate::search::WebSearchClient;

/// Cap on `get_memory_context.max_items`, matching the schema.
const MAX_CONTEXT_ITEMS: usize = 50;
/// Cap on listing limits.
const MAX_LIST_LIMIT: usize = 50;
/// Bounds on `remove_recent_conversations.count`.
const MAX_REMOVE_COUNT: usize = 100;
/// Cap on web search results.
const MAX_WEB_RESULTS: usize = 10;

/// Executes tool calls against the server's subsystems.
pub struct ToolExecutor {
    memory: Arc<MemoryOrchestrator>,
    web: WebSearchClient,
    start_time: Instant,
    auth_required: bool,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor").finish_non_exhaustive()
    }
}

impl ToolExecutor {
    /// Creates an executor over the given subsystems.
    #[must_use]
    pub fn new(memory: Arc<MemoryOrchestrator>, web: WebSearchClient, auth_required: bool) -> Self {
        Self {
            memory,
            web,
            start_time: Instant::now(),
            auth_required,
        }
    }

    /// Dispatches one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Unknown`] for names outside the catalog,
    /// [`ToolError::InvalidArguments`] for missing/out-of-range arguments,
    /// and [`ToolError::Execution`] for handler failures.
    pub async fn execute(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        info!(tool = name, "executing tool");
        match name {
            "get_memory_context" => self.get_memory_context(args).await,
            "add_documents" => self.add_documents(args).await,
            "add_conversation" => self.add_conversation(args).await,
            "end_conversation" => self.end_conversation().await,
            "toggle_multi_model" => self.toggle_multi_model(args),
            "list_recent_conversations" => self.list_recent_conversations(args),
            "remove_conversation_message" => self.remove_conversation_message(args),
            "remove_recent_conversations" => self.remove_recent_conversations(args),
            "list_recent_documents" => self.list_recent_documents(args),
            "remove_document" => self.remove_document(args),
            "web_search" => self.web_search(args).await,
            "get_current_day" => Ok(current_day()),
            "get_current_time" => Ok(current_time()),
            "get_memory_stats" => Ok(self.memory.memory_stats()),
            "system_info" => Ok(self.system_info()),
            other => Err(ToolError::Unknown {
                name: other.to_string(),
            }),
        }
    }

    async fn get_memory_context(&self, args: &Value) -> Result<Value, ToolError> {
        let query = required_str(args, "get_memory_context", "query")?;
        let max_items = args
            .get("max_items")
            .and_then(Value::as_u64)
            .map_or(crate::memory::DEFAULT_CONTEXT_ITEMS, |n| n as usize);
        if max_items == 0 || max_items > MAX_CONTEXT_ITEMS {
            return Err(ToolError::InvalidArguments {
                tool: "get_memory_context".to_string(),
                message: format!("max_items must be within [1, {MAX_CONTEXT_ITEMS}], got {max_items}"),
                suggestion: Some("omit max_items to use the default of 10".to_string()),
            });
        }

        let items = self.memory.get_context_for_query(query, max_items).await;
        Ok(json!({
            "query": query,
            "context_items": items,
            "total_items": items.len(),
        }))
    }

    async fn add_documents(&self, args: &Value) -> Result<Value, ToolError> {
        let documents = args
            .get("documents")
            .and_then(Value::as_array)
            .filter(|docs| !docs.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "add_documents".to_string(),
                message: "documents must be a non-empty array".to_string(),
                suggestion: Some("pass [{\"content\": \"...\"}]".to_string()),
            })?;

        let mut results = Vec::with_capacity(documents.len());
        for doc in documents {
            let content = doc
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| doc.as_str().map(str::to_string));
            let Some(content) = content.filter(|c| !c.is_empty()) else {
                results.push(json!({"status": "error", "message": "document has no content"}));
                continue;
            };
            let metadata = doc.get("metadata").cloned().unwrap_or_else(|| json!({}));

            match self
                .memory
                .add_documents(vec![NewDocument::chat(content, metadata)])
                .await
            {
                Ok(_) => results.push(json!({"status": "success", "message": "Document added"})),
                Err(e) => results.push(json!({"status": "error", "message": e.to_string()})),
            }
        }

        Ok(json!({
            "results": results,
            "total_processed": documents.len(),
        }))
    }

    async fn add_conversation(&self, args: &Value) -> Result<Value, ToolError> {
        let user_message = required_str(args, "add_conversation", "user_message")?;
        let assistant_message = required_str(args, "add_conversation", "assistant_message")?;

        self.memory.add_user(user_message).await;
        self.memory.add_assistant(assistant_message).await;

        Ok(json!({
            "status": "success",
            "message": "Conversation exchange added to working memory",
            "user_message_length": user_message.len(),
            "assistant_message_length": assistant_message.len(),
        }))
    }

    async fn end_conversation(&self) -> Result<Value, ToolError> {
        let outcome = self
            .memory
            .end_conversation()
            .await
            .map_err(|e| ToolError::Execution {
                tool: "end_conversation".to_string(),
                message: e.to_string(),
            })?;

        Ok(outcome.map_or_else(
            || {
                json!({
                    "status": "error",
                    "message": "No active conversation to end",
                    "suggestion": "add a conversation exchange first with add_conversation",
                })
            },
            |summary| {
                json!({
                    "status": "success",
                    "message": "Conversation ended and archived",
                    "summary": summary.summary,
                    "message_count": summary.message_count,
                    "page_id": summary.page_id,
                    "archival_id": summary.archival_id,
                })
            },
        ))
    }

    fn toggle_multi_model(&self, args: &Value) -> Result<Value, ToolError> {
        let enabled = args
            .get("enabled")
            .and_then(Value::as_bool)
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "toggle_multi_model".to_string(),
                message: "enabled must be a boolean".to_string(),
                suggestion: None,
            })?;

        let (status, message, active) = if enabled {
            if self.memory.enable_multi_model() {
                ("enabled", "Multi-model embedding enabled", true)
            } else {
                ("failed_to_enable", "Failed to enable multi-model", false)
            }
        } else {
            self.memory.disable_multi_model();
            ("disabled", "Multi-model embedding disabled", false)
        };

        Ok(json!({
            "status": status,
            "message": message,
            "multi_model_enabled": active,
            "available_models": self.memory.registered_model_keys(),
        }))
    }

    fn list_recent_conversations(&self, args: &Value) -> Result<Value, ToolError> {
        let limit = list_limit(args);
        let conversations = self.memory.multi_model_store().list_recent_conversations(limit);
        Ok(json!({
            "conversations": conversations,
            "total": conversations.len(),
            "message": format!("Retrieved {} recent conversations", conversations.len()),
        }))
    }

    fn remove_conversation_message(&self, args: &Value) -> Result<Value, ToolError> {
        let message_id = required_str(args, "remove_conversation_message", "message_id")?;
        let removed = self
            .memory
            .multi_model_store()
            .remove_conversation_message(message_id)
            .map_err(|e| ToolError::Execution {
                tool: "remove_conversation_message".to_string(),
                message: e.to_string(),
            })?;

        Ok(json!({
            "success": removed,
            "message": format!(
                "Conversation message {message_id} {}",
                if removed { "removed" } else { "not found" }
            ),
        }))
    }

    fn remove_recent_conversations(&self, args: &Value) -> Result<Value, ToolError> {
        let count = args
            .get("count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "remove_recent_conversations".to_string(),
                message: "count is required".to_string(),
                suggestion: None,
            })?;
        if count == 0 || count > MAX_REMOVE_COUNT {
            return Err(ToolError::InvalidArguments {
                tool: "remove_recent_conversations".to_string(),
                message: format!("count must be within [1, {MAX_REMOVE_COUNT}], got {count}"),
                suggestion: None,
            });
        }

        let removed = self
            .memory
            .multi_model_store()
            .remove_recent_conversations(count)
            .map_err(|e| ToolError::Execution {
                tool: "remove_recent_conversations".to_string(),
                message: e.to_string(),
            })?;

        Ok(json!({
            "removed_count": removed,
            "message": format!("Removed {removed} recent conversations"),
        }))
    }

    fn list_recent_documents(&self, args: &Value) -> Result<Value, ToolError> {
        let limit = list_limit(args);
        let documents = self.memory.multi_model_store().list_recent_documents(limit);
        Ok(json!({
            "documents": documents,
            "total": documents.len(),
            "message": format!("Retrieved {} recent documents", documents.len()),
        }))
    }

    fn remove_document(&self, args: &Value) -> Result<Value, ToolError> {
        let document_id = required_str(args, "remove_document", "document_id")?;

        // The document may live in the knowledge base, the multi-model
        // store, or both.
        let kb_removed = self
            .memory
            .knowledge_base()
            .remove(document_id)
            .map_err(|e| ToolError::Execution {
                tool: "remove_document".to_string(),
                message: e.to_string(),
            })?;
        let mm_removed = self
            .memory
            .multi_model_store()
            .remove_document(document_id)
            .map_err(|e| ToolError::Execution {
                tool: "remove_document".to_string(),
                message: e.to_string(),
            })?;
        let removed = kb_removed || mm_removed;

        Ok(json!({
            "success": removed,
            "message": format!(
                "Document {document_id} {}",
                if removed { "removed" } else { "not found" }
            ),
        }))
    }

    async fn web_search(&self, args: &Value) -> Result<Value, ToolError> {
        let query = required_str(args, "web_search", "query")?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(MAX_WEB_RESULTS, |n| (n as usize).clamp(1, MAX_WEB_RESULTS));
        Ok(self.web.search(query, limit).await)
    }

    fn system_info(&self) -> Value {
        let uptime = self.start_time.elapsed().as_secs();
        json!({
            "server_name": "mnemo-rs",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": uptime,
            "uptime_formatted": format_uptime(uptime),
            "memory_service": "initialized",
            "multi_model_enabled": self.memory.multi_model_enabled(),
            "web_search_configured": self.web.is_configured(),
            "mcp_auth_required": self.auth_required,
        })
    }
}

fn required_str<'a>(args: &'a Value, tool: &str, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing required argument: {key}"),
            suggestion: None,
        })
}

fn list_limit(args: &Value) -> usize {
    args.get("limit")
        .and_then(Value::as_u64)
        .map_or(10, |n| (n as usize).clamp(1, MAX_LIST_LIMIT))
}

/// Formats an uptime in seconds as `"2d 3h"`, `"3h 10m"`, or `"10m"`.
fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn current_day() -> Value {
    let now = Local::now();
    json!({
        "current_date": now.format("%Y-%m-%d").to_string(),
        "year": now.year(),
        "day_of_week": now.format("%A").to_string(),
        "day_of_year": now.ordinal(),
        "week_of_year": now.iso_week().week(),
        "time": now.format("%H:%M:%S").to_string(),
        "timezone": "Local",
        "timestamp": now.timestamp(),
    })
}

fn current_time() -> Value {
    let now = Local::now();
    let hour = now.hour();
    json!({
        "current_time": now.format("%H:%M:%S").to_string(),
        "current_date": now.format("%Y-%m-%d").to_string(),
        "day_of_week": now.format("%A").to_string(),
        "iso_format": now.to_rfc3339(),
        "timezone": "Local",
        "timestamp": now.timestamp(),
        "hour": hour,
        "minute": now.minute(),
        "second": now.second(),
        "am_pm": if hour < 12 { "AM" } else { "PM" },
        "hour_12": if hour % 12 == 0 { 12 } else { hour % 12 },
    })
}
