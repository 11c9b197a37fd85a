//! Declarative tool catalog.
//!
//! Every tool the server exposes is described here: name, description,
//! JSON-Schema input (Draft-07 subset: object properties, required, enums,
//! ranges, minItems), category, priority, and an optional user-prompt
//! template. Dispatch lives in the executor; this module is pure data.

use serde_json::{Value, json};

/// Tool category for grouped listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Memory and context retrieval.
    Memory,
    /// Conversation management.
    Conversation,
    /// Knowledge-base management.
    Knowledge,
    /// Web search, time, configuration.
    Utilities,
}

impl Category {
    /// Returns the lowercase string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Conversation => "conversation",
            Self::Knowledge => "knowledge",
            Self::Utilities => "utilities",
        }
    }

    /// Human description of the category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Memory => "Memory and context retrieval tools for accessing stored information",
            Self::Conversation => {
                "Conversation management tools for preserving and organizing dialogue history"
            }
            Self::Knowledge => "Knowledge base tools for managing reference materials and documents",
            Self::Utilities => {
                "Utility tools for web search, time information, and system configuration"
            }
        }
    }
}

/// Priority bucket controlling how prominently a tool is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Core tools every client should wire up.
    High,
    /// Useful but situational.
    Medium,
    /// Maintenance and cleanup.
    Low,
}

impl Priority {
    /// Returns the lowercase string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A standardised user-prompt template helping LLM clients phrase calls.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PromptTemplate {
    /// Fill-in template string.
    pub template: &'static str,
    /// Example invocations.
    pub examples: &'static [&'static str],
    /// When and why to reach for the tool.
    pub usage_tip: &'static str,
}

/// One tool descriptor.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Tool name (dispatch key).
    pub name: &'static str,
    /// Description surfaced to clients.
    pub description: &'static str,
    /// JSON-Schema for the arguments object.
    pub input_schema: Value,
    /// Category bucket.
    pub category: Category,
    /// Priority bucket.
    pub priority: Priority,
    /// Optional user-prompt template.
    pub template: Option<PromptTemplate>,
}

impl ToolSpec {
    /// The MCP-facing descriptor: `{name, description, inputSchema}`.
    #[must_use]
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// Tools defined in the catalog but hidden from `tools/list` (reserved or
/// redundant; still executable).
pub const PLACEHOLDER_TOOLS: &[&str] = &["get_current_time", "get_memory_stats"];

/// The fixed subset that should always be wired into an LLM client.
pub const ESSENTIAL_TOOLS: &[&str] = &[
    "get_memory_context",
    "add_conversation",
    "add_documents",
    "end_conversation",
    "web_search",
];

/// Builds the full catalog.
#[must_use]
pub fn catalog() -> Vec<ToolSpec> {
    vec![
        def_get_memory_context(),
        def_system_info(),
        def_add_documents(),
        def_add_conversation(),
        def_get_memory_stats(),
        def_end_conversation(),
        def_toggle_multi_model(),
        def_list_recent_conversations(),
        def_remove_conversation_message(),
        def_remove_recent_conversations(),
        def_list_recent_documents(),
        def_remove_document(),
        def_web_search(),
        def_get_current_day(),
        def_get_current_time(),
    ]
}

fn def_get_memory_context() -> ToolSpec {
    ToolSpec {
        name: "get_memory_context",
        description: "Search all memory tiers (working, active, archival, knowledge base) for \
                      relevant context. Supports multilingual queries.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query",
                    "minLength": 1
                },
                "max_items": {
                    "type": "integer",
                    "description": "Maximum number of context items to return",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 50
                }
            },
            "required": ["query"]
        }),
        category: Category::Memory,
        priority: Priority::High,
        template: Some(PromptTemplate {
            template: "Search my memory for information about: {query}",
            examples: &[
                "Search my memory for information about: project deadlines",
                "Search my memory for information about: database schema decisions",
            ],
            usage_tip: "Use this tool to retrieve relevant context from memory before answering \
                        questions or providing information.",
        }),
    }
}

fn def_system_info() -> ToolSpec {
    ToolSpec {
        name: "system_info",
        description: "Get server status: version, uptime, mode, and configuration flags.",
        input_schema: json!({
            "type": "object",
            "properties": {},
            "required": []
        }),
        category: Category::Utilities,
        priority: Priority::Medium,
        template: None,
    }
}

fn def_add_documents() -> ToolSpec {
    ToolSpec {
        name: "add_documents",
        description: "Add reference documents to the knowledge base for permanent storage. Use \
                      for documentation, code examples, or reference material.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "documents": {
                    "type": "array",
                    "description": "Array of documents to add",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {
                                "type": "string",
                                "description": "Document content",
                                "minLength": 1
                            },
                            "metadata": {
                                "type": "object",
                                "description": "Optional metadata (title, topic, tags, etc.)",
                                "additionalProperties": true
                            }
                        },
                        "required": ["content"]
                    },
                    "minItems": 1
                }
            },
            "required": ["documents"]
        }),
        category: Category::Knowledge,
        priority: Priority::High,
        template: Some(PromptTemplate {
            template: "Add these documents to my knowledge base: {content}",
            examples: &["Add these documents to my knowledge base: our deployment runbook"],
            usage_tip: "Use this tool to permanently store reference material that should be \
                        available for future conversations.",
        }),
    }
}

fn def_add_conversation() -> ToolSpec {
    ToolSpec {
        name: "add_conversation",
        description: "Add a complete conversation exchange (user question + assistant reply) to \
                      working memory. Call this after each Q&A interaction to build conversation \
                      context.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "user_message": {
                    "type": "string",
                    "description": "The user's question or message",
                    "minLength": 1
                },
                "assistant_message": {
                    "type": "string",
                    "description": "The assistant's response or reply",
                    "minLength": 1
                }
            },
            "required": ["user_message", "assistant_message"]
        }),
        category: Category::Conversation,
        priority: Priority::High,
        template: Some(PromptTemplate {
            template: "Remember this conversation: User asked '{user_message}' and I responded \
                       '{assistant_message}'",
            examples: &[
                "Remember this conversation: User asked 'What is Rust?' and I responded 'Rust is \
                 a systems programming language...'",
            ],
            usage_tip: "Call this tool after every user question and your response to maintain \
                        conversation context.",
        }),
    }
}

fn def_get_memory_stats() -> ToolSpec {
    ToolSpec {
        name: "get_memory_stats",
        description: "Get comprehensive statistics about the memory system.",
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
        category: Category::Memory,
        priority: Priority::Medium,
        template: None,
    }
}

fn def_end_conversation() -> ToolSpec {
    ToolSpec {
        name: "end_conversation",
        description: "End the current conversation and archive it to memory.",
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
        category: Category::Conversation,
        priority: Priority::Medium,
        template: Some(PromptTemplate {
            template: "Archive our current conversation topic",
            examples: &["Archive our current conversation topic"],
            usage_tip: "Use when switching to a completely different topic or when the current \
                        discussion is complete.",
        }),
    }
}

fn def_toggle_multi_model() -> ToolSpec {
    ToolSpec {
        name: "toggle_multi_model",
        description: "Enable or disable multi-model embedding support at runtime.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "enabled": {
                    "type": "boolean",
                    "description": "True to enable multi-model, false to disable"
                }
            },
            "required": ["enabled"]
        }),
        category: Category::Utilities,
        priority: Priority::Medium,
        template: Some(PromptTemplate {
            template: "Toggle multi-model embeddings: {enabled}",
            examples: &["Toggle multi-model embeddings: true"],
            usage_tip: "Enable for better search accuracy across diverse content types, disable \
                        to reduce resource usage.",
        }),
    }
}

fn def_list_recent_conversations() -> ToolSpec {
    ToolSpec {
        name: "list_recent_conversations",
        description: "List recent conversation messages for management/cleanup. Shows message \
                      previews with IDs for removal.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Number of recent conversations to show",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 50
                }
            }
        }),
        category: Category::Conversation,
        priority: Priority::Medium,
        template: Some(PromptTemplate {
            template: "Show me my recent conversation history",
            examples: &["Show me my recent conversation history"],
            usage_tip: "Use this to review conversation history or identify conversations that \
                        need cleanup.",
        }),
    }
}

fn def_remove_conversation_message() -> ToolSpec {
    ToolSpec {
        name: "remove_conversation_message",
        description: "Remove a specific conversation message by its ID.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "message_id": {
                    "type": "string",
                    "description": "ID of the message to remove",
                    "minLength": 1
                }
            },
            "required": ["message_id"]
        }),
        category: Category::Conversation,
        priority: Priority::Low,
        template: Some(PromptTemplate {
            template: "Remove conversation message with ID: {message_id}",
            examples: &["Remove conversation message with ID: msg_20260801_120000_0"],
            usage_tip: "Use to remove specific problematic conversation messages that are \
                        cluttering memory.",
        }),
    }
}

fn def_remove_recent_conversations() -> ToolSpec {
    ToolSpec {
        name: "remove_recent_conversations",
        description: "Remove the most recent N conversation messages.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "count": {
                    "type": "integer",
                    "description": "Number of recent messages to remove",
                    "minimum": 1,
                    "maximum": 100
                }
            },
            "required": ["count"]
        }),
        category: Category::Conversation,
        priority: Priority::Low,
        template: Some(PromptTemplate {
            template: "Remove my last {count} conversations",
            examples: &["Remove my last 5 conversations"],
            usage_tip: "Use for bulk cleanup of multiple recent problematic conversations.",
        }),
    }
}

fn def_list_recent_documents() -> ToolSpec {
    ToolSpec {
        name: "list_recent_documents",
        description: "List recent documents in the knowledge base with previews and IDs.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Number of recent documents to show",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 50
                }
            }
        }),
        category: Category::Knowledge,
        priority: Priority::Low,
        template: Some(PromptTemplate {
            template: "Show me my recent documents in the knowledge base",
            examples: &["Show me my recent documents in the knowledge base"],
            usage_tip: "Use this to review what documents are stored in the knowledge base.",
        }),
    }
}

fn def_remove_document() -> ToolSpec {
    ToolSpec {
        name: "remove_document",
        description: "Remove a specific document from the knowledge base by its ID.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "document_id": {
                    "type": "string",
                    "description": "ID of the document to remove",
                    "minLength": 1
                }
            },
            "required": ["document_id"]
        }),
        category: Category::Knowledge,
        priority: Priority::Low,
        template: Some(PromptTemplate {
            template: "Remove document with ID: {document_id}",
            examples: &["Remove document with ID: 5f2c1f0aa3b84d21"],
            usage_tip: "Use to remove documents that are outdated, incorrect, or no longer \
                        relevant.",
        }),
    }
}

fn def_web_search() -> ToolSpec {
    ToolSpec {
        name: "web_search",
        description: "Search the internet for current information using the Google Custom Search \
                      API. Returns relevant results with citations.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query",
                    "minLength": 1
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results",
                    "default": 10,
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["query"]
        }),
        category: Category::Utilities,
        priority: Priority::Medium,
        template: Some(PromptTemplate {
            template: "Search the web for: {query}",
            examples: &["Search the web for: latest stable Rust release"],
            usage_tip: "Use when you need up-to-date information, news, or data not available in \
                        local memory.",
        }),
    }
}

fn def_get_current_day() -> ToolSpec {
    ToolSpec {
        name: "get_current_day",
        description: "Get the current date, day of week, and time information.",
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
        category: Category::Utilities,
        priority: Priority::Medium,
        template: Some(PromptTemplate {
            template: "What is today's date and day?",
            examples: &["What is today's date and day?"],
            usage_tip: "Use for questions about today's date, current day, time, or year \
                        information.",
        }),
    }
}

fn def_get_current_time() -> ToolSpec {
    ToolSpec {
        name: "get_current_time",
        description: "Get detailed current time information.",
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
        category: Category::Utilities,
        priority: Priority::Low,
        template: None,
    }
}
