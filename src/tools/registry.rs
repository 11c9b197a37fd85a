//! Tool registry: catalog views and validated dispatch.
//!
//! Listing filters out placeholder tools; execution accepts them (a
//! placeholder is hidden, not disabled). Dispatch validates the presence
//! of required arguments against each tool's schema; deeper schema
//! validation is advisory and left to handlers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::ToolError;

use super::catalog::{self, Category, Priority, ToolSpec};
use super::executor::ToolExecutor;

/// Registry over the declarative catalog plus the executor.
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    placeholders: HashSet<&'static str>,
    executor: Arc<ToolExecutor>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.specs.len())
            .field("placeholders", &self.placeholders.len())
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Creates the registry with the built-in catalog.
    #[must_use]
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self {
            specs: catalog::catalog(),
            placeholders: catalog::PLACEHOLDER_TOOLS.iter().copied().collect(),
            executor,
        }
    }

    /// MCP tool descriptors, excluding placeholders.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Value> {
        self.visible_specs().map(ToolSpec::descriptor).collect()
    }

    /// Descriptors including each tool's user-prompt template where one is
    /// defined.
    #[must_use]
    pub fn list_tools_with_templates(&self) -> Vec<Value> {
        self.visible_specs()
            .map(|spec| {
                let mut descriptor = spec.descriptor();
                if let Some(template) = &spec.template {
                    descriptor["user_prompt_template"] =
                        serde_json::to_value(template).unwrap_or(Value::Null);
                }
                descriptor
            })
            .collect()
    }

    /// Visible tools grouped by category.
    #[must_use]
    pub fn by_category(&self) -> BTreeMap<&'static str, Vec<Value>> {
        let mut grouped: BTreeMap<&'static str, Vec<Value>> = BTreeMap::new();
        for category in [
            Category::Memory,
            Category::Conversation,
            Category::Knowledge,
            Category::Utilities,
        ] {
            grouped.insert(category.as_str(), Vec::new());
        }
        for spec in self.visible_specs() {
            grouped
                .entry(spec.category.as_str())
                .or_default()
                .push(spec.descriptor());
        }
        grouped
    }

    /// Visible tools grouped by priority.
    #[must_use]
    pub fn by_priority(&self) -> BTreeMap<&'static str, Vec<Value>> {
        let mut grouped: BTreeMap<&'static str, Vec<Value>> = BTreeMap::new();
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            grouped.insert(priority.as_str(), Vec::new());
        }
        for spec in self.visible_specs() {
            grouped
                .entry(spec.priority.as_str())
                .or_default()
                .push(spec.descriptor());
        }
        grouped
    }

    /// The fixed essential subset.
    #[must_use]
    pub fn essential_tools(&self) -> Vec<Value> {
        self.visible_specs()
            .filter(|spec| catalog::ESSENTIAL_TOOLS.contains(&spec.name))
            .map(ToolSpec::descriptor)
            .collect()
    }

    /// Whether a name is in the catalog (placeholders included).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|spec| spec.name == name)
    }

    /// Executes a tool by name after validating required arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Unknown`] for names outside the catalog,
    /// [`ToolError::InvalidArguments`] when a schema-required argument is
    /// absent, and whatever the handler raises.
    pub async fn execute(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let spec = self
            .specs
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| ToolError::Unknown {
                name: name.to_string(),
            })?;

        self.validate_required(spec, args)?;
        self.executor.execute(name, args).await
    }

    /// Checks that every schema-required key is present in the arguments.
    fn validate_required(&self, spec: &ToolSpec, args: &Value) -> Result<(), ToolError> {
        let required = spec
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let missing: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|key| args.get(key).is_none())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments {
                tool: spec.name.to_string(),
                message: format!("missing required arguments: {}", missing.join(", ")),
                suggestion: Some(format!(
                    "call tools/list to inspect the {} input schema",
                    spec.name
                )),
            })
        }
    }

    /// Maps a tool error to the structured result shape returned with
    /// HTTP 200 for client-input and precondition failures.
    #[must_use]
    pub fn error_result(error: &ToolError) -> Value {
        match error {
            ToolError::Unknown { name } => json!({
                "status": "error",
                "message": format!("unknown tool: {name}"),
            }),
            ToolError::InvalidArguments {
                tool,
                message,
                suggestion,
            } => {
                let mut result = json!({
                    "status": "error",
                    "message": format!("invalid arguments for {tool}: {message}"),
                });
                if let Some(suggestion) = suggestion {
                    result["suggestion"] = json!(suggestion);
                }
                result
            }
            ToolError::Execution { tool, message } => json!({
                "status": "error",
                "message": format!("tool {tool} failed: {message}"),
            }),
        }
    }

    fn visible_specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.specs
            .iter()
            .filter(|spec| !self.placeholders.contains(spec.name))
    }
}
