//! Tool surface: metadata, handlers, and the progressive-disclosure
//! registry.
//!
//! Tool *metadata* is always registered and searchable; tool *handlers* are
//! produced by activation thunks that run at most once, on demand. The four
//! discovery tools (`tool_find`, `tool_describe`, `tool_load`,
//! `tool_active`) are the always-active entry points the host uses to pull
//! the rest of the surface in.

mod discovery;
mod registry;
mod search;

pub use discovery::register_discovery_tools;
pub use registry::{LazyToolRegistry, LoadReport};
pub use search::{SearchHit, TfIdfIndex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Always-present description of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMeta {
    /// Stable snake_case name with a domain prefix (`registry_list`).
    pub name: String,
    pub description: String,
    /// Coarse grouping: `spec`, `registry`, `state`, `tool`, `agent`,
    /// `engine`, `plugin`.
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// JSON schema of the tool input.
    pub input_schema: serde_json::Value,
}

impl ToolMeta {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            keywords: Vec::new(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Schema derived from a `schemars`-annotated input type.
    pub fn with_schema_for<T: schemars::JsonSchema>(mut self) -> Self {
        self.input_schema = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
        self
    }

    /// The text surface the TF-IDF index sees.
    pub fn searchable_text(&self) -> String {
        let mut text = format!("{} {}", self.name, self.description);
        for kw in &self.keywords {
            text.push(' ');
            text.push_str(kw);
        }
        text
    }
}

/// An activated tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value>;
}

/// Blanket adapter so closures over async blocks can serve as handlers in
/// tests and simple registrations.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = crate::Result<serde_json::Value>> + Send,
{
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        (self.0)(input).await
    }
}
