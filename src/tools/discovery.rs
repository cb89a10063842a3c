//! Discovery tools: the always-active entry points of the registry.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::registry::LazyToolRegistry;
use super::{ToolHandler, ToolMeta};

const DEFAULT_FIND_LIMIT: usize = 10;

#[derive(Debug, Deserialize, JsonSchema)]
struct FindInput {
    /// Free-text search over tool names, descriptions, and keywords.
    query: String,
    /// Maximum number of results.
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DescribeInput {
    /// Tool name to describe.
    name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LoadInput {
    /// Tool names to activate.
    names: Vec<String>,
}

struct FindTool(Arc<LazyToolRegistry>);

#[async_trait]
impl ToolHandler for FindTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: FindInput = serde_json::from_value(input)?;
        let limit = input.limit.unwrap_or(DEFAULT_FIND_LIMIT);
        let hits: Vec<serde_json::Value> = self
            .0
            .find(&input.query, limit)
            .into_iter()
            .map(|(meta, score)| {
                json!({
                    "name": meta.name,
                    "description": meta.description,
                    "category": meta.category,
                    "score": score,
                    "active": self.0.is_active(&meta.name),
                })
            })
            .collect();
        Ok(json!({ "results": hits }))
    }
}

struct DescribeTool(Arc<LazyToolRegistry>);

#[async_trait]
impl ToolHandler for DescribeTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: DescribeInput = serde_json::from_value(input)?;
        let (meta, active) = self.0.describe(&input.name)?;
        Ok(json!({
            "name": meta.name,
            "description": meta.description,
            "category": meta.category,
            "keywords": meta.keywords,
            "input_schema": meta.input_schema,
            "active": active,
        }))
    }
}

struct LoadTool(Arc<LazyToolRegistry>);

#[async_trait]
impl ToolHandler for LoadTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: LoadInput = serde_json::from_value(input)?;
        let report = self.0.load(&input.names);
        Ok(json!({
            "activated": report.activated,
            "already_active": report.already_active,
            "unknown": report.unknown,
            "newly_activated_count": report.newly_activated(),
            "already_active_count": report.already_active.len(),
        }))
    }
}

struct ActiveTool(Arc<LazyToolRegistry>);

#[async_trait]
impl ToolHandler for ActiveTool {
    async fn handle(&self, _input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let active: Vec<serde_json::Value> = self
            .0
            .active()
            .into_iter()
            .map(|meta| {
                json!({
                    "name": meta.name,
                    "description": meta.description,
                    "category": meta.category,
                })
            })
            .collect();
        Ok(json!({ "active": active }))
    }
}

/// Register the four discovery tools, eagerly activated.
pub fn register_discovery_tools(registry: &Arc<LazyToolRegistry>) {
    registry.register_eager(
        ToolMeta::new(
            "tool_find",
            "Search available tools by name, description, and keywords",
            "tool",
        )
        .with_keywords(["search", "discover", "find"])
        .with_schema_for::<FindInput>(),
        Arc::new(FindTool(Arc::clone(registry))),
    );

    registry.register_eager(
        ToolMeta::new(
            "tool_describe",
            "Describe one tool: metadata, input schema, and whether it is active",
            "tool",
        )
        .with_keywords(["describe", "schema", "metadata"])
        .with_schema_for::<DescribeInput>(),
        Arc::new(DescribeTool(Arc::clone(registry))),
    );

    registry.register_eager(
        ToolMeta::new(
            "tool_load",
            "Activate tools by name so they can be invoked",
            "tool",
        )
        .with_keywords(["activate", "load", "enable"])
        .with_schema_for::<LoadInput>(),
        Arc::new(LoadTool(Arc::clone(registry))),
    );

    registry.register_eager(
        ToolMeta::new("tool_active", "List currently activated tools", "tool")
            .with_keywords(["active", "loaded"]),
        Arc::new(ActiveTool(Arc::clone(registry))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnHandler;

    fn registry_with_discovery() -> Arc<LazyToolRegistry> {
        let registry = Arc::new(LazyToolRegistry::new());
        register_discovery_tools(&registry);
        registry.register_metadata(
            ToolMeta::new("registry_list", "List tasks matching a filter", "registry")
                .with_keywords(["tasks", "list"]),
            Box::new(|| Arc::new(FnHandler(|_| async { Ok(serde_json::json!("listed")) }))),
        );
        registry
    }

    #[tokio::test]
    async fn test_discovery_tools_are_eagerly_active() {
        let registry = registry_with_discovery();
        for name in ["tool_find", "tool_describe", "tool_load", "tool_active"] {
            assert!(registry.is_active(name), "{} should be active", name);
        }
        assert!(!registry.is_active("registry_list"));
    }

    #[tokio::test]
    async fn test_find_then_load_flow() {
        let registry = registry_with_discovery();

        let find = registry.handler("tool_find").unwrap();
        let out = find
            .handle(json!({"query": "list tasks", "limit": 5}))
            .await
            .unwrap();
        let results = out["results"].as_array().unwrap();
        assert_eq!(results[0]["name"], "registry_list");
        assert_eq!(results[0]["active"], false);

        let load = registry.handler("tool_load").unwrap();
        let out = load
            .handle(json!({"names": ["registry_list"]}))
            .await
            .unwrap();
        assert_eq!(out["newly_activated_count"], 1);

        // Second load is a no-op.
        let out = load
            .handle(json!({"names": ["registry_list"]}))
            .await
            .unwrap();
        assert_eq!(out["newly_activated_count"], 0);
        assert_eq!(out["already_active_count"], 1);
    }

    #[tokio::test]
    async fn test_describe_reports_schema() {
        let registry = registry_with_discovery();
        let describe = registry.handler("tool_describe").unwrap();

        let out = describe
            .handle(json!({"name": "registry_list"}))
            .await
            .unwrap();
        assert_eq!(out["active"], false);
        assert!(out["input_schema"].is_object());

        let err = describe
            .handle(json!({"name": "ghost"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_active_lists_discovery_plus_loaded() {
        let registry = registry_with_discovery();
        registry.load(&["registry_list".to_string()]);

        let active_tool = registry.handler("tool_active").unwrap();
        let out = active_tool.handle(json!({})).await.unwrap();
        let names: Vec<&str> = out["active"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"tool_find"));
        assert!(names.contains(&"registry_list"));
    }
}
