//! `spec_*` tools: workspace initialization and artifact access.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::CoreState;
use crate::tools::{LazyToolRegistry, ToolHandler, ToolMeta};
use crate::workspace::{ArtifactKind, InitOptions};

#[derive(Debug, Deserialize, JsonSchema)]
struct InitInput {
    /// Project root this server is bound to; validated when provided.
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    conventions: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListInput {
    /// Artifact type: `spec`, `change`, or `task`.
    r#type: String,
    /// For changes: restrict to `active` or `archived`.
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ShowInput {
    /// Artifact type: `spec`, `change`, or `task`.
    r#type: String,
    id: String,
}

struct SpecInitTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for SpecInitTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: InitInput = serde_json::from_value(input)?;

        if let Some(path) = &input.path {
            let requested = std::path::Path::new(path);
            if requested != self.0.config.project_root {
                return Err(crate::Error::invalid(format!(
                    "this server is bound to project '{}'",
                    self.0.config.project_root.display()
                )));
            }
        }

        let created = self
            .0
            .workspace
            .init(InitOptions {
                name: input.name,
                module: input.module,
                description: input.description,
                conventions: input.conventions.unwrap_or_default(),
            })
            .await?;

        Ok(json!({
            "initialized": created,
            "message": if created {
                "spec workspace initialized"
            } else {
                "already initialized"
            },
            "root": self.0.workspace.root().display().to_string(),
        }))
    }
}

struct SpecListTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for SpecListTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: ListInput = serde_json::from_value(input)?;
        let kind: ArtifactKind = input.r#type.parse()?;
        let ids = self.0.workspace.list(kind).await?;

        match kind {
            ArtifactKind::Change => {
                let status_filter = input
                    .status
                    .as_deref()
                    .map(str::parse::<crate::store::ChangeStatus>)
                    .transpose()?;

                let mut items = Vec::new();
                for id in ids {
                    // Changes without store rows have never been synced.
                    let (status, progress) = match self.0.store.get_change(&id) {
                        Ok(change) => (change.status, Some(change.progress_pct())),
                        Err(_) => (crate::store::ChangeStatus::Active, None),
                    };
                    if status_filter.is_none_or(|f| f == status) {
                        items.push(json!({
                            "id": id,
                            "status": status.as_str(),
                            "progress_pct": progress,
                        }));
                    }
                }
                Ok(json!({ "changes": items }))
            }
            ArtifactKind::Spec => Ok(json!({ "specs": ids })),
            ArtifactKind::Task => Ok(json!({ "tasks": ids })),
        }
    }
}

struct SpecShowTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for SpecShowTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: ShowInput = serde_json::from_value(input)?;
        let kind: ArtifactKind = input.r#type.parse()?;
        let content = self.0.workspace.show(kind, &input.id).await?;
        Ok(json!({ "id": input.id, "content": content }))
    }
}

pub(crate) fn register(tools: &Arc<LazyToolRegistry>, state: &Arc<CoreState>) {
    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "spec_init",
            "Initialize the project-local spec workspace and project.yaml",
            "spec",
        )
        .with_keywords(["init", "setup", "project", "workspace"])
        .with_schema_for::<InitInput>(),
        Box::new(move || Arc::new(SpecInitTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "spec_list",
            "Enumerate specs, changes, or task documents in the workspace",
            "spec",
        )
        .with_keywords(["specs", "changes", "enumerate"])
        .with_schema_for::<ListInput>(),
        Box::new(move || Arc::new(SpecListTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "spec_show",
            "Return the markdown content of a spec, change proposal, or task document",
            "spec",
        )
        .with_keywords(["show", "read", "markdown", "proposal"])
        .with_schema_for::<ShowInput>(),
        Box::new(move || Arc::new(SpecShowTool(Arc::clone(&s)))),
    );
}
