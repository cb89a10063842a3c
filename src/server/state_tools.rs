//! `state_*` tools: regenerate and read the derived state artifacts.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::CoreState;
use crate::projection::StateProjector;
use crate::tools::{LazyToolRegistry, ToolHandler, ToolMeta};

#[derive(Debug, Deserialize, JsonSchema)]
struct StateInput {
    /// Restrict to one change; omitted means every known change plus the
    /// aggregate root view.
    #[serde(default)]
    change_id: Option<String>,
}

struct StateSyncTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for StateSyncTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: StateInput = serde_json::from_value(input)?;

        let changes = match input.change_id {
            Some(id) => vec![id],
            None => self
                .0
                .store
                .list_changes(None)?
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };

        for change_id in &changes {
            self.0.project_state(change_id).await?;
        }
        if changes.is_empty() {
            let projector = StateProjector::new(&self.0.store);
            let root = projector.render_root_state()?;
            self.0.workspace.write_root_state(&root).await?;
        }

        Ok(json!({ "synced": changes }))
    }
}

struct StateShowTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for StateShowTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: StateInput = serde_json::from_value(input)?;
        let projector = StateProjector::new(&self.0.store);

        let content = match &input.change_id {
            Some(change_id) => projector.render_change_state(change_id)?,
            None => projector.render_root_state()?,
        };
        Ok(json!({
            "change_id": input.change_id,
            "content": content,
        }))
    }
}

pub(crate) fn register(tools: &Arc<LazyToolRegistry>, state: &Arc<CoreState>) {
    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "state_sync",
            "Regenerate derived state documents from the registry store",
            "state",
        )
        .with_keywords(["state", "regenerate", "projection"])
        .with_schema_for::<StateInput>(),
        Box::new(move || Arc::new(StateSyncTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "state_show",
            "Render the state projection for a change or the whole project",
            "state",
        )
        .with_keywords(["state", "progress", "show", "report"])
        .with_schema_for::<StateInput>(),
        Box::new(move || Arc::new(StateShowTool(Arc::clone(&s)))),
    );
}
