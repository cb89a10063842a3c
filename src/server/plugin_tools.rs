//! `plugin_*` tools: bundle lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::CoreState;
use crate::tools::{LazyToolRegistry, ToolHandler, ToolMeta};

#[derive(Debug, Deserialize, JsonSchema)]
struct InstallInput {
    /// Local directory containing a plugin bundle.
    #[serde(default)]
    source: Option<String>,
    /// Marketplace archive URL; requires `sha256`.
    #[serde(default)]
    url: Option<String>,
    /// Expected SHA-256 digest of the archive.
    #[serde(default)]
    sha256: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NameInput {
    name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchInput {
    query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateInput {
    name: String,
    /// Local directory holding the new bundle version.
    source: String,
}

struct PluginInstallTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginInstallTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: InstallInput = serde_json::from_value(input)?;

        let name = match (input.source, input.url) {
            (Some(source), None) => {
                self.0
                    .plugins
                    .install_local(std::path::Path::new(&source))
                    .await?
            }
            (None, Some(url)) => {
                let sha256 = input.sha256.ok_or_else(|| {
                    crate::Error::invalid("'sha256' is required for marketplace installs")
                })?;
                self.0.plugins.install_from_url(&url, &sha256).await?
            }
            _ => {
                return Err(crate::Error::invalid(
                    "provide exactly one of 'source' or 'url'",
                ));
            }
        };

        Ok(json!({ "installed": name }))
    }
}

struct PluginUninstallTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginUninstallTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: NameInput = serde_json::from_value(input)?;
        self.0.plugins.uninstall(&input.name).await?;
        Ok(json!({ "uninstalled": input.name }))
    }
}

struct PluginEnableTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginEnableTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: NameInput = serde_json::from_value(input)?;
        self.0.plugins.enable(&input.name).await?;
        let info = self.0.plugins.info(&input.name).await?;
        Ok(serde_json::to_value(info)?)
    }
}

struct PluginDisableTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginDisableTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: NameInput = serde_json::from_value(input)?;
        self.0.plugins.disable(&input.name).await?;
        Ok(json!({ "disabled": input.name }))
    }
}

struct PluginListTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginListTool {
    async fn handle(&self, _input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let plugins = self.0.plugins.list().await;
        Ok(json!({ "plugins": plugins }))
    }
}

struct PluginSearchTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginSearchTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: SearchInput = serde_json::from_value(input)?;
        let plugins = self.0.plugins.search(&input.query).await;
        Ok(json!({ "plugins": plugins }))
    }
}

struct PluginInfoTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginInfoTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: NameInput = serde_json::from_value(input)?;
        let info = self.0.plugins.info(&input.name).await?;
        Ok(serde_json::to_value(info)?)
    }
}

struct PluginUpdateTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for PluginUpdateTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: UpdateInput = serde_json::from_value(input)?;
        self.0
            .plugins
            .update(&input.name, std::path::Path::new(&input.source))
            .await?;
        let info = self.0.plugins.info(&input.name).await?;
        Ok(serde_json::to_value(info)?)
    }
}

pub(crate) fn register(tools: &Arc<LazyToolRegistry>, state: &Arc<CoreState>) {
    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "plugin_install",
            "Install a plugin bundle from a local directory or marketplace URL with checksum",
            "plugin",
        )
        .with_keywords(["install", "bundle", "marketplace", "checksum"])
        .with_schema_for::<InstallInput>(),
        Box::new(move || Arc::new(PluginInstallTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new("plugin_uninstall", "Remove an installed plugin", "plugin")
            .with_keywords(["uninstall", "remove"])
            .with_schema_for::<NameInput>(),
        Box::new(move || Arc::new(PluginUninstallTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "plugin_enable",
            "Enable a plugin, registering its skills, agents, and rules",
            "plugin",
        )
        .with_keywords(["enable", "activate"])
        .with_schema_for::<NameInput>(),
        Box::new(move || Arc::new(PluginEnableTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "plugin_disable",
            "Disable a plugin, removing its contributed components",
            "plugin",
        )
        .with_keywords(["disable", "deactivate"])
        .with_schema_for::<NameInput>(),
        Box::new(move || Arc::new(PluginDisableTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new("plugin_list", "List installed plugins and their state", "plugin")
            .with_keywords(["plugins", "installed"]),
        Box::new(move || Arc::new(PluginListTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "plugin_search",
            "Search installed plugins by name or description",
            "plugin",
        )
        .with_keywords(["search", "find", "plugins"])
        .with_schema_for::<SearchInput>(),
        Box::new(move || Arc::new(PluginSearchTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "plugin_info",
            "Manifest, state, and contributed components of one plugin",
            "plugin",
        )
        .with_keywords(["info", "details", "manifest"])
        .with_schema_for::<NameInput>(),
        Box::new(move || Arc::new(PluginInfoTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "plugin_update",
            "Reinstall a plugin from a new bundle version, preserving enabled state",
            "plugin",
        )
        .with_keywords(["update", "upgrade", "version"])
        .with_schema_for::<UpdateInput>(),
        Box::new(move || Arc::new(PluginUpdateTool(Arc::clone(&s)))),
    );
}
