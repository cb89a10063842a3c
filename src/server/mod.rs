//! Core server: wires every subsystem together and answers tool calls.
//!
//! The host decodes its transport framing and hands this server a tool
//! name plus JSON input; the server routes through the progressive-
//! disclosure registry and translates typed errors into structured
//! responses. Only the discovery tools are active at startup - everything
//! else is metadata until the host loads it.

mod agent_tools;
mod engine_tools;
mod plugin_tools;
mod registry_tools;
mod spec_tools;
mod state_tools;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::agents::AgentRegistry;
use crate::config::CoreConfig;
use crate::engine::ExecutionEngine;
use crate::observability::DispatchMetrics;
use crate::plugins::PluginManager;
use crate::projection::StateProjector;
use crate::skills::SkillRegistry;
use crate::store::RegistryStore;
use crate::tools::{LazyToolRegistry, register_discovery_tools};
use crate::workspace::SpecWorkspace;

/// Structured tool response: `ok` plus either `data` or `code`/`message`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResponse {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            code: None,
            message: None,
            data: Some(data),
        }
    }

    pub fn failure(err: &crate::Error) -> Self {
        Self {
            ok: false,
            code: Some(err.code().to_string()),
            message: Some(err.to_string()),
            data: None,
        }
    }
}

/// Shared state handed to every tool handler.
pub(crate) struct CoreState {
    pub config: CoreConfig,
    pub store: Arc<RegistryStore>,
    pub workspace: Arc<SpecWorkspace>,
    pub engine: Arc<ExecutionEngine>,
    pub plugins: Arc<PluginManager>,
}

impl CoreState {
    /// Regenerate the state artifacts for one change plus the root view.
    pub async fn project_state(&self, change_id: &str) -> crate::Result<()> {
        let projector = StateProjector::new(&self.store);
        let change_state = projector.render_change_state(change_id)?;
        self.workspace
            .write_change_state(change_id, &change_state)
            .await?;
        let root_state = projector.render_root_state()?;
        self.workspace.write_root_state(&root_state).await?;
        Ok(())
    }
}

/// The orchestration core.
pub struct CoreServer {
    state: Arc<CoreState>,
    tools: Arc<LazyToolRegistry>,
    metrics: DispatchMetrics,
}

impl CoreServer {
    pub async fn new(config: CoreConfig) -> crate::Result<Self> {
        let store = Arc::new(RegistryStore::open(&config.registry_db_path())?);
        let workspace = Arc::new(SpecWorkspace::new(config.spec_root()));

        let mut skill_registry = SkillRegistry::new();
        for dir in &config.skill_dirs {
            if dir.is_dir() {
                skill_registry.load_directory(dir).await?;
            }
        }
        let skills = Arc::new(RwLock::new(skill_registry));

        let mut agent_registry = AgentRegistry::with_builtins();
        for dir in &config.agent_dirs {
            if dir.is_dir() {
                agent_registry.load_directory(dir).await?;
            }
        }
        let agents = Arc::new(RwLock::new(agent_registry));

        let engine = Arc::new(ExecutionEngine::new(
            &config,
            Arc::clone(&agents),
            Arc::clone(&skills),
        ));

        let plugins = Arc::new(PluginManager::new(
            workspace.plugins_dir(),
            Arc::clone(&skills),
            Arc::clone(&agents),
        ));
        plugins.scan(&config.plugin_dirs).await?;

        let state = Arc::new(CoreState {
            config,
            store,
            workspace,
            engine,
            plugins,
        });

        let tools = Arc::new(LazyToolRegistry::new());
        register_discovery_tools(&tools);
        register_core_tools(&tools, &state);

        Ok(Self {
            state,
            tools,
            metrics: DispatchMetrics::new(),
        })
    }

    /// Route one decoded tool call.
    pub async fn dispatch(&self, name: &str, input: serde_json::Value) -> ToolResponse {
        self.metrics.record_call();
        tracing::debug!(tool = name, "dispatching tool call");

        let Some(handler) = self.tools.handler(name) else {
            let err = if self.tools.contains(name) {
                crate::Error::invalid(format!(
                    "tool '{}' is not activated; activate it with tool_load",
                    name
                ))
            } else {
                crate::Error::not_found(format!("tool '{}'", name))
            };
            self.metrics.record_error();
            return ToolResponse::failure(&err);
        };

        match handler.handle(input).await {
            Ok(data) => ToolResponse::success(data),
            Err(err) => {
                self.metrics.record_error();
                tracing::debug!(tool = name, code = err.code(), "tool call failed: {}", err);
                ToolResponse::failure(&err)
            }
        }
    }

    pub fn tools(&self) -> &Arc<LazyToolRegistry> {
        &self.tools
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Activate every registered tool. Bootstrap policy for hosts that do
    /// not want progressive disclosure.
    pub fn load_all_tools(&self) -> usize {
        let names: Vec<String> = self
            .tools
            .all_metadata()
            .into_iter()
            .map(|m| m.name)
            .collect();
        self.tools.load(&names).newly_activated()
    }

    /// Drain for shutdown: wait up to the grace period for background
    /// agents to finish, then cancel whatever is still live. Returns the
    /// number of agents that had to be cancelled.
    pub async fn shutdown(&self, grace: std::time::Duration) -> usize {
        let background = self.state.engine.background();
        let deadline = tokio::time::Instant::now() + grace;

        while background.live_count().await > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        let mut cancelled = 0;
        for summary in background.list(None).await {
            if !summary.state.is_terminal() && background.cancel(&summary.agent_id).await.is_ok() {
                cancelled += 1;
            }
        }
        tracing::info!(cancelled, "server shutdown drained");
        cancelled
    }
}

/// Register metadata + activation thunks for the whole core surface.
fn register_core_tools(tools: &Arc<LazyToolRegistry>, state: &Arc<CoreState>) {
    spec_tools::register(tools, state);
    registry_tools::register(tools, state);
    state_tools::register(tools, state);
    agent_tools::register(tools, state);
    engine_tools::register(tools, state);
    plugin_tools::register(tools, state);
}
