//! `agent_*` tools: the background agent surface.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::CoreState;
use crate::background::{OutputQuery, SpawnRequest};
use crate::tools::{LazyToolRegistry, ToolHandler, ToolMeta};

#[derive(Debug, Deserialize, JsonSchema)]
struct SpawnInput {
    /// The task prompt for the agent.
    task: String,
    /// Agent descriptor name; defaults to `dev`.
    #[serde(default)]
    agent: Option<String>,
    /// Model tier: `fast`, `main`, or `heavy`.
    #[serde(default)]
    model_tier: Option<String>,
    #[serde(default)]
    session: Option<String>,
    /// Override the wall-clock cap, seconds.
    #[serde(default)]
    max_wall_secs: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AgentIdInput {
    agent_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct OutputInput {
    agent_id: String,
    /// Keep only lines matching this regex.
    #[serde(default)]
    filter: Option<String>,
    /// Keep only the last N lines.
    #[serde(default)]
    tail: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AgentListInput {
    #[serde(default)]
    session: Option<String>,
}

struct AgentSpawnTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for AgentSpawnTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: SpawnInput = serde_json::from_value(input)?;

        let mut request = SpawnRequest::new(input.task);
        if let Some(agent) = input.agent {
            request = request.with_agent(agent);
        }
        if let Some(tier) = input.model_tier.as_deref() {
            request = request.with_tier(tier.parse()?);
        }
        if let Some(session) = input.session {
            request = request.with_session(session);
        }
        request.max_wall_secs = input.max_wall_secs;

        let agent_id = self.0.engine.background().spawn(request).await?;
        Ok(json!({ "agent_id": agent_id }))
    }
}

struct AgentStatusTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for AgentStatusTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: AgentIdInput = serde_json::from_value(input)?;
        let summary = self.0.engine.background().status(&input.agent_id).await?;
        Ok(serde_json::to_value(summary)?)
    }
}

struct AgentOutputTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for AgentOutputTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: OutputInput = serde_json::from_value(input)?;
        let output = self
            .0
            .engine
            .background()
            .output(
                &input.agent_id,
                &OutputQuery {
                    filter: input.filter,
                    tail: input.tail,
                },
            )
            .await?;
        Ok(json!({ "agent_id": input.agent_id, "output": output }))
    }
}

struct AgentKillTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for AgentKillTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: AgentIdInput = serde_json::from_value(input)?;
        self.0.engine.background().cancel(&input.agent_id).await?;
        Ok(json!({ "agent_id": input.agent_id, "cancelled": true }))
    }
}

struct AgentListTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for AgentListTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: AgentListInput = serde_json::from_value(input)?;
        let agents = self
            .0
            .engine
            .background()
            .list(input.session.as_deref())
            .await;
        Ok(json!({ "agents": agents }))
    }
}

pub(crate) fn register(tools: &Arc<LazyToolRegistry>, state: &Arc<CoreState>) {
    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "agent_spawn",
            "Spawn a background worker agent for a long-running prompt",
            "agent",
        )
        .with_keywords(["spawn", "background", "worker", "async"])
        .with_schema_for::<SpawnInput>(),
        Box::new(move || Arc::new(AgentSpawnTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "agent_status",
            "Lifecycle state, timings, bytes produced, and cost of a background agent",
            "agent",
        )
        .with_keywords(["status", "lifecycle", "progress"])
        .with_schema_for::<AgentIdInput>(),
        Box::new(move || Arc::new(AgentStatusTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "agent_output",
            "Read a background agent's buffered output, optionally filtered or tailed",
            "agent",
        )
        .with_keywords(["output", "logs", "tail", "buffer"])
        .with_schema_for::<OutputInput>(),
        Box::new(move || Arc::new(AgentOutputTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "agent_kill",
            "Cancel a running background agent cooperatively",
            "agent",
        )
        .with_keywords(["kill", "cancel", "stop"])
        .with_schema_for::<AgentIdInput>(),
        Box::new(move || Arc::new(AgentKillTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "agent_list",
            "Summaries of background agents, optionally per session",
            "agent",
        )
        .with_keywords(["agents", "running", "sessions"])
        .with_schema_for::<AgentListInput>(),
        Box::new(move || Arc::new(AgentListTool(Arc::clone(&s)))),
    );
}
