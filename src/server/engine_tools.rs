//! `engine_*` tools: execution, observability, and control.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::CoreState;
use crate::engine::{ExecutionRequest, Strategy};
use crate::tools::{LazyToolRegistry, ToolHandler, ToolMeta};

#[derive(Debug, Deserialize, JsonSchema)]
struct ExecuteInput {
    /// The task to execute.
    task: String,
    /// Agent descriptor name; defaults to `dev`.
    #[serde(default)]
    agent: Option<String>,
    /// Strategy object: `{"kind":"single"}`, `{"kind":"multi","steps":[...]}`,
    /// or `{"kind":"parallel","tasks":[...]}`.
    #[serde(default)]
    strategy: Option<serde_json::Value>,
    /// Preferred runtime name from the configured order.
    #[serde(default)]
    runtime: Option<String>,
    /// Session budget in USD applied before dispatch.
    #[serde(default)]
    budget: Option<f64>,
    #[serde(default)]
    session: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExecutionIdInput {
    execution_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BudgetInput {
    #[serde(default)]
    session: Option<String>,
}

struct EngineExecuteTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for EngineExecuteTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: ExecuteInput = serde_json::from_value(input)?;

        let mut request = ExecutionRequest::new(input.task);
        if let Some(agent) = input.agent {
            request = request.with_agent(agent);
        }
        if let Some(strategy) = input.strategy {
            let strategy: Strategy = serde_json::from_value(strategy)?;
            request = request.with_strategy(strategy);
        }
        if let Some(runtime) = input.runtime {
            request = request.with_runtime(runtime);
        }
        if let Some(budget) = input.budget {
            request = request.with_budget(budget);
        }
        if let Some(session) = input.session {
            request = request.with_session(session);
        }

        let outcome = self.0.engine.execute(request).await;
        Ok(serde_json::to_value(outcome)?)
    }
}

struct EngineStatusTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for EngineStatusTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        // With no id, report the full execution history.
        if input
            .get("execution_id")
            .and_then(|v| v.as_str())
            .is_none()
        {
            let records = self.0.engine.list_records();
            return Ok(json!({ "executions": records }));
        }
        let input: ExecutionIdInput = serde_json::from_value(input)?;
        let record = self.0.engine.status(&input.execution_id)?;
        Ok(serde_json::to_value(record)?)
    }
}

struct EngineBudgetTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for EngineBudgetTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: BudgetInput = serde_json::from_value(input)?;
        let mut summary = self.0.engine.budget_summary();
        if let Some(session) = input.session {
            summary.retain(|s| s.session == session);
        }
        Ok(json!({ "budgets": summary }))
    }
}

struct EngineInterruptTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for EngineInterruptTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: ExecutionIdInput = serde_json::from_value(input)?;
        self.0.engine.interrupt(&input.execution_id)?;
        Ok(json!({
            "execution_id": input.execution_id,
            "interrupted": true,
        }))
    }
}

pub(crate) fn register(tools: &Arc<LazyToolRegistry>, state: &Arc<CoreState>) {
    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "engine_execute",
            "Execute a task through an agent strategy: single, multi-step handoff, or parallel DAG",
            "engine",
        )
        .with_keywords(["execute", "run", "strategy", "dispatch"])
        .with_schema_for::<ExecuteInput>(),
        Box::new(move || Arc::new(EngineExecuteTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "engine_status",
            "Status of one execution record, or the full execution history",
            "engine",
        )
        .with_keywords(["status", "execution", "history"])
        .with_schema_for::<ExecutionIdInput>(),
        Box::new(move || Arc::new(EngineStatusTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "engine_budget",
            "Per-session cost usage against configured budget limits",
            "engine",
        )
        .with_keywords(["budget", "cost", "usage", "spend"])
        .with_schema_for::<BudgetInput>(),
        Box::new(move || Arc::new(EngineBudgetTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "engine_interrupt",
            "Deliver cooperative cancellation to a live execution",
            "engine",
        )
        .with_keywords(["interrupt", "cancel", "abort"])
        .with_schema_for::<ExecutionIdInput>(),
        Box::new(move || Arc::new(EngineInterruptTool(Arc::clone(&s)))),
    );
}
