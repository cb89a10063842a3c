//! `registry_*` tools: the task/dependency graph surface.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::CoreState;
use crate::store::{Task, TaskFilter, TaskId, TaskPatch};
use crate::tools::{LazyToolRegistry, ToolHandler, ToolMeta};

#[derive(Debug, Deserialize, JsonSchema)]
struct ListInput {
    #[serde(default)]
    change_id: Option<String>,
    /// `pending`, `in_progress`, `done`, `blocked`, or `cancelled`.
    #[serde(default)]
    status: Option<String>,
    /// `low`, `normal`, `high`, or `critical`.
    #[serde(default)]
    priority: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct UpdateInput {
    /// `change-id:1.2`, or a bare task number with `change_id` set.
    task_id: String,
    #[serde(default)]
    change_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NextInput {
    change_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DepsInput {
    /// `add`, `remove`, or `show`.
    op: String,
    #[serde(default)]
    change_id: Option<String>,
    /// Dependent task for add/remove.
    #[serde(default)]
    from: Option<String>,
    /// Dependency target for add/remove.
    #[serde(default)]
    to: Option<String>,
    /// Task to inspect for `show`.
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SyncInput {
    change_id: String,
}

fn task_json(task: &Task) -> serde_json::Value {
    json!({
        "task_id": task.id.to_string(),
        "num": task.id.num.as_str(),
        "change_id": task.id.change_id,
        "content": task.content,
        "status": task.status.as_str(),
        "priority": task.priority.as_str(),
        "depends_on": task.depends_on.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
        "assignee": task.assignee,
        "notes": task.notes,
        "source_line": task.source_line,
    })
}

struct RegistryListTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for RegistryListTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: ListInput = serde_json::from_value(input)?;
        let mut filter = TaskFilter::default();
        filter.change_id = input.change_id;
        if let Some(status) = input.status.as_deref() {
            filter.status = Some(status.parse()?);
        }
        if let Some(priority) = input.priority.as_deref() {
            filter.priority = Some(priority.parse()?);
        }

        let tasks = self.0.store.list_tasks(&filter)?;
        Ok(json!({
            "count": tasks.len(),
            "tasks": tasks.iter().map(task_json).collect::<Vec<_>>(),
        }))
    }
}

struct RegistryUpdateTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for RegistryUpdateTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: UpdateInput = serde_json::from_value(input)?;
        let id = TaskId::parse(&input.task_id, input.change_id.as_deref())?;

        let mut patch = TaskPatch::default();
        if let Some(status) = input.status.as_deref() {
            patch.status = Some(status.parse()?);
        }
        if let Some(priority) = input.priority.as_deref() {
            patch.priority = Some(priority.parse()?);
        }
        patch.assignee = input.assignee;
        patch.notes = input.notes;

        let task = self.0.store.apply_update(&id, &patch)?;
        // Every status mutation refreshes the derived state artifacts.
        self.0.project_state(&id.change_id).await?;

        let change = self.0.store.get_change(&id.change_id)?;
        Ok(json!({
            "task": task_json(&task),
            "change": {
                "id": change.id,
                "total": change.total,
                "completed": change.completed,
                "in_progress": change.in_progress,
                "blocked": change.blocked,
            },
        }))
    }
}

struct RegistryNextTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for RegistryNextTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: NextInput = serde_json::from_value(input)?;
        let tasks = self
            .0
            .store
            .next_tasks(&input.change_id, input.limit.unwrap_or(5))?;
        Ok(json!({
            "ready": tasks.iter().map(task_json).collect::<Vec<_>>(),
        }))
    }
}

struct RegistryDepsTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for RegistryDepsTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: DepsInput = serde_json::from_value(input)?;
        let change = input.change_id.as_deref();

        match input.op.as_str() {
            "add" | "remove" => {
                let from = input
                    .from
                    .as_deref()
                    .ok_or_else(|| crate::Error::invalid("'from' is required"))?;
                let to = input
                    .to
                    .as_deref()
                    .ok_or_else(|| crate::Error::invalid("'to' is required"))?;
                let from = TaskId::parse(from, change)?;
                let to = TaskId::parse(to, change)?;

                if input.op == "add" {
                    self.0.store.add_dependency(&from, &to)?;
                } else {
                    self.0.store.remove_dependency(&from, &to)?;
                }
                Ok(json!({
                    "op": input.op,
                    "from": from.to_string(),
                    "to": to.to_string(),
                }))
            }
            "show" => {
                let task_id = input
                    .task_id
                    .as_deref()
                    .ok_or_else(|| crate::Error::invalid("'task_id' is required"))?;
                let id = TaskId::parse(task_id, change)?;
                let blockers = self.0.store.blockers_of(&id)?;
                let blocked = self.0.store.blocked_by(&id)?;
                Ok(json!({
                    "task_id": id.to_string(),
                    "depends_on": blockers.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                    "blocks": blocked.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                }))
            }
            other => Err(crate::Error::invalid(format!(
                "unknown deps op '{}' (expected add, remove, or show)",
                other
            ))),
        }
    }
}

struct RegistrySyncTool(Arc<CoreState>);

#[async_trait]
impl ToolHandler for RegistrySyncTool {
    async fn handle(&self, input: serde_json::Value) -> crate::Result<serde_json::Value> {
        let input: SyncInput = serde_json::from_value(input)?;
        let tasks_md = self.0.workspace.read_tasks_md(&input.change_id).await?;
        let report = self
            .0
            .store
            .rebuild_from_source(&input.change_id, &tasks_md)?;
        self.0.project_state(&input.change_id).await?;

        Ok(json!({
            "change_id": input.change_id,
            "added": report.added,
            "updated": report.updated,
            "removed": report.removed,
            "edges_added": report.edges_added,
            "warnings": report.warnings,
        }))
    }
}

pub(crate) fn register(tools: &Arc<LazyToolRegistry>, state: &Arc<CoreState>) {
    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "registry_list",
            "List tasks in the registry matching a change, status, or priority filter",
            "registry",
        )
        .with_keywords(["tasks", "list", "filter", "registry"])
        .with_schema_for::<ListInput>(),
        Box::new(move || Arc::new(RegistryListTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "registry_update",
            "Update a task's status, priority, assignee, or notes; recomputes change counters",
            "registry",
        )
        .with_keywords(["task", "update", "status", "assignee"])
        .with_schema_for::<UpdateInput>(),
        Box::new(move || Arc::new(RegistryUpdateTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "registry_next",
            "Ready-to-run tasks: pending with every dependency done, by priority",
            "registry",
        )
        .with_keywords(["next", "ready", "todo", "schedule"])
        .with_schema_for::<NextInput>(),
        Box::new(move || Arc::new(RegistryNextTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "registry_deps",
            "Add, remove, or show task dependency edges; insertions reject cycles",
            "registry",
        )
        .with_keywords(["dependency", "edge", "blockers", "graph"])
        .with_schema_for::<DepsInput>(),
        Box::new(move || Arc::new(RegistryDepsTool(Arc::clone(&s)))),
    );

    let s = Arc::clone(state);
    tools.register_metadata(
        ToolMeta::new(
            "registry_sync",
            "Rebuild store rows for a change from its tasks.md source document",
            "registry",
        )
        .with_keywords(["sync", "ingest", "tasks.md", "rebuild"])
        .with_schema_for::<SyncInput>(),
        Box::new(move || Arc::new(RegistrySyncTool(Arc::clone(&s)))),
    );
}
