//! State projection - derived, human-readable artifacts.
//!
//! The projector is a pure function of store contents. It renders the
//! per-change `state.md`, the aggregate root `state.md`, and the canonical
//! `tasks.md` serialization used by the round-trip path. It is the only
//! code that produces these documents; nothing else writes them.

use chrono::{DateTime, Duration, Utc};

use crate::store::{Change, RegistryStore, Task, TaskFilter, TaskStatus};

/// How far back the "recent activity" window reaches.
const ACTIVITY_WINDOW_HOURS: i64 = 24;

/// Renders state artifacts from the registry store.
pub struct StateProjector<'a> {
    store: &'a RegistryStore,
}

impl<'a> StateProjector<'a> {
    pub fn new(store: &'a RegistryStore) -> Self {
        Self { store }
    }

    /// Render the state document for one change.
    pub fn render_change_state(&self, change_id: &str) -> crate::Result<String> {
        let change = self.store.get_change(change_id)?;
        let tasks = self.store.list_tasks(&TaskFilter::for_change(change_id))?;
        let next = self.store.next_tasks(change_id, 5)?;

        let mut out = String::new();
        out.push_str(&format!("# State: {}\n\n", change.id));
        out.push_str(&format!(
            "Status: {} | Progress: {}% ({}/{} done, {} in progress, {} blocked)\n\n",
            change.status.as_str(),
            change.progress_pct(),
            change.completed,
            change.total,
            change.in_progress,
            change.blocked,
        ));

        out.push_str("## Next up\n\n");
        if next.is_empty() {
            out.push_str("Nothing is ready to start.\n");
        } else {
            for task in &next {
                out.push_str(&format!(
                    "- {} {} [{}]\n",
                    task.id.num,
                    task.content,
                    task.priority.as_str()
                ));
            }
        }
        out.push('\n');

        let frontier = blocker_frontier(&tasks);
        out.push_str("## Blocked on\n\n");
        if frontier.is_empty() {
            out.push_str("No open blockers.\n");
        } else {
            for (task, open) in &frontier {
                let open_list: Vec<String> = open.iter().map(|n| n.to_string()).collect();
                out.push_str(&format!(
                    "- {} {} (waiting on {})\n",
                    task.id.num,
                    task.content,
                    open_list.join(", ")
                ));
            }
        }
        out.push('\n');

        out.push_str("## Recent activity\n\n");
        let recent = recent_activity(&tasks, Utc::now());
        if recent.is_empty() {
            out.push_str("No activity in the last 24h.\n");
        } else {
            for (task, stamp) in &recent {
                out.push_str(&format!(
                    "- {} {} -> {} ({})\n",
                    task.id.num,
                    task.content,
                    task.status.as_str(),
                    stamp.format("%Y-%m-%d %H:%M UTC")
                ));
            }
        }

        Ok(out)
    }

    /// Render the aggregate root state document across all changes.
    pub fn render_root_state(&self) -> crate::Result<String> {
        let changes = self.store.list_changes(None)?;

        let mut out = String::from("# Project state\n\n");
        if changes.is_empty() {
            out.push_str("No changes registered.\n");
            return Ok(out);
        }

        out.push_str("| Change | Status | Progress | Blocked |\n");
        out.push_str("|---|---|---|---|\n");
        for change in &changes {
            out.push_str(&format!(
                "| {} | {} | {}% ({}/{}) | {} |\n",
                change.id,
                change.status.as_str(),
                change.progress_pct(),
                change.completed,
                change.total,
                change.blocked,
            ));
        }

        let (active, archived): (Vec<&Change>, Vec<&Change>) = changes
            .iter()
            .partition(|c| c.status == crate::store::ChangeStatus::Active);
        out.push_str(&format!(
            "\n{} active, {} archived.\n",
            active.len(),
            archived.len()
        ));

        Ok(out)
    }

    /// Serialize a change's tasks back into canonical `tasks.md` lines.
    ///
    /// Preserves the `(task_num, content, checkbox, depends)` tuples the
    /// ingestion path reads, so sync followed by serialization is stable
    /// modulo formatting.
    pub fn serialize_tasks_md(&self, change_id: &str) -> crate::Result<String> {
        let mut tasks = self.store.list_tasks(&TaskFilter::for_change(change_id))?;
        tasks.sort_by(|a, b| {
            a.source_line
                .unwrap_or(u32::MAX)
                .cmp(&b.source_line.unwrap_or(u32::MAX))
                .then(a.id.num.cmp(&b.id.num))
        });

        let mut out = String::new();
        for task in &tasks {
            out.push_str(&serialize_task_line(task));
            out.push('\n');
        }
        Ok(out)
    }
}

fn serialize_task_line(task: &Task) -> String {
    let checkbox = if task.status == TaskStatus::Done {
        "[x]"
    } else {
        "[ ]"
    };
    let mut line = format!("- {} {} {}", checkbox, task.id.num, task.content);
    if !task.depends_on.is_empty() {
        let deps: Vec<&str> = task.depends_on.iter().map(|d| d.as_str()).collect();
        line.push_str(&format!(" <!-- depends: {} -->", deps.join(", ")));
    }
    line
}

/// Tasks marked blocked or waiting on unfinished dependencies, with the set
/// of still-open blockers.
fn blocker_frontier(tasks: &[Task]) -> Vec<(&Task, Vec<&crate::store::TaskNum>)> {
    let done: std::collections::HashSet<&crate::store::TaskNum> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .map(|t| &t.id.num)
        .collect();

    tasks
        .iter()
        .filter(|t| !t.status.is_terminal())
        .filter_map(|t| {
            let open: Vec<_> = t
                .depends_on
                .iter()
                .filter(|dep| !done.contains(dep))
                .collect();
            if open.is_empty() && t.status != TaskStatus::Blocked {
                None
            } else {
                Some((t, open))
            }
        })
        .collect()
}

fn recent_activity(tasks: &[Task], now: DateTime<Utc>) -> Vec<(&Task, DateTime<Utc>)> {
    let cutoff = now - Duration::hours(ACTIVITY_WINDOW_HOURS);
    let mut recent: Vec<(&Task, DateTime<Utc>)> = tasks
        .iter()
        .filter_map(|t| {
            let stamp = t.completed_at.or(t.started_at).or(t.synced_at)?;
            (stamp >= cutoff && t.status != TaskStatus::Pending).then_some((t, stamp))
        })
        .collect();
    recent.sort_by(|a, b| b.1.cmp(&a.1));
    recent
}
