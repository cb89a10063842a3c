//! Source ingestion: rebuild store rows from a `tasks.md` document.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rusqlite::params;

use super::deps::insert_edge_checked;
use super::parser::parse_tasks_md;
use super::tasks::{recompute_counters, task_from_row, upsert_task};
use super::{RegistryStore, now_ts};
use crate::store::types::{Task, TaskId, TaskNum, TaskStatus, validate_change_id};

/// Outcome of a `rebuild_from_source` run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    pub added: u32,
    pub updated: u32,
    pub removed: u32,
    pub edges_added: u32,
    /// Non-fatal issues, one message per observable property (for example a
    /// depends comment that would close a cycle, or a dependency on a task
    /// number the document never defines).
    pub warnings: Vec<String>,
}

impl RegistryStore {
    /// Ingest a `tasks.md` document for a change.
    ///
    /// Tasks whose number already exists keep their store-side metadata
    /// (dependencies, assignee, session, notes, priority, timestamps); the
    /// checkbox overlays status: checked forces `done`, unchecked keeps a
    /// richer store status (`in_progress`, `blocked`, `cancelled`) and
    /// otherwise resets to `pending`. Tasks absent from the document are
    /// removed together with their edges - the document is the source of
    /// truth for the task set.
    pub fn rebuild_from_source(
        &self,
        change_id: &str,
        tasks_md: &str,
    ) -> crate::Result<SyncReport> {
        validate_change_id(change_id)?;
        let parsed = parse_tasks_md(tasks_md)?;

        let mut report = SyncReport::default();
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO changes (id) VALUES (?1)",
            params![change_id],
        )?;

        // Snapshot existing rows so metadata survives the rebuild.
        let mut existing: HashMap<TaskNum, Task> = HashMap::new();
        {
            let mut stmt = tx.prepare(
                "SELECT change_id, num, content, status, priority, assignee, session,
                        started_at, completed_at, notes, source_line, synced_at
                 FROM tasks WHERE change_id = ?1",
            )?;
            let rows = stmt.query_map(params![change_id], task_from_row)?;
            for task in rows {
                let task = task?;
                existing.insert(task.id.num.clone(), task);
            }
        }

        let parsed_nums: HashSet<TaskNum> = parsed.iter().map(|t| t.num.clone()).collect();
        let now = Utc::now();

        for entry in &parsed {
            let mut task = match existing.remove(&entry.num) {
                Some(mut kept) => {
                    kept.status = overlay_status(entry.done, kept.status);
                    report.updated += 1;
                    kept
                }
                None => {
                    report.added += 1;
                    let mut fresh = Task::new(
                        TaskId::new(change_id, entry.num.clone()),
                        entry.content.clone(),
                    );
                    fresh.status = if entry.done {
                        TaskStatus::Done
                    } else {
                        TaskStatus::Pending
                    };
                    fresh
                }
            };

            task.content = entry.content.clone();
            task.source_line = Some(entry.source_line);
            if task.status == TaskStatus::Done && task.completed_at.is_none() {
                task.completed_at = Some(now);
            }
            task.synced_at = Some(now);
            upsert_task(&tx, &task)?;
        }

        // Anything left in `existing` vanished from the document.
        for (num, _) in existing {
            tx.execute(
                "DELETE FROM tasks WHERE change_id = ?1 AND num = ?2",
                params![change_id, num.as_str()],
            )?;
            tx.execute(
                "DELETE FROM deps_forward WHERE change_id = ?1 AND (from_num = ?2 OR to_num = ?2)",
                params![change_id, num.as_str()],
            )?;
            tx.execute(
                "DELETE FROM deps_reverse WHERE change_id = ?1 AND (from_num = ?2 OR to_num = ?2)",
                params![change_id, num.as_str()],
            )?;
            report.removed += 1;
        }

        // Dependency comments become edges. Existing edges for retained
        // tasks are preserved; the comment only ever adds.
        for entry in &parsed {
            for dep in &entry.depends {
                if !parsed_nums.contains(dep) {
                    report.warnings.push(format!(
                        "task {} depends on {}, which the document does not define",
                        entry.num, dep
                    ));
                    continue;
                }
                if dep == &entry.num {
                    report.warnings.push(format!(
                        "task {} lists itself as a dependency",
                        entry.num
                    ));
                    continue;
                }
                match insert_edge_checked(&tx, change_id, &entry.num, dep) {
                    Ok(()) => report.edges_added += 1,
                    Err(crate::Error::CycleDetected(_)) => {
                        report.warnings.push(format!(
                            "dependency {} -> {} skipped: it would close a cycle",
                            entry.num, dep
                        ));
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        recompute_counters(&tx, change_id)?;
        tx.execute(
            "UPDATE changes SET synced_at = ?2 WHERE id = ?1",
            params![change_id, now_ts()],
        )?;

        tx.commit()?;
        Ok(report)
    }
}

/// The checkbox is authoritative for done/pending; richer store statuses
/// overlay an unchecked box.
fn overlay_status(checked: bool, stored: TaskStatus) -> TaskStatus {
    if checked {
        TaskStatus::Done
    } else {
        match stored {
            TaskStatus::InProgress | TaskStatus::Blocked | TaskStatus::Cancelled => stored,
            TaskStatus::Pending | TaskStatus::Done => TaskStatus::Pending,
        }
    }
}
