//! Task operations: point lookup, upsert, filtered listing, readiness.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use super::{RegistryStore, format_ts, now_ts, parse_ts};
use crate::store::types::{Priority, Task, TaskFilter, TaskId, TaskNum, TaskStatus};

/// Partial update applied by `registry_update`.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub session: Option<String>,
    pub notes: Option<String>,
}

impl RegistryStore {
    /// O(1) task lookup by id.
    pub fn get_task(&self, id: &TaskId) -> crate::Result<Task> {
        let conn = self.lock();
        let mut task = conn
            .query_row(
                "SELECT change_id, num, content, status, priority, assignee, session,
                        started_at, completed_at, notes, source_line, synced_at
                 FROM tasks WHERE change_id = ?1 AND num = ?2",
                params![id.change_id, id.num.as_str()],
                task_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    crate::Error::not_found(format!("task '{}'", id))
                }
                other => other.into(),
            })?;
        task.depends_on = load_forward(&conn, &id.change_id, &id.num)?;
        Ok(task)
    }

    /// Upsert a task and transactionally recompute the owning change's
    /// counters. Dependency edges are managed separately (see
    /// [`RegistryStore::add_dependency`] and source sync); the `depends_on`
    /// field of the given task is not written back here.
    pub fn update_task(&self, task: &Task) -> crate::Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO changes (id) VALUES (?1)",
            params![task.id.change_id],
        )?;
        upsert_task(&tx, task)?;
        recompute_counters(&tx, &task.id.change_id)?;

        tx.commit()?;
        Ok(())
    }

    /// Apply a partial update to an existing task.
    ///
    /// Status transitions stamp `started_at` on the first move into
    /// `in_progress` and `completed_at` on the move into `done`.
    pub fn apply_update(&self, id: &TaskId, patch: &TaskPatch) -> crate::Result<Task> {
        let mut task = self.get_task(id)?;

        if let Some(status) = patch.status {
            if status == TaskStatus::InProgress && task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
            if status == TaskStatus::Done {
                task.completed_at = Some(Utc::now());
            } else {
                task.completed_at = None;
            }
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(assignee) = &patch.assignee {
            task.assignee = Some(assignee.clone());
        }
        if let Some(session) = &patch.session {
            task.session = Some(session.clone());
        }
        if let Some(notes) = &patch.notes {
            task.notes = Some(notes.clone());
        }
        task.synced_at = Some(Utc::now());

        self.update_task(&task)?;
        Ok(task)
    }

    /// List tasks matching the filter, dependency sets populated, ordered by
    /// change id then task number.
    pub fn list_tasks(&self, filter: &TaskFilter) -> crate::Result<Vec<Task>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT change_id, num, content, status, priority, assignee, session,
                    started_at, completed_at, notes, source_line, synced_at
             FROM tasks",
        )?;
        let rows = stmt.query_map([], task_from_row)?;

        let mut tasks = Vec::new();
        for task in rows {
            let task = task?;
            if filter.matches(&task) {
                tasks.push(task);
            }
        }
        drop(stmt);

        let mut by_change: HashMap<String, HashMap<TaskNum, BTreeSet<TaskNum>>> = HashMap::new();
        for task in &tasks {
            if !by_change.contains_key(&task.id.change_id) {
                by_change.insert(
                    task.id.change_id.clone(),
                    load_forward_all(&conn, &task.id.change_id)?,
                );
            }
        }
        for task in &mut tasks {
            if let Some(deps) = by_change
                .get(&task.id.change_id)
                .and_then(|m| m.get(&task.id.num))
            {
                task.depends_on = deps.clone();
            }
        }

        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// Up to `n` tasks in the change that are pending and whose every
    /// dependency is done, ordered by priority then source line.
    pub fn next_tasks(&self, change_id: &str, n: usize) -> crate::Result<Vec<Task>> {
        let tasks = self.list_tasks(&TaskFilter::for_change(change_id))?;

        let done: HashSet<&TaskNum> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| &t.id.num)
            .collect();

        let mut ready: Vec<Task> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.depends_on.iter().all(|dep| done.contains(dep)))
            .cloned()
            .collect();

        ready.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(a.source_line.unwrap_or(u32::MAX).cmp(&b.source_line.unwrap_or(u32::MAX)))
                .then(a.id.num.cmp(&b.id.num))
        });
        ready.truncate(n);
        Ok(ready)
    }
}

pub(crate) fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let change_id: String = row.get(0)?;
    let num_raw: String = row.get(1)?;
    let num = num_raw
        .parse::<TaskNum>()
        .map_err(|e| rusqlite::Error::InvalidColumnName(e.to_string()))?;

    Ok(Task {
        id: TaskId::new(change_id, num),
        content: row.get(2)?,
        status: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(TaskStatus::Pending),
        priority: row
            .get::<_, String>(4)?
            .parse()
            .unwrap_or(Priority::Normal),
        depends_on: BTreeSet::new(),
        assignee: row.get(5)?,
        session: row.get(6)?,
        started_at: parse_ts(row.get::<_, Option<String>>(7)?),
        completed_at: parse_ts(row.get::<_, Option<String>>(8)?),
        notes: row.get(9)?,
        source_line: row.get(10)?,
        synced_at: parse_ts(row.get::<_, Option<String>>(11)?),
    })
}

pub(crate) fn upsert_task(conn: &Connection, task: &Task) -> crate::Result<()> {
    conn.execute(
        "INSERT INTO tasks (change_id, num, content, status, priority, assignee, session,
                            started_at, completed_at, notes, source_line, synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(change_id, num) DO UPDATE SET
            content = excluded.content,
            status = excluded.status,
            priority = excluded.priority,
            assignee = excluded.assignee,
            session = excluded.session,
            started_at = excluded.started_at,
            completed_at = excluded.completed_at,
            notes = excluded.notes,
            source_line = excluded.source_line,
            synced_at = excluded.synced_at",
        params![
            task.id.change_id,
            task.id.num.as_str(),
            task.content,
            task.status.as_str(),
            task.priority.as_str(),
            task.assignee,
            task.session,
            format_ts(task.started_at),
            format_ts(task.completed_at),
            task.notes,
            task.source_line,
            format_ts(task.synced_at.or(Some(Utc::now()))),
        ],
    )?;
    Ok(())
}

/// Recompute a change's derived counters from its task rows.
pub(crate) fn recompute_counters(conn: &Connection, change_id: &str) -> crate::Result<()> {
    let (total, completed, in_progress, blocked) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'done'), 0),
                COALESCE(SUM(status = 'in_progress'), 0),
                COALESCE(SUM(status = 'blocked'), 0)
         FROM tasks WHERE change_id = ?1",
        params![change_id],
        |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
            ))
        },
    )?;

    conn.execute(
        "UPDATE changes SET total = ?2, completed = ?3, in_progress = ?4, blocked = ?5,
                            synced_at = ?6
         WHERE id = ?1",
        params![change_id, total, completed, in_progress, blocked, now_ts()],
    )?;
    Ok(())
}

pub(crate) fn load_forward(
    conn: &Connection,
    change_id: &str,
    num: &TaskNum,
) -> crate::Result<BTreeSet<TaskNum>> {
    let mut stmt = conn.prepare(
        "SELECT to_num FROM deps_forward WHERE change_id = ?1 AND from_num = ?2",
    )?;
    let rows = stmt.query_map(params![change_id, num.as_str()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut deps = BTreeSet::new();
    for raw in rows {
        if let Ok(dep) = raw?.parse() {
            deps.insert(dep);
        }
    }
    Ok(deps)
}

pub(crate) fn load_forward_all(
    conn: &Connection,
    change_id: &str,
) -> crate::Result<HashMap<TaskNum, BTreeSet<TaskNum>>> {
    let mut stmt =
        conn.prepare("SELECT from_num, to_num FROM deps_forward WHERE change_id = ?1")?;
    let rows = stmt.query_map(params![change_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut map: HashMap<TaskNum, BTreeSet<TaskNum>> = HashMap::new();
    for row in rows {
        let (from_raw, to_raw) = row?;
        if let (Ok(from), Ok(to)) = (from_raw.parse(), to_raw.parse()) {
            map.entry(from).or_default().insert(to);
        }
    }
    Ok(map)
}
