//! Dependency edges: forward/reverse indices and cycle detection.
//!
//! An edge `from -> to` means `from` depends on `to`. Both indices are
//! written in one transaction; the edge set must stay a DAG per change, so
//! every insertion runs a bounded DFS over the existing forward index before
//! commit.

use rusqlite::{Connection, params};

use super::RegistryStore;
use crate::store::types::{TaskId, TaskNum};

/// Hard ceiling on nodes visited by the cycle-check DFS.
const CYCLE_SCAN_LIMIT: usize = 10_000;

impl RegistryStore {
    /// Insert a dependency edge in both indices.
    ///
    /// Rejects self-dependencies, edges across changes, edges whose
    /// endpoints are missing, and insertions that would close a cycle.
    /// A failed check leaves the store unchanged.
    pub fn add_dependency(&self, from: &TaskId, to: &TaskId) -> crate::Result<()> {
        if from.change_id != to.change_id {
            return Err(crate::Error::invalid(format!(
                "dependency endpoints span changes '{}' and '{}'",
                from.change_id, to.change_id
            )));
        }
        if from.num == to.num {
            return Err(crate::Error::invalid(format!(
                "task {} cannot depend on itself",
                from
            )));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        for id in [from, to] {
            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM tasks WHERE change_id = ?1 AND num = ?2",
                    params![id.change_id, id.num.as_str()],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                return Err(crate::Error::not_found(format!("task '{}'", id)));
            }
        }

        insert_edge_checked(&tx, &from.change_id, &from.num, &to.num)?;

        tx.commit()?;
        Ok(())
    }

    /// Remove a dependency edge from both indices atomically.
    pub fn remove_dependency(&self, from: &TaskId, to: &TaskId) -> crate::Result<()> {
        if from.change_id != to.change_id {
            return Err(crate::Error::invalid(
                "dependency endpoints span changes".to_string(),
            ));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM deps_forward WHERE change_id = ?1 AND from_num = ?2 AND to_num = ?3",
            params![from.change_id, from.num.as_str(), to.num.as_str()],
        )?;
        tx.execute(
            "DELETE FROM deps_reverse WHERE change_id = ?1 AND to_num = ?2 AND from_num = ?3",
            params![from.change_id, to.num.as_str(), from.num.as_str()],
        )?;

        tx.commit()?;

        if removed == 0 {
            return Err(crate::Error::not_found(format!(
                "dependency {} -> {}",
                from, to
            )));
        }
        Ok(())
    }

    /// Direct blockers of a task (forward index), O(k).
    pub fn blockers_of(&self, id: &TaskId) -> crate::Result<Vec<TaskId>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT to_num FROM deps_forward WHERE change_id = ?1 AND from_num = ?2 ORDER BY to_num",
        )?;
        let rows = stmt.query_map(params![id.change_id, id.num.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        collect_ids(rows, &id.change_id)
    }

    /// Tasks directly blocked by this task (reverse index), O(k).
    pub fn blocked_by(&self, id: &TaskId) -> crate::Result<Vec<TaskId>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT from_num FROM deps_reverse WHERE change_id = ?1 AND to_num = ?2 ORDER BY from_num",
        )?;
        let rows = stmt.query_map(params![id.change_id, id.num.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        collect_ids(rows, &id.change_id)
    }
}

fn collect_ids(
    rows: impl Iterator<Item = rusqlite::Result<String>>,
    change_id: &str,
) -> crate::Result<Vec<TaskId>> {
    let mut ids = Vec::new();
    for raw in rows {
        let num: TaskNum = raw?.parse()?;
        ids.push(TaskId::new(change_id, num));
    }
    Ok(ids)
}

/// Insert `from -> to` into both indices after a cycle check against the
/// existing forward edges. Callers supply an open transaction so a rejected
/// edge rolls back with the rest of the batch.
pub(crate) fn insert_edge_checked(
    conn: &Connection,
    change_id: &str,
    from: &TaskNum,
    to: &TaskNum,
) -> crate::Result<()> {
    if reaches(conn, change_id, to, from)? {
        return Err(crate::Error::CycleDetected(format!(
            "adding {} -> {} would close a cycle in change '{}'",
            from, to, change_id
        )));
    }

    conn.execute(
        "INSERT OR IGNORE INTO deps_forward (change_id, from_num, to_num) VALUES (?1, ?2, ?3)",
        params![change_id, from.as_str(), to.as_str()],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO deps_reverse (change_id, to_num, from_num) VALUES (?1, ?2, ?3)",
        params![change_id, to.as_str(), from.as_str()],
    )?;
    Ok(())
}

/// Bounded DFS over the forward index: is `target` reachable from `start`?
fn reaches(
    conn: &Connection,
    change_id: &str,
    start: &TaskNum,
    target: &TaskNum,
) -> crate::Result<bool> {
    let mut stmt =
        conn.prepare("SELECT to_num FROM deps_forward WHERE change_id = ?1 AND from_num = ?2")?;

    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![start.clone()];

    while let Some(node) = stack.pop() {
        if &node == target {
            return Ok(true);
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        if visited.len() > CYCLE_SCAN_LIMIT {
            return Err(crate::Error::invalid(format!(
                "dependency graph of change '{}' exceeds {} nodes",
                change_id, CYCLE_SCAN_LIMIT
            )));
        }

        let rows = stmt.query_map(params![change_id, node.as_str()], |row| {
            row.get::<_, String>(0)
        })?;
        for raw in rows {
            if let Ok(next) = raw?.parse::<TaskNum>() {
                if !visited.contains(&next) {
                    stack.push(next);
                }
            }
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{Task, TaskStatus};

    fn id(num: &str) -> TaskId {
        TaskId::new("c1", num.parse().unwrap())
    }

    fn seeded(nums: &[&str]) -> RegistryStore {
        let store = RegistryStore::open_in_memory().unwrap();
        for num in nums {
            store
                .update_task(
                    &Task::new(id(num), format!("Task {}", num)).with_status(TaskStatus::Pending),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_indices_stay_consistent() {
        let store = seeded(&["1", "2"]);
        store.add_dependency(&id("2"), &id("1")).unwrap();

        // b in blockers_of(a) <=> a in blocked_by(b)
        assert_eq!(store.blockers_of(&id("2")).unwrap(), vec![id("1")]);
        assert_eq!(store.blocked_by(&id("1")).unwrap(), vec![id("2")]);
        assert!(store.blockers_of(&id("1")).unwrap().is_empty());
    }

    #[test]
    fn test_cycle_rejected_and_store_unchanged() {
        // S2: edges a->b, b->c exist; c->a must be rejected.
        let store = seeded(&["1", "2", "3"]);
        store.add_dependency(&id("1"), &id("2")).unwrap();
        store.add_dependency(&id("2"), &id("3")).unwrap();

        let err = store.add_dependency(&id("3"), &id("1")).unwrap_err();
        assert_eq!(err.code(), "cycle_detected");

        // Both indices are exactly as before the failed insert.
        assert_eq!(store.blockers_of(&id("3")).unwrap(), Vec::<TaskId>::new());
        assert_eq!(store.blocked_by(&id("1")).unwrap(), Vec::<TaskId>::new());
        assert_eq!(store.blockers_of(&id("1")).unwrap(), vec![id("2")]);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let store = seeded(&["1"]);
        assert!(matches!(
            store.add_dependency(&id("1"), &id("1")),
            Err(crate::Error::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        let store = seeded(&["1"]);
        let err = store.add_dependency(&id("1"), &id("9")).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_cross_change_edge_rejected() {
        let store = seeded(&["1"]);
        let other = TaskId::new("c2", "1".parse().unwrap());
        assert!(matches!(
            store.add_dependency(&id("1"), &other),
            Err(crate::Error::Invalid(_))
        ));
    }

    #[test]
    fn test_remove_dependency() {
        let store = seeded(&["1", "2"]);
        store.add_dependency(&id("2"), &id("1")).unwrap();
        store.remove_dependency(&id("2"), &id("1")).unwrap();

        assert!(store.blockers_of(&id("2")).unwrap().is_empty());
        assert!(store.blocked_by(&id("1")).unwrap().is_empty());

        let err = store.remove_dependency(&id("2"), &id("1")).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let store = seeded(&["1", "2", "3", "4"]);
        store.add_dependency(&id("4"), &id("2")).unwrap();
        store.add_dependency(&id("4"), &id("3")).unwrap();
        store.add_dependency(&id("2"), &id("1")).unwrap();
        store.add_dependency(&id("3"), &id("1")).unwrap();

        assert_eq!(store.blockers_of(&id("4")).unwrap().len(), 2);
    }
}
