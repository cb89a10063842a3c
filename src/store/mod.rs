//! Registry store - embedded task/dependency graph.
//!
//! A process-local SQLite database (WAL mode, bundled driver) organized into
//! five namespace tables: `tasks`, `changes`, `deps_forward`, `deps_reverse`,
//! and `meta`. All writes run inside transactions; a failed cycle check
//! leaves the store untouched. Reads are cheap point lookups or small scans.
//!
//! Storage: `<spec-dir>/registry.db` (generated, gitignored).

mod deps;
mod parser;
mod sync;
mod tasks;
mod types;

pub use parser::{ParsedTask, parse_tasks_md};
pub use sync::SyncReport;
pub use tasks::TaskPatch;
pub use types::{
    Change, ChangeStatus, Priority, Task, TaskFilter, TaskId, TaskNum, TaskStatus,
    validate_change_id,
};

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

const SCHEMA_VERSION: &str = "2";

/// Persistent, process-local registry of changes, tasks, and dependencies.
///
/// Concurrent readers are serialized only by the short-lived connection
/// mutex; writers additionally serialize through SQLite's write transaction.
pub struct RegistryStore {
    conn: Mutex<Connection>,
}

impl RegistryStore {
    /// Open (or create) the registry database at the given path.
    pub fn open(db_path: &Path) -> crate::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests and ephemeral sessions.
    pub fn open_in_memory() -> crate::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> crate::Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS changes (
                id          TEXT PRIMARY KEY,
                status      TEXT NOT NULL DEFAULT 'active',
                total       INTEGER NOT NULL DEFAULT 0,
                completed   INTEGER NOT NULL DEFAULT 0,
                in_progress INTEGER NOT NULL DEFAULT 0,
                blocked     INTEGER NOT NULL DEFAULT 0,
                synced_at   TEXT
            );
            CREATE TABLE IF NOT EXISTS tasks (
                change_id    TEXT NOT NULL,
                num          TEXT NOT NULL,
                content      TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'pending',
                priority     TEXT NOT NULL DEFAULT 'normal',
                assignee     TEXT,
                session      TEXT,
                started_at   TEXT,
                completed_at TEXT,
                notes        TEXT,
                source_line  INTEGER,
                synced_at    TEXT,
                PRIMARY KEY (change_id, num)
            );
            CREATE TABLE IF NOT EXISTS deps_forward (
                change_id TEXT NOT NULL,
                from_num  TEXT NOT NULL,
                to_num    TEXT NOT NULL,
                PRIMARY KEY (change_id, from_num, to_num)
            );
            CREATE TABLE IF NOT EXISTS deps_reverse (
                change_id TEXT NOT NULL,
                to_num    TEXT NOT NULL,
                from_num  TEXT NOT NULL,
                PRIMARY KEY (change_id, to_num, from_num)
            );
            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (change_id, status);",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("registry store poisoned")
    }

    // ------------------------------------------------------------------
    // Changes
    // ------------------------------------------------------------------

    /// Fetch a change row with its derived counters.
    pub fn get_change(&self, change_id: &str) -> crate::Result<Change> {
        let conn = self.lock();
        Self::get_change_on(&conn, change_id)
    }

    pub(crate) fn get_change_on(conn: &Connection, change_id: &str) -> crate::Result<Change> {
        conn.query_row(
            "SELECT id, status, total, completed, in_progress, blocked, synced_at
             FROM changes WHERE id = ?1",
            params![change_id],
            |row| {
                Ok(Change {
                    id: row.get(0)?,
                    status: row
                        .get::<_, String>(1)?
                        .parse()
                        .unwrap_or(ChangeStatus::Active),
                    total: row.get(2)?,
                    completed: row.get(3)?,
                    in_progress: row.get(4)?,
                    blocked: row.get(5)?,
                    synced_at: parse_ts(row.get::<_, Option<String>>(6)?),
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                crate::Error::not_found(format!("change '{}'", change_id))
            }
            other => other.into(),
        })
    }

    /// List changes, optionally filtered by status.
    pub fn list_changes(&self, status: Option<ChangeStatus>) -> crate::Result<Vec<Change>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, status, total, completed, in_progress, blocked, synced_at
             FROM changes ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Change {
                id: row.get(0)?,
                status: row
                    .get::<_, String>(1)?
                    .parse()
                    .unwrap_or(ChangeStatus::Active),
                total: row.get(2)?,
                completed: row.get(3)?,
                in_progress: row.get(4)?,
                blocked: row.get(5)?,
                synced_at: parse_ts(row.get::<_, Option<String>>(6)?),
            })
        })?;

        let mut changes = Vec::new();
        for change in rows {
            let change = change?;
            if status.is_none_or(|s| change.status == s) {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Create a change row if it does not exist yet.
    pub fn ensure_change(&self, change_id: &str) -> crate::Result<()> {
        validate_change_id(change_id)?;
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO changes (id) VALUES (?1)",
            params![change_id],
        )?;
        Ok(())
    }

    /// Archive a change: marks the row archived and removes its tasks and
    /// dependency edges. This is the only path that deletes task rows.
    pub fn archive_change(&self, change_id: &str) -> crate::Result<u32> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM changes WHERE id = ?1",
                params![change_id],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if !exists {
            return Err(crate::Error::not_found(format!("change '{}'", change_id)));
        }

        let removed = tx.execute("DELETE FROM tasks WHERE change_id = ?1", params![change_id])?;
        tx.execute(
            "DELETE FROM deps_forward WHERE change_id = ?1",
            params![change_id],
        )?;
        tx.execute(
            "DELETE FROM deps_reverse WHERE change_id = ?1",
            params![change_id],
        )?;
        tx.execute(
            "UPDATE changes SET status = 'archived', total = 0, completed = 0,
             in_progress = 0, blocked = 0, synced_at = ?2 WHERE id = ?1",
            params![change_id, now_ts()],
        )?;

        tx.commit()?;
        Ok(removed as u32)
    }

    // ------------------------------------------------------------------
    // Meta
    // ------------------------------------------------------------------

    pub fn get_meta(&self, key: &str) -> crate::Result<Option<String>> {
        let conn = self.lock();
        let value = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> crate::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

pub(crate) fn format_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

#[cfg(test)]
mod store_tests {
    use super::*;

    #[test]
    fn test_open_in_memory_schema() {
        let store = RegistryStore::open_in_memory().unwrap();
        assert_eq!(
            store.get_meta("schema_version").unwrap().as_deref(),
            Some(SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_ensure_and_get_change() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.ensure_change("add-auth").unwrap();

        let change = store.get_change("add-auth").unwrap();
        assert_eq!(change.id, "add-auth");
        assert_eq!(change.status, ChangeStatus::Active);
        assert_eq!(change.total, 0);

        assert!(matches!(
            store.get_change("missing"),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_ensure_change_rejects_bad_id() {
        let store = RegistryStore::open_in_memory().unwrap();
        assert!(matches!(
            store.ensure_change("Not-Kebab"),
            Err(crate::Error::Invalid(_))
        ));
    }

    #[test]
    fn test_list_changes_filter() {
        let store = RegistryStore::open_in_memory().unwrap();
        store.ensure_change("one").unwrap();
        store.ensure_change("two").unwrap();
        store.archive_change("two").unwrap();

        let active = store.list_changes(Some(ChangeStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "one");

        let all = store.list_changes(None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_meta_roundtrip() {
        let store = RegistryStore::open_in_memory().unwrap();
        assert!(store.get_meta("absent").unwrap().is_none());
        store.set_meta("last_sync", "2026-01-01").unwrap();
        store.set_meta("last_sync", "2026-02-01").unwrap();
        assert_eq!(
            store.get_meta("last_sync").unwrap().as_deref(),
            Some("2026-02-01")
        );
    }
}
