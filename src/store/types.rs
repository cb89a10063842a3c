//! Task, change, and identifier types for the registry store.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dotted task number like `1`, `1.2`, or `1.2.3`.
///
/// Ordering is numeric per component, so `1.10` sorts after `1.9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskNum(String);

impl TaskNum {
    pub fn new(raw: impl Into<String>) -> crate::Result<Self> {
        let raw = raw.into();
        raw.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric components of the dotted path.
    pub fn components(&self) -> Vec<u32> {
        self.0
            .split('.')
            .map(|c| c.parse().unwrap_or(0))
            .collect()
    }

    /// Whether `self` is a direct or transitive parent path of `other`
    /// (`1.2` is a parent of `1.2.3`).
    pub fn is_parent_of(&self, other: &TaskNum) -> bool {
        let mine = self.components();
        let theirs = other.components();
        theirs.len() > mine.len() && theirs[..mine.len()] == mine[..]
    }
}

impl FromStr for TaskNum {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        if s.is_empty()
            || !s
                .split('.')
                .all(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit()))
        {
            return Err(crate::Error::invalid(format!(
                "task number '{}' must match \\d+(\\.\\d+)*",
                s
            )));
        }
        Ok(TaskNum(s.to_string()))
    }
}

impl fmt::Display for TaskNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialOrd for TaskNum {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskNum {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.components().cmp(&other.components())
    }
}

/// Identity of a task: owning change plus dotted number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub change_id: String,
    pub num: TaskNum,
}

impl TaskId {
    pub fn new(change_id: impl Into<String>, num: TaskNum) -> Self {
        Self {
            change_id: change_id.into(),
            num,
        }
    }

    /// Parse `change-id:1.2` or a bare `1.2` with a fallback change.
    pub fn parse(raw: &str, default_change: Option<&str>) -> crate::Result<Self> {
        match raw.split_once(':') {
            Some((change, num)) => Ok(Self::new(change, num.parse()?)),
            None => {
                let change = default_change.ok_or_else(|| {
                    crate::Error::invalid(format!(
                        "task id '{}' has no change prefix and no change_id was given",
                        raw
                    ))
                })?;
                Ok(Self::new(change, raw.parse()?))
            }
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.change_id, self.num)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

impl FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(crate::Error::invalid(format!(
                "unknown task status '{}'",
                other
            ))),
        }
    }
}

/// Scheduling priority. Orders `Critical` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Rank for scheduling order; lower runs first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(crate::Error::invalid(format!(
                "unknown priority '{}'",
                other
            ))),
        }
    }
}

/// A single checkbox-tracked unit of work inside a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub content: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Direct blockers this task waits on (forward edges).
    #[serde(default)]
    pub depends_on: BTreeSet<TaskNum>,
    pub assignee: Option<String>,
    pub session: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Line number in the `tasks.md` source document.
    pub source_line: Option<u32>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            status: TaskStatus::default(),
            priority: Priority::default(),
            depends_on: BTreeSet::new(),
            assignee: None,
            session: None,
            started_at: None,
            completed_at: None,
            notes: None,
            source_line: None,
            synced_at: None,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source_line(mut self, line: u32) -> Self {
        self.source_line = Some(line);
        self
    }
}

/// Lifecycle state of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    #[default]
    Active,
    Archived,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Active => "active",
            ChangeStatus::Archived => "archived",
        }
    }
}

impl FromStr for ChangeStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "active" => Ok(ChangeStatus::Active),
            "archived" => Ok(ChangeStatus::Archived),
            other => Err(crate::Error::invalid(format!(
                "unknown change status '{}'",
                other
            ))),
        }
    }
}

/// A proposal-scoped unit of work containing many tasks.
///
/// Counters are derived from the task table and recomputed transactionally
/// on every task mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub status: ChangeStatus,
    pub total: u32,
    pub completed: u32,
    pub in_progress: u32,
    pub blocked: u32,
    pub synced_at: Option<DateTime<Utc>>,
}

impl Change {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ChangeStatus::Active,
            total: 0,
            completed: 0,
            in_progress: 0,
            blocked: 0,
            synced_at: None,
        }
    }

    /// Completion percentage in [0, 100].
    pub fn progress_pct(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            self.completed * 100 / self.total
        }
    }
}

/// Validate a lowercase-kebab change id.
pub fn validate_change_id(id: &str) -> crate::Result<()> {
    let ok = !id.is_empty()
        && !id.starts_with('-')
        && !id.ends_with('-')
        && !id.contains("--")
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(crate::Error::invalid(format!(
            "change id '{}' must be lowercase-kebab",
            id
        )))
    }
}

/// Filter for [`crate::RegistryStore::list_tasks`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub change_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
}

impl TaskFilter {
    pub fn for_change(change_id: impl Into<String>) -> Self {
        Self {
            change_id: Some(change_id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(change) = &self.change_id
            && &task.id.change_id != change
        {
            return false;
        }
        if let Some(status) = self.status
            && task.status != status
        {
            return false;
        }
        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_num_parsing() {
        assert!("1".parse::<TaskNum>().is_ok());
        assert!("1.2.3".parse::<TaskNum>().is_ok());
        assert!("".parse::<TaskNum>().is_err());
        assert!("1.".parse::<TaskNum>().is_err());
        assert!("a.b".parse::<TaskNum>().is_err());
        assert!("1..2".parse::<TaskNum>().is_err());
    }

    #[test]
    fn test_task_num_numeric_ordering() {
        let a: TaskNum = "1.9".parse().unwrap();
        let b: TaskNum = "1.10".parse().unwrap();
        assert!(a < b);

        let c: TaskNum = "2".parse().unwrap();
        assert!(b < c);
    }

    #[test]
    fn test_task_num_parent() {
        let parent: TaskNum = "1.2".parse().unwrap();
        let child: TaskNum = "1.2.3".parse().unwrap();
        assert!(parent.is_parent_of(&child));
        assert!(!child.is_parent_of(&parent));
        assert!(!parent.is_parent_of(&parent));
    }

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::parse("add-auth:1.2", None).unwrap();
        assert_eq!(id.change_id, "add-auth");
        assert_eq!(id.num.as_str(), "1.2");

        let id = TaskId::parse("1.2", Some("add-auth")).unwrap();
        assert_eq!(id.change_id, "add-auth");

        assert!(TaskId::parse("1.2", None).is_err());
    }

    #[test]
    fn test_change_id_validation() {
        assert!(validate_change_id("add-auth").is_ok());
        assert!(validate_change_id("fix2").is_ok());
        assert!(validate_change_id("Add-Auth").is_err());
        assert!(validate_change_id("-bad").is_err());
        assert!(validate_change_id("bad-").is_err());
        assert!(validate_change_id("a--b").is_err());
        assert!(validate_change_id("").is_err());
    }

    #[test]
    fn test_priority_rank() {
        assert!(Priority::Critical.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Normal.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());
    }

    #[test]
    fn test_progress_pct() {
        let mut change = Change::new("c1");
        assert_eq!(change.progress_pct(), 0);
        change.total = 4;
        change.completed = 1;
        assert_eq!(change.progress_pct(), 25);
    }

    #[test]
    fn test_filter_matches() {
        let task = Task::new(
            TaskId::new("c1", "1.1".parse().unwrap()),
            "Implement the parser",
        )
        .with_status(TaskStatus::Pending)
        .with_priority(Priority::High);

        assert!(TaskFilter::for_change("c1").matches(&task));
        assert!(!TaskFilter::for_change("c2").matches(&task));
        assert!(
            TaskFilter::for_change("c1")
                .with_status(TaskStatus::Pending)
                .matches(&task)
        );
        assert!(
            !TaskFilter::for_change("c1")
                .with_priority(Priority::Low)
                .matches(&task)
        );
    }
}
