//! Parser for the `tasks.md` source-of-truth document.
//!
//! Task lines look like:
//!
//! ```text
//! - [ ] 1.2 Wire up the config loader <!-- depends: 1.1 -->
//! - [x] 1.1 Define the config schema
//! ```
//!
//! An unchecked box maps to `pending`, a checked box to `done`; the richer
//! statuses live in the store and overlay the checkbox on sync. The optional
//! HTML comment lists the task numbers this task depends on.

use std::sync::LazyLock;

use regex::Regex;

use crate::store::types::TaskNum;

static TASK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-\s+\[(?<box>[ xX])\]\s+(?<num>\d+(?:\.\d+)*)\s+(?<content>.*?)\s*$")
        .expect("task line regex")
});

static DEPENDS_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*depends:\s*(?<ids>\d+(?:\.\d+)*(?:\s*,\s*\d+(?:\.\d+)*)*)\s*-->")
        .expect("depends comment regex")
});

/// One checkbox line lifted out of `tasks.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTask {
    pub num: TaskNum,
    pub content: String,
    pub done: bool,
    pub depends: Vec<TaskNum>,
    /// 1-based line number in the source document.
    pub source_line: u32,
}

/// Parse every task line in the document.
///
/// Non-task lines (headings, prose, blanks) are skipped. Duplicate task
/// numbers are rejected: the document is the source of truth and an
/// ambiguous identity cannot be ingested.
pub fn parse_tasks_md(text: &str) -> crate::Result<Vec<ParsedTask>> {
    let mut tasks: Vec<ParsedTask> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let Some(caps) = TASK_LINE.captures(line) else {
            continue;
        };

        let num: TaskNum = caps["num"].parse()?;
        if tasks.iter().any(|t| t.num == num) {
            return Err(crate::Error::invalid(format!(
                "duplicate task number '{}' at line {}",
                num,
                idx + 1
            )));
        }

        let raw_content = &caps["content"];
        let depends = extract_depends(raw_content)?;
        let content = DEPENDS_COMMENT.replace_all(raw_content, "").trim().to_string();

        tasks.push(ParsedTask {
            num,
            content,
            done: !caps["box"].trim().is_empty(),
            depends,
            source_line: (idx + 1) as u32,
        });
    }

    Ok(tasks)
}

fn extract_depends(content: &str) -> crate::Result<Vec<TaskNum>> {
    let Some(caps) = DEPENDS_COMMENT.captures(content) else {
        return Ok(Vec::new());
    };

    let mut depends = Vec::new();
    for raw in caps["ids"].split(',') {
        let num: TaskNum = raw.trim().parse()?;
        if !depends.contains(&num) {
            depends.push(num);
        }
    }
    Ok(depends)
}
