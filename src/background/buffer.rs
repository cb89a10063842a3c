//! Append-only output buffer for background agents.
//!
//! Writers append; readers snapshot the current contents under the buffer's
//! own mutex, independent of the manager lock. Reads at increasing times
//! observe a monotonic prefix.

use std::sync::Mutex;

use regex::Regex;

/// How a reader wants the output sliced.
#[derive(Debug, Clone, Default)]
pub struct OutputQuery {
    /// Keep only lines matching this regex.
    pub filter: Option<String>,
    /// Keep only the last N lines.
    pub tail: Option<usize>,
}

/// Bounded, append-only text buffer.
#[derive(Debug)]
pub struct OutputBuffer {
    content: Mutex<String>,
    max_bytes: usize,
}

impl OutputBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            content: Mutex::new(String::new()),
            max_bytes,
        }
    }

    /// Append a chunk. Fails with `OutputLimit` once the cap is reached;
    /// everything appended before the cap stays readable.
    pub fn append(&self, chunk: &str) -> crate::Result<()> {
        let mut content = self.content.lock().expect("output buffer poisoned");
        let produced = content.len() + chunk.len();
        if produced > self.max_bytes {
            let remaining = self.max_bytes.saturating_sub(content.len());
            if remaining > 0 {
                let cut = floor_char_boundary(chunk, remaining);
                content.push_str(&chunk[..cut]);
            }
            return Err(crate::Error::OutputLimit {
                produced,
                limit: self.max_bytes,
            });
        }
        content.push_str(chunk);
        Ok(())
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.content.lock().expect("output buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the full contents.
    pub fn snapshot(&self) -> String {
        self.content.lock().expect("output buffer poisoned").clone()
    }

    /// Snapshot with filter/tail applied. A filter that matches nothing
    /// yields an empty string, not an error.
    pub fn read(&self, query: &OutputQuery) -> crate::Result<String> {
        let snapshot = self.snapshot();

        let filtered: Vec<&str> = match &query.filter {
            Some(pattern) => {
                let regex = Regex::new(pattern)?;
                snapshot.lines().filter(|l| regex.is_match(l)).collect()
            }
            None => snapshot.lines().collect(),
        };

        let tailed: &[&str] = match query.tail {
            Some(n) if n < filtered.len() => &filtered[filtered.len() - n..],
            _ => &filtered,
        };

        Ok(tailed.join("\n"))
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_snapshot() {
        let buffer = OutputBuffer::new(1024);
        buffer.append("line one\n").unwrap();
        buffer.append("line two\n").unwrap();
        assert_eq!(buffer.snapshot(), "line one\nline two\n");
    }

    #[test]
    fn test_monotonic_prefix() {
        let buffer = OutputBuffer::new(1024);
        buffer.append("alpha ").unwrap();
        let first = buffer.snapshot();
        buffer.append("beta").unwrap();
        let second = buffer.snapshot();
        assert!(second.starts_with(&first));
    }

    #[test]
    fn test_output_limit() {
        let buffer = OutputBuffer::new(10);
        buffer.append("12345").unwrap();
        let err = buffer.append("6789012345").unwrap_err();
        assert_eq!(err.code(), "output_limit");

        // The prefix written before the cap survives.
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_filtered_read() {
        let buffer = OutputBuffer::new(1024);
        buffer
            .append("info: starting\nerror: boom\ninfo: done\n")
            .unwrap();

        let errors = buffer
            .read(&OutputQuery {
                filter: Some("^error".to_string()),
                tail: None,
            })
            .unwrap();
        assert_eq!(errors, "error: boom");
    }

    #[test]
    fn test_filter_matching_nothing_is_empty() {
        let buffer = OutputBuffer::new(1024);
        buffer.append("plain output\n").unwrap();

        let out = buffer
            .read(&OutputQuery {
                filter: Some("zzz-never".to_string()),
                tail: None,
            })
            .unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_tail_read() {
        let buffer = OutputBuffer::new(1024);
        buffer.append("1\n2\n3\n4\n5\n").unwrap();

        let out = buffer
            .read(&OutputQuery {
                filter: None,
                tail: Some(2),
            })
            .unwrap();
        assert_eq!(out, "4\n5");
    }

    #[test]
    fn test_invalid_filter_regex_errors() {
        let buffer = OutputBuffer::new(1024);
        buffer.append("text\n").unwrap();
        assert!(
            buffer
                .read(&OutputQuery {
                    filter: Some("(unclosed".to_string()),
                    tail: None,
                })
                .is_err()
        );
    }
}
