//! Skill trigger definitions.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default weight for triggers that omit one.
pub const DEFAULT_TRIGGER_WEIGHT: f64 = 0.7;

/// A single activation condition on a skill.
///
/// Weights live in `[0, 1]` and contribute to the match score when the
/// trigger fires; multiple keyword hits inside one trigger do not compound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Regex matched against the query text.
    Pattern { pattern: String, weight: f64 },
    /// Exact or substring keyword hits against the query text.
    Keywords { keywords: Vec<String>, weight: f64 },
    /// Glob matched against the files in the match context.
    FilePattern { file_pattern: String, weight: f64 },
}

impl Trigger {
    pub fn pattern(pattern: impl Into<String>, weight: f64) -> Self {
        Trigger::Pattern {
            pattern: pattern.into(),
            weight: clamp_weight(weight),
        }
    }

    pub fn keywords<I, S>(keywords: I, weight: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Trigger::Keywords {
            keywords: keywords.into_iter().map(Into::into).collect(),
            weight: clamp_weight(weight),
        }
    }

    pub fn file_pattern(pattern: impl Into<String>, weight: f64) -> Self {
        Trigger::FilePattern {
            file_pattern: pattern.into(),
            weight: clamp_weight(weight),
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Trigger::Pattern { weight, .. }
            | Trigger::Keywords { weight, .. }
            | Trigger::FilePattern { weight, .. } => *weight,
        }
    }

    /// Evaluate against a query and context file list. Returns the weight
    /// contributed, or `None` when the trigger does not fire.
    pub fn evaluate(&self, query: &str, files: &[String]) -> Option<TriggerHit> {
        match self {
            Trigger::Pattern { pattern, weight } => {
                let regex = Regex::new(pattern).ok()?;
                regex.is_match(query).then(|| TriggerHit {
                    kind: "pattern",
                    value: pattern.clone(),
                    weight: *weight,
                })
            }
            Trigger::Keywords { keywords, weight } => {
                let lower = query.to_lowercase();
                keywords
                    .iter()
                    .find(|kw| lower.contains(&kw.to_lowercase()))
                    .map(|kw| TriggerHit {
                        kind: "keyword",
                        value: kw.clone(),
                        weight: *weight,
                    })
            }
            Trigger::FilePattern {
                file_pattern,
                weight,
            } => {
                let glob = glob::Pattern::new(file_pattern).ok()?;
                files
                    .iter()
                    .find(|f| glob.matches(f))
                    .map(|f| TriggerHit {
                        kind: "file",
                        value: f.clone(),
                        weight: *weight,
                    })
            }
        }
    }
}

/// Why a trigger fired, surfaced in match results.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerHit {
    /// Trigger kind: `pattern`, `keyword`, or `file`.
    pub kind: &'static str,
    /// The pattern, keyword, or file that matched.
    pub value: String,
    pub weight: f64,
}

fn clamp_weight(weight: f64) -> f64 {
    weight.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_trigger() {
        let trigger = Trigger::pattern(r"(?i)\breview\b", 0.8);
        assert!(trigger.evaluate("Please review this PR", &[]).is_some());
        assert!(trigger.evaluate("previewing", &[]).is_none());
    }

    #[test]
    fn test_keyword_trigger_no_compounding() {
        let trigger = Trigger::keywords(["test", "coverage"], 0.7);
        let hit = trigger
            .evaluate("add test coverage for the parser", &[])
            .unwrap();
        assert_eq!(hit.weight, 0.7);
    }

    #[test]
    fn test_file_pattern_trigger() {
        let trigger = Trigger::file_pattern("**/*.sql", 0.9);
        let files = vec!["migrations/001_init.sql".to_string()];
        assert!(trigger.evaluate("anything", &files).is_some());
        assert!(trigger.evaluate("anything", &[]).is_none());
    }

    #[test]
    fn test_invalid_pattern_never_fires() {
        let trigger = Trigger::pattern("(unclosed", 0.8);
        assert!(trigger.evaluate("(unclosed", &[]).is_none());
    }

    #[test]
    fn test_weight_clamped() {
        assert_eq!(Trigger::pattern("x", 1.7).weight(), 1.0);
        assert_eq!(Trigger::keywords(["x"], -0.2).weight(), 0.0);
    }
}
