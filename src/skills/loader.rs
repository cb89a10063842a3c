//! Skill loader - parses SKILL.md files with YAML frontmatter.
//!
//! ```text
//! ---
//! name: sql-review
//! description: Review SQL schema migrations
//! weight: 0.9
//! triggers:
//!   - file_pattern: "**/*.sql"
//!     weight: 0.9
//!   - keywords: [migration, schema]
//! ---
//!
//! Instruction body ...
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::index::SkillIndex;
use super::trigger::{DEFAULT_TRIGGER_WEIGHT, Trigger};

/// YAML frontmatter for a skill file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillFrontmatter {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<TriggerFrontmatter>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// One trigger entry; exactly one of the three condition fields is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerFrontmatter {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub file_pattern: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl TriggerFrontmatter {
    fn into_trigger(self) -> crate::Result<Trigger> {
        let weight = self.weight.unwrap_or(DEFAULT_TRIGGER_WEIGHT);
        match (self.pattern, self.keywords, self.file_pattern) {
            (Some(pattern), None, None) => Ok(Trigger::pattern(pattern, weight)),
            (None, Some(keywords), None) => Ok(Trigger::keywords(keywords, weight)),
            (None, None, Some(glob)) => Ok(Trigger::file_pattern(glob, weight)),
            _ => Err(crate::Error::invalid(
                "trigger must set exactly one of pattern, keywords, file_pattern",
            )),
        }
    }
}

/// Loader for skill definitions from files or inline content.
#[derive(Debug, Default)]
pub struct SkillLoader;

impl SkillLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a skill from a file path.
    pub async fn load_file(&self, path: &Path) -> crate::Result<SkillIndex> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::Error::invalid(format!("failed to read skill file {}: {}", path.display(), e))
        })?;
        let mut skill = self.parse(&content)?;
        skill = skill.with_location(path.display().to_string());
        Ok(skill)
    }

    /// Load every `SKILL.md` / `*.skill.md` in a directory.
    ///
    /// Unparseable files are logged and skipped rather than failing the
    /// whole scan.
    pub async fn load_directory(&self, dir: &Path) -> crate::Result<Vec<SkillIndex>> {
        let mut skills = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            crate::Error::invalid(format!("failed to read directory {}: {}", dir.display(), e))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| crate::Error::external(format!("directory scan: {}", e)))?
        {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && (name.eq_ignore_ascii_case("SKILL.md") || name.ends_with(".skill.md"))
            {
                match self.load_file(&path).await {
                    Ok(skill) => skills.push(skill),
                    Err(e) => {
                        tracing::warn!("failed to load skill from {}: {}", path.display(), e);
                    }
                }
            }
        }

        Ok(skills)
    }

    /// Parse skill content from a string.
    pub fn parse(&self, content: &str) -> crate::Result<SkillIndex> {
        let (frontmatter_str, body) = split_frontmatter(content)?;

        let frontmatter: SkillFrontmatter = serde_yaml_bw::from_str(frontmatter_str)
            .map_err(|e| crate::Error::invalid(format!("skill frontmatter: {}", e)))?;

        let mut skill = SkillIndex::new(frontmatter.name, frontmatter.description, body);
        if let Some(weight) = frontmatter.weight {
            skill = skill.with_weight(weight);
        }
        skill = skill.with_depends_on(frontmatter.depends_on);
        for entry in frontmatter.triggers {
            skill = skill.with_trigger(entry.into_trigger()?);
        }

        Ok(skill)
    }
}

/// Split a `---` delimited YAML frontmatter block from the body.
pub(crate) fn split_frontmatter(content: &str) -> crate::Result<(&str, &str)> {
    let rest = content.strip_prefix("---").ok_or_else(|| {
        crate::Error::invalid("file must start with YAML frontmatter (---)")
    })?;
    let end = rest.find("\n---").ok_or_else(|| {
        crate::Error::invalid("frontmatter not terminated with ---")
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 4..].trim_start_matches('-').trim();
    Ok((frontmatter, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_skill() {
        let content = r#"---
name: sql-review
description: Review SQL schema migrations
weight: 0.9
depends_on:
  - code-review
triggers:
  - file_pattern: "**/*.sql"
    weight: 0.9
  - keywords: [migration, schema]
  - pattern: "(?i)alter table"
    weight: 0.8
---

Look for destructive statements first.
"#;
        let skill = SkillLoader::new().parse(content).unwrap();
        assert_eq!(skill.name, "sql-review");
        assert_eq!(skill.weight, 0.9);
        assert_eq!(skill.triggers.len(), 3);
        assert_eq!(skill.depends_on, vec!["code-review"]);
        assert!(skill.body.contains("destructive statements"));

        // The keyword trigger picked up the default weight.
        assert_eq!(skill.triggers[1].weight(), DEFAULT_TRIGGER_WEIGHT);
    }

    #[test]
    fn test_missing_frontmatter_rejected() {
        assert!(SkillLoader::new().parse("no frontmatter here").is_err());
    }

    #[test]
    fn test_unterminated_frontmatter_rejected() {
        assert!(SkillLoader::new().parse("---\nname: x\n").is_err());
    }

    #[test]
    fn test_ambiguous_trigger_rejected() {
        let content = r#"---
name: bad
description: Two conditions in one trigger
triggers:
  - pattern: "x"
    keywords: [y]
---
Body
"#;
        assert!(matches!(
            SkillLoader::new().parse(content),
            Err(crate::Error::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("good.skill.md"),
            "---\nname: good\ndescription: A valid skill\n---\nBody",
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.skill.md"), "not a skill").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let skills = SkillLoader::new().load_directory(dir.path()).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "good");
    }
}
