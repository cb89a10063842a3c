//! Skill registry - manages available skills.

use std::collections::HashMap;
use std::path::Path;

use super::SkillLoader;
use super::index::SkillIndex;

/// Registry for loaded skill descriptors.
///
/// Name-keyed; registering under an existing name replaces the descriptor,
/// which is how reload works.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, SkillIndex>,
    loader: SkillLoader,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, skill: SkillIndex) {
        self.skills.insert(skill.name.clone(), skill);
    }

    pub fn get(&self, name: &str) -> Option<&SkillIndex> {
        self.skills.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn skills(&self) -> impl Iterator<Item = &SkillIndex> {
        self.skills.values()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn remove(&mut self, name: &str) -> Option<SkillIndex> {
        self.skills.remove(name)
    }

    /// Resolve a skill and its transitive `depends_on` closure, dependency
    /// bodies first. Unknown dependencies are skipped with a warning.
    pub fn resolve_with_dependencies(&self, name: &str) -> Vec<&SkillIndex> {
        let mut ordered = Vec::new();
        let mut seen = std::collections::HashSet::new();
        self.resolve_into(name, &mut ordered, &mut seen);
        ordered
    }

    fn resolve_into<'a>(
        &'a self,
        name: &str,
        ordered: &mut Vec<&'a SkillIndex>,
        seen: &mut std::collections::HashSet<String>,
    ) {
        if !seen.insert(name.to_string()) {
            return;
        }
        let Some(skill) = self.skills.get(name) else {
            tracing::warn!("skill dependency '{}' is not registered", name);
            return;
        };
        for dep in &skill.depends_on {
            self.resolve_into(dep, ordered, seen);
        }
        ordered.push(skill);
    }

    /// Load and register every skill file in a directory. Returns the count
    /// registered.
    pub async fn load_directory(&mut self, dir: &Path) -> crate::Result<usize> {
        let skills = self.loader.load_directory(dir).await?;
        let count = skills.len();
        for skill in skills {
            self.register(skill);
        }
        Ok(count)
    }

    /// Parse and register a skill from inline content.
    pub fn load_inline(&mut self, content: &str) -> crate::Result<()> {
        let skill = self.loader.parse(content)?;
        self.register(skill);
        Ok(())
    }

    /// One summary line per skill, sorted, for prompt injection.
    pub fn build_summary(&self) -> String {
        let mut lines: Vec<String> = self.skills.values().map(|s| s.to_summary_line()).collect();
        lines.sort();
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_replace() {
        let mut registry = SkillRegistry::new();
        registry.register(SkillIndex::new("commit", "Old description", "v1"));
        registry.register(SkillIndex::new("commit", "New description", "v2"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("commit").unwrap().body, "v2");
    }

    #[test]
    fn test_dependency_resolution_order() {
        let mut registry = SkillRegistry::new();
        registry.register(SkillIndex::new("base", "Base conventions", "base body"));
        registry.register(
            SkillIndex::new("review", "Code review", "review body").with_depends_on(["base"]),
        );
        registry.register(
            SkillIndex::new("sql-review", "SQL review", "sql body").with_depends_on(["review"]),
        );

        let chain = registry.resolve_with_dependencies("sql-review");
        let names: Vec<&str> = chain.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["base", "review", "sql-review"]);
    }

    #[test]
    fn test_dependency_cycle_terminates() {
        let mut registry = SkillRegistry::new();
        registry.register(SkillIndex::new("a", "A", "").with_depends_on(["b"]));
        registry.register(SkillIndex::new("b", "B", "").with_depends_on(["a"]));

        let chain = registry.resolve_with_dependencies("a");
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_missing_dependency_skipped() {
        let mut registry = SkillRegistry::new();
        registry.register(SkillIndex::new("solo", "Solo", "").with_depends_on(["ghost"]));

        let chain = registry.resolve_with_dependencies("solo");
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_load_inline() {
        let mut registry = SkillRegistry::new();
        registry
            .load_inline("---\nname: inline\ndescription: From a string\n---\nBody")
            .unwrap();
        assert!(registry.get("inline").is_some());
    }

    #[test]
    fn test_build_summary_sorted() {
        let mut registry = SkillRegistry::new();
        registry.register(SkillIndex::new("zeta", "Last", ""));
        registry.register(SkillIndex::new("alpha", "First", ""));

        let summary = registry.build_summary();
        let alpha_pos = summary.find("alpha").unwrap();
        let zeta_pos = summary.find("zeta").unwrap();
        assert!(alpha_pos < zeta_pos);
    }
}
