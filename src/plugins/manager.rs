//! Plugin lifecycle: install, uninstall, enable, disable.
//!
//! A single coarse mutex guards the plugin table; enabling and disabling
//! mutate the shared skill and agent registries. Component name collisions
//! with another *enabled plugin* are conflicts; collisions with builtin or
//! project components are resolved by namespacing the plugin's component.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::error::PluginError;
use super::manifest::{PluginBundle, PluginRule};
use super::marketplace::Marketplace;
use super::namespace;
use crate::agents::{AgentLoader, AgentRegistry};
use crate::skills::{SkillLoader, SkillRegistry};

/// Plugin lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Installed,
    Enabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub state: PluginState,
    pub dependencies: Vec<String>,
    pub skills: Vec<String>,
    pub agents: Vec<String>,
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub ok: bool,
    pub detail: String,
}

struct PluginRecord {
    bundle: PluginBundle,
    state: PluginState,
    /// Registration names contributed while enabled; removing exactly
    /// these restores the registries to their pre-enable snapshot.
    contributed_skills: Vec<String>,
    contributed_agents: Vec<String>,
    rules: Vec<PluginRule>,
}

pub struct PluginManager {
    install_dir: PathBuf,
    plugins: Mutex<HashMap<String, PluginRecord>>,
    skills: Arc<RwLock<SkillRegistry>>,
    agents: Arc<RwLock<AgentRegistry>>,
    marketplace: Marketplace,
}

impl PluginManager {
    pub fn new(
        install_dir: PathBuf,
        skills: Arc<RwLock<SkillRegistry>>,
        agents: Arc<RwLock<AgentRegistry>>,
    ) -> Self {
        Self {
            install_dir,
            plugins: Mutex::new(HashMap::new()),
            skills,
            agents,
            marketplace: Marketplace::new(),
        }
    }

    /// Register already-installed bundles found under the install
    /// directory (and any extra scan dirs) without enabling them.
    pub async fn scan(&self, extra_dirs: &[PathBuf]) -> crate::Result<usize> {
        let mut dirs = vec![self.install_dir.clone()];
        dirs.extend_from_slice(extra_dirs);
        let bundles = super::discovery::PluginDiscovery::discover(&dirs)?;

        let mut plugins = self.plugins.lock().await;
        let mut added = 0;
        for bundle in bundles {
            if !plugins.contains_key(bundle.name()) {
                plugins.insert(bundle.name().to_string(), PluginRecord::new(bundle));
                added += 1;
            }
        }
        Ok(added)
    }

    /// Install from a local directory: validate, copy into the install
    /// directory, register as installed.
    pub async fn install_local(&self, source: &Path) -> crate::Result<String> {
        let bundle = PluginBundle::load(source)?;
        let name = bundle.name().to_string();

        let mut plugins = self.plugins.lock().await;
        if plugins.contains_key(&name) {
            return Err(PluginError::AlreadyInstalled(name).into());
        }

        let dest = self.install_dir.join(&name);
        copy_dir(source, &dest)?;
        let installed = PluginBundle::load(&dest)?;
        plugins.insert(name.clone(), PluginRecord::new(installed));

        tracing::info!(plugin = %name, "plugin installed");
        Ok(name)
    }

    /// Install from a marketplace URL: download, verify the SHA-256
    /// digest, unpack, then install as a local bundle.
    pub async fn install_from_url(&self, url: &str, sha256: &str) -> crate::Result<String> {
        let staging = std::env::temp_dir().join(format!("overseer-plugin-{}", uuid::Uuid::new_v4()));
        let result = async {
            self.marketplace.fetch(url, sha256, &staging).await?;
            self.install_local(&staging).await
        }
        .await;
        let _ = std::fs::remove_dir_all(&staging);
        result
    }

    /// Remove a plugin entirely. An enabled plugin is disabled first.
    pub async fn uninstall(&self, name: &str) -> crate::Result<()> {
        self.disable_if_enabled(name).await?;

        let mut plugins = self.plugins.lock().await;
        let record = plugins
            .remove(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        if record.bundle.root_dir.starts_with(&self.install_dir) {
            let _ = std::fs::remove_dir_all(&record.bundle.root_dir);
        }
        tracing::info!(plugin = %name, "plugin uninstalled");
        Ok(())
    }

    /// Enable a plugin: dependency and conflict checks, then component
    /// registration. Dependencies are enabled first, in topological order;
    /// cycles are rejected.
    pub async fn enable(&self, name: &str) -> crate::Result<()> {
        let order = {
            let plugins = self.plugins.lock().await;
            enable_order(&plugins, name)?
        };

        for plugin in order {
            self.enable_one(&plugin).await?;
        }
        Ok(())
    }

    async fn enable_one(&self, name: &str) -> crate::Result<()> {
        let mut plugins = self.plugins.lock().await;
        let Some(record) = plugins.get(name) else {
            return Err(PluginError::NotFound(name.to_string()).into());
        };
        if record.state == PluginState::Enabled {
            return Ok(());
        }

        // Dependencies must be installed, enabled, and in range.
        for dep in &record.bundle.manifest.dependencies {
            let problem = match plugins.get(dep.name()) {
                None => Some("not installed".to_string()),
                Some(dep_record) if dep_record.state != PluginState::Enabled => {
                    Some("not enabled".to_string())
                }
                Some(dep_record) => {
                    let version = dep_record
                        .bundle
                        .manifest
                        .parsed_version()
                        .unwrap_or_else(|| Version::new(0, 0, 0));
                    if dep.accepts(&version) {
                        None
                    } else {
                        Some(format!("at version {} (outside the required range)", version))
                    }
                }
            };
            if let Some(problem) = problem {
                return Err(PluginError::MissingDependency {
                    name: name.to_string(),
                    dependency: dep.name().to_string(),
                    problem,
                }
                .into());
            }
        }

        let bundle = plugins.get(name).expect("checked above").bundle.clone();
        let loaded_skills = load_skills(&bundle).await;
        let loaded_agents = load_agents(&bundle).await;
        let rules = load_rules(&bundle);

        // Conflict check against other enabled plugins' contributions.
        for (other_name, other) in plugins.iter() {
            if other_name == name || other.state != PluginState::Enabled {
                continue;
            }
            for skill in &loaded_skills {
                if other.contributed_skills.iter().any(|s| s == &skill.name) {
                    return Err(PluginError::Conflict {
                        name: name.to_string(),
                        other: other_name.clone(),
                        component: format!("skill '{}'", skill.name),
                    }
                    .into());
                }
            }
            for agent in &loaded_agents {
                if other.contributed_agents.iter().any(|a| a == &agent.name) {
                    return Err(PluginError::Conflict {
                        name: name.to_string(),
                        other: other_name.clone(),
                        component: format!("agent '{}'", agent.name),
                    }
                    .into());
                }
            }
        }

        // Register, namespacing past non-plugin collisions.
        let mut contributed_skills = Vec::new();
        {
            let mut registry = self.skills.write().await;
            for mut skill in loaded_skills {
                let reg_name =
                    namespace::resolve_name(name, &skill.name, |n| registry.get(n).is_some());
                skill.name = reg_name.clone();
                registry.register(skill);
                contributed_skills.push(reg_name);
            }
        }
        let mut contributed_agents = Vec::new();
        {
            let mut registry = self.agents.write().await;
            for mut agent in loaded_agents {
                let reg_name =
                    namespace::resolve_name(name, &agent.name, |n| registry.get(n).is_some());
                agent.name = reg_name.clone();
                registry.register(agent);
                contributed_agents.push(reg_name);
            }
        }

        let record = plugins.get_mut(name).expect("checked above");
        record.state = PluginState::Enabled;
        record.contributed_skills = contributed_skills;
        record.contributed_agents = contributed_agents;
        record.rules = rules;

        tracing::info!(plugin = %name, "plugin enabled");
        Ok(())
    }

    /// Disable a plugin, removing its contributions from the registries.
    /// Refused while another enabled plugin depends on it.
    pub async fn disable(&self, name: &str) -> crate::Result<()> {
        let mut plugins = self.plugins.lock().await;
        let Some(record) = plugins.get(name) else {
            return Err(PluginError::NotFound(name.to_string()).into());
        };
        if record.state != PluginState::Enabled {
            return Ok(());
        }

        for (other_name, other) in plugins.iter() {
            if other_name != name
                && other.state == PluginState::Enabled
                && other
                    .bundle
                    .manifest
                    .dependencies
                    .iter()
                    .any(|d| d.name() == name)
            {
                return Err(PluginError::MissingDependency {
                    name: other_name.clone(),
                    dependency: name.to_string(),
                    problem: "about to be disabled".to_string(),
                }
                .into());
            }
        }

        let record = plugins.get_mut(name).expect("checked above");
        let skills_to_remove = std::mem::take(&mut record.contributed_skills);
        let agents_to_remove = std::mem::take(&mut record.contributed_agents);
        record.rules.clear();
        record.state = PluginState::Installed;
        drop(plugins);

        {
            let mut registry = self.skills.write().await;
            for skill in &skills_to_remove {
                registry.remove(skill);
            }
        }
        {
            let mut registry = self.agents.write().await;
            for agent in &agents_to_remove {
                registry.remove(agent);
            }
        }

        tracing::info!(plugin = %name, "plugin disabled");
        Ok(())
    }

    async fn disable_if_enabled(&self, name: &str) -> crate::Result<()> {
        let enabled = {
            let plugins = self.plugins.lock().await;
            plugins
                .get(name)
                .is_some_and(|r| r.state == PluginState::Enabled)
        };
        if enabled {
            self.disable(name).await?;
        }
        Ok(())
    }

    /// Reinstall from a source directory, preserving the enabled state.
    pub async fn update(&self, name: &str, source: &Path) -> crate::Result<()> {
        let was_enabled = {
            let plugins = self.plugins.lock().await;
            match plugins.get(name) {
                Some(record) => record.state == PluginState::Enabled,
                None => return Err(PluginError::NotFound(name.to_string()).into()),
            }
        };

        let bundle = PluginBundle::load(source)?;
        if bundle.name() != name {
            return Err(crate::Error::invalid(format!(
                "update source is plugin '{}', not '{}'",
                bundle.name(),
                name
            )));
        }

        self.uninstall(name).await?;
        self.install_local(source).await?;
        if was_enabled {
            self.enable(name).await?;
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<PluginInfo> {
        let plugins = self.plugins.lock().await;
        let mut infos: Vec<PluginInfo> = plugins.values().map(PluginRecord::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Case-insensitive substring search over names and descriptions.
    pub async fn search(&self, query: &str) -> Vec<PluginInfo> {
        let needle = query.to_lowercase();
        self.list()
            .await
            .into_iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub async fn info(&self, name: &str) -> crate::Result<PluginInfo> {
        let plugins = self.plugins.lock().await;
        plugins
            .get(name)
            .map(PluginRecord::info)
            .ok_or_else(|| PluginError::NotFound(name.to_string()).into())
    }

    /// Run an enabled plugin's rules. Each rule executes under its own
    /// timeout; a failing rule is reported, never propagated, so one
    /// misbehaving plugin cannot take others down.
    pub async fn run_rules(&self, name: &str) -> crate::Result<Vec<RuleOutcome>> {
        let rules = {
            let plugins = self.plugins.lock().await;
            let record = plugins
                .get(name)
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
            if record.state != PluginState::Enabled {
                return Err(crate::Error::invalid(format!(
                    "plugin '{}' is not enabled",
                    name
                )));
            }
            record.rules.clone()
        };

        let mut outcomes = Vec::with_capacity(rules.len());
        for rule in rules {
            outcomes.push(run_rule(&rule).await);
        }
        Ok(outcomes)
    }
}

impl PluginRecord {
    fn new(bundle: PluginBundle) -> Self {
        Self {
            bundle,
            state: PluginState::Installed,
            contributed_skills: Vec::new(),
            contributed_agents: Vec::new(),
            rules: Vec::new(),
        }
    }

    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.bundle.name().to_string(),
            version: self.bundle.manifest.version.clone(),
            description: self.bundle.manifest.description.clone(),
            state: self.state,
            dependencies: self
                .bundle
                .manifest
                .dependencies
                .iter()
                .map(|d| d.0.clone())
                .collect(),
            skills: self.contributed_skills.clone(),
            agents: self.contributed_agents.clone(),
            rules: self.rules.iter().map(|r| r.name.clone()).collect(),
        }
    }
}

/// Topological enable order for `name` and its transitive dependencies.
fn enable_order(
    plugins: &HashMap<String, PluginRecord>,
    name: &str,
) -> crate::Result<Vec<String>> {
    let mut order = Vec::new();
    let mut visiting = Vec::new();
    visit(plugins, name, &mut order, &mut visiting)?;
    Ok(order)
}

fn visit(
    plugins: &HashMap<String, PluginRecord>,
    name: &str,
    order: &mut Vec<String>,
    visiting: &mut Vec<String>,
) -> crate::Result<()> {
    if order.iter().any(|n| n == name) {
        return Ok(());
    }
    if visiting.iter().any(|n| n == name) {
        return Err(PluginError::DependencyCycle(name.to_string()).into());
    }

    let Some(record) = plugins.get(name) else {
        // Missing dependencies surface as MissingDependency during
        // enable_one, with the dependent's name attached.
        return Ok(());
    };

    visiting.push(name.to_string());
    for dep in &record.bundle.manifest.dependencies {
        visit(plugins, dep.name(), order, visiting)?;
    }
    visiting.pop();
    order.push(name.to_string());
    Ok(())
}

async fn load_skills(bundle: &PluginBundle) -> Vec<crate::skills::SkillIndex> {
    let dir = bundle.skills_dir();
    if !dir.is_dir() {
        return Vec::new();
    }
    SkillLoader::new()
        .load_directory(&dir)
        .await
        .unwrap_or_default()
}

async fn load_agents(bundle: &PluginBundle) -> Vec<crate::agents::AgentIndex> {
    let dir = bundle.agents_dir();
    if !dir.is_dir() {
        return Vec::new();
    }
    AgentLoader::new()
        .load_directory(&dir)
        .await
        .unwrap_or_default()
}

fn load_rules(bundle: &PluginBundle) -> Vec<PluginRule> {
    let path = bundle.rules_file();
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(rules) => rules,
        Err(e) => {
            tracing::warn!("ignoring malformed rules at {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

async fn run_rule(rule: &PluginRule) -> RuleOutcome {
    let command = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&rule.command)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(Duration::from_secs(rule.timeout_secs), command).await {
        Ok(Ok(output)) if output.status.success() => RuleOutcome {
            rule: rule.name.clone(),
            ok: true,
            detail: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        },
        Ok(Ok(output)) => RuleOutcome {
            rule: rule.name.clone(),
            ok: false,
            detail: format!(
                "exit {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        },
        Ok(Err(e)) => RuleOutcome {
            rule: rule.name.clone(),
            ok: false,
            detail: e.to_string(),
        },
        Err(_) => RuleOutcome {
            rule: rule.name.clone(),
            ok: false,
            detail: format!("timed out after {}s", rule.timeout_secs),
        },
    }
}

fn copy_dir(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_plugin(parent: &Path, name: &str, deps: &[&str]) -> PathBuf {
        let dir = parent.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let deps_json: Vec<String> = deps.iter().map(|d| format!("\"{}\"", d)).collect();
        std::fs::write(
            dir.join("plugin.json"),
            format!(
                r#"{{"name":"{}","version":"1.0.0","description":"{} plugin","dependencies":[{}]}}"#,
                name,
                name,
                deps_json.join(",")
            ),
        )
        .unwrap();

        let skills = dir.join("skills");
        std::fs::create_dir_all(&skills).unwrap();
        std::fs::write(
            skills.join(format!("{}.skill.md", name)),
            format!("---\nname: {}-skill\ndescription: Skill from {}\n---\nBody", name, name),
        )
        .unwrap();
        dir
    }

    fn manager(install_dir: &Path) -> PluginManager {
        PluginManager::new(
            install_dir.to_path_buf(),
            Arc::new(RwLock::new(SkillRegistry::new())),
            Arc::new(RwLock::new(AgentRegistry::new())),
        )
    }

    #[tokio::test]
    async fn test_install_enable_disable_roundtrip() {
        let source = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        let plugin_dir = write_plugin(source.path(), "sql-pack", &[]);

        let manager = manager(install.path());
        manager.install_local(&plugin_dir).await.unwrap();
        manager.enable("sql-pack").await.unwrap();

        // The skill landed in the registry.
        assert!(
            manager
                .skills
                .read()
                .await
                .get("sql-pack-skill")
                .is_some()
        );

        // Disable restores the pre-enable snapshot.
        manager.disable("sql-pack").await.unwrap();
        assert!(manager.skills.read().await.is_empty());

        let info = manager.info("sql-pack").await.unwrap();
        assert_eq!(info.state, PluginState::Installed);
    }

    #[tokio::test]
    async fn test_double_install_rejected() {
        let source = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        let plugin_dir = write_plugin(source.path(), "once", &[]);

        let manager = manager(install.path());
        manager.install_local(&plugin_dir).await.unwrap();
        let err = manager.install_local(&plugin_dir).await.unwrap_err();
        assert_eq!(err.code(), "already_exists");
    }

    #[tokio::test]
    async fn test_dependency_order_on_enable() {
        let source = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        let base = write_plugin(source.path(), "base", &[]);
        let derived = write_plugin(source.path(), "derived", &["base"]);

        let manager = manager(install.path());
        manager.install_local(&base).await.unwrap();
        manager.install_local(&derived).await.unwrap();

        // Enabling the dependent pulls the dependency in first.
        manager.enable("derived").await.unwrap();
        assert_eq!(
            manager.info("base").await.unwrap().state,
            PluginState::Enabled
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_rejected() {
        let source = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        let dir = write_plugin(source.path(), "orphan", &["ghost"]);

        let manager = manager(install.path());
        manager.install_local(&dir).await.unwrap();
        let err = manager.enable("orphan").await.unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_disable_refused_while_depended_on() {
        let source = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        manager(install.path());

        let base = write_plugin(source.path(), "base", &[]);
        let derived = write_plugin(source.path(), "derived", &["base"]);

        let manager = manager(install.path());
        manager.install_local(&base).await.unwrap();
        manager.install_local(&derived).await.unwrap();
        manager.enable("derived").await.unwrap();

        assert!(manager.disable("base").await.is_err());
        manager.disable("derived").await.unwrap();
        manager.disable("base").await.unwrap();
    }

    #[tokio::test]
    async fn test_namespace_on_builtin_collision() {
        let source = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        let plugin_dir = write_plugin(source.path(), "pack", &[]);

        let manager = manager(install.path());
        // A non-plugin skill already owns the bare name.
        manager
            .skills
            .write()
            .await
            .register(crate::skills::SkillIndex::new(
                "pack-skill",
                "Pre-existing",
                "body",
            ));

        manager.install_local(&plugin_dir).await.unwrap();
        manager.enable("pack").await.unwrap();

        let skills = manager.skills.read().await;
        assert!(skills.get("pack-skill").is_some());
        assert!(skills.get("pack:pack-skill").is_some());
    }

    #[tokio::test]
    async fn test_search() {
        let source = tempfile::tempdir().unwrap();
        let install = tempfile::tempdir().unwrap();
        let dir = write_plugin(source.path(), "sql-tools", &[]);

        let manager = manager(install.path());
        manager.install_local(&dir).await.unwrap();

        assert_eq!(manager.search("sql").await.len(), 1);
        assert!(manager.search("terraform").await.is_empty());
    }
}
