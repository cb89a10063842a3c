//! Plugin manifest parsing and validation.
//!
//! A plugin bundle is a directory with a `plugin.json` manifest at its root
//! and optional `skills/`, `agents/`, and `rules/` component directories.

use std::path::{Path, PathBuf};

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use super::error::PluginError;

pub const MANIFEST_FILE: &str = "plugin.json";

/// A dependency on another plugin, optionally version-constrained
/// (`other-plugin` or `other-plugin@>=1.2`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySpec(pub String);

impl DependencySpec {
    pub fn name(&self) -> &str {
        match self.0.split_once('@') {
            Some((name, _)) => name,
            None => &self.0,
        }
    }

    pub fn version_req(&self) -> Option<VersionReq> {
        self.0
            .split_once('@')
            .and_then(|(_, req)| VersionReq::parse(req).ok())
    }

    /// Whether the given installed version satisfies this spec.
    pub fn accepts(&self, version: &Version) -> bool {
        match self.version_req() {
            Some(req) => req.matches(version),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

impl PluginManifest {
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }

    fn validate(&self, path: &Path) -> Result<(), PluginError> {
        if self.name.is_empty() {
            return Err(PluginError::InvalidManifest {
                path: path.to_path_buf(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.name.contains(super::namespace::NAMESPACE_SEP) {
            return Err(PluginError::InvalidName {
                name: self.name.clone(),
                reason: format!(
                    "must not contain the namespace separator '{}'",
                    super::namespace::NAMESPACE_SEP
                ),
            });
        }
        if Version::parse(&self.version).is_err() {
            return Err(PluginError::InvalidManifest {
                path: path.to_path_buf(),
                reason: format!("version '{}' is not valid semver", self.version),
            });
        }
        Ok(())
    }
}

/// A validated plugin on disk.
#[derive(Debug, Clone)]
pub struct PluginBundle {
    pub manifest: PluginManifest,
    pub root_dir: PathBuf,
}

impl PluginBundle {
    /// Read and validate the manifest under `root_dir`.
    pub fn load(root_dir: &Path) -> Result<Self, PluginError> {
        let manifest_path = root_dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
            PluginError::InvalidManifest {
                path: manifest_path.clone(),
                reason: format!("cannot read manifest: {}", e),
            }
        })?;
        let manifest: PluginManifest =
            serde_json::from_str(&raw).map_err(|e| PluginError::InvalidManifest {
                path: manifest_path.clone(),
                reason: e.to_string(),
            })?;
        manifest.validate(&manifest_path)?;

        Ok(Self {
            manifest,
            root_dir: root_dir.to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root_dir.join("skills")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root_dir.join("agents")
    }

    pub fn rules_file(&self) -> PathBuf {
        self.root_dir.join("rules").join("rules.json")
    }
}

/// A rule contributed by a plugin: a shell command run on lifecycle events,
/// sandboxed behind a timeout so one failing plugin never affects others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRule {
    pub name: String,
    pub command: String,
    #[serde(default = "default_rule_timeout")]
    pub timeout_secs: u64,
}

fn default_rule_timeout() -> u64 {
    30
}
