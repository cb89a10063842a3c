//! Spec workspace: the project-local directory tree of proposals, tasks,
//! specs, and derived state.
//!
//! ```text
//! <project>/<spec-dir>/
//!   project.yaml
//!   changes/<id>/  proposal.md tasks.md design.md state.md specs/
//!   specs/<name>/spec.md
//!   tasks/<id>.md
//!   archive/       archived changes
//!   state.md       aggregate projection
//!   registry.db    embedded store (generated, gitignored)
//! ```
//!
//! Proposal markdown beyond frontmatter is an opaque collaborator behind
//! the [`SpecIo`] seam; this module only moves artifacts around.

mod project;

pub use project::ProjectManifest;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const PROJECT_FILE: &str = "project.yaml";

/// Artifact kinds addressable by `spec_list` / `spec_show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Spec,
    Change,
    Task,
}

impl FromStr for ArtifactKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "spec" => Ok(ArtifactKind::Spec),
            "change" => Ok(ArtifactKind::Change),
            "task" => Ok(ArtifactKind::Task),
            other => Err(crate::Error::invalid(format!(
                "unknown artifact type '{}'",
                other
            ))),
        }
    }
}

/// Options accepted by `spec_init`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub name: Option<String>,
    pub module: Option<String>,
    pub description: Option<String>,
    pub conventions: std::collections::BTreeMap<String, String>,
}

/// Opaque proposal-parsing collaborator. The core never interprets
/// proposal markdown itself.
pub trait SpecIo: Send + Sync {
    fn parse_proposal(&self, markdown: &str) -> crate::Result<serde_json::Value>;
}

/// Default collaborator: hands the raw markdown back untouched.
pub struct PassthroughSpecIo;

impl SpecIo for PassthroughSpecIo {
    fn parse_proposal(&self, markdown: &str) -> crate::Result<serde_json::Value> {
        Ok(serde_json::json!({ "raw": markdown }))
    }
}

/// Filesystem owner of the spec directory tree.
pub struct SpecWorkspace {
    root: PathBuf,
}

impl SpecWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_initialized(&self) -> bool {
        self.root.join(PROJECT_FILE).is_file()
    }

    /// Create the directory tree and `project.yaml`. Idempotent: re-running
    /// against an initialized workspace changes nothing and reports so.
    pub async fn init(&self, options: InitOptions) -> crate::Result<bool> {
        if self.is_initialized() {
            return Ok(false);
        }

        for dir in ["changes", "specs", "tasks", "archive"] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }

        let name = options.name.unwrap_or_else(|| {
            self.root
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string())
        });
        let manifest = ProjectManifest {
            name,
            module: options.module,
            description: options.description,
            conventions: options.conventions,
        };
        tokio::fs::write(self.root.join(PROJECT_FILE), manifest.to_yaml()?).await?;

        // The registry database is generated state, not source.
        tokio::fs::write(self.root.join(".gitignore"), "registry.db\nregistry.db-*\n").await?;

        Ok(true)
    }

    pub async fn manifest(&self) -> crate::Result<ProjectManifest> {
        let raw = tokio::fs::read_to_string(self.root.join(PROJECT_FILE))
            .await
            .map_err(|_| crate::Error::not_found("project.yaml (workspace not initialized)"))?;
        ProjectManifest::from_yaml(&raw)
    }

    /// Enumerate artifact ids of one kind.
    pub async fn list(&self, kind: ArtifactKind) -> crate::Result<Vec<String>> {
        let dir = match kind {
            ArtifactKind::Spec => self.root.join("specs"),
            ArtifactKind::Change => self.root.join("changes"),
            ArtifactKind::Task => self.root.join("tasks"),
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| crate::Error::external(format!("listing {}: {}", dir.display(), e)))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            match kind {
                ArtifactKind::Task => {
                    if let Some(stem) = name.strip_suffix(".md") {
                        ids.push(stem.to_string());
                    }
                }
                _ => {
                    if entry.path().is_dir() {
                        ids.push(name);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Read the markdown content of one artifact.
    pub async fn show(&self, kind: ArtifactKind, id: &str) -> crate::Result<String> {
        validate_artifact_id(id)?;
        let path = match kind {
            ArtifactKind::Spec => self.root.join("specs").join(id).join("spec.md"),
            ArtifactKind::Change => self.root.join("changes").join(id).join("proposal.md"),
            ArtifactKind::Task => self.root.join("tasks").join(format!("{}.md", id)),
        };
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| crate::Error::not_found(format!("{:?} '{}'", kind, id)))
    }

    pub fn change_dir(&self, change_id: &str) -> PathBuf {
        self.root.join("changes").join(change_id)
    }

    pub fn tasks_md_path(&self, change_id: &str) -> PathBuf {
        self.change_dir(change_id).join("tasks.md")
    }

    pub async fn read_tasks_md(&self, change_id: &str) -> crate::Result<String> {
        tokio::fs::read_to_string(self.tasks_md_path(change_id))
            .await
            .map_err(|_| {
                crate::Error::not_found(format!("tasks.md for change '{}'", change_id))
            })
    }

    /// Write a change's state projection. The projector is the only caller.
    pub async fn write_change_state(&self, change_id: &str, content: &str) -> crate::Result<()> {
        let dir = self.change_dir(change_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("state.md"), content).await?;
        Ok(())
    }

    /// Write the aggregate root state projection.
    pub async fn write_root_state(&self, content: &str) -> crate::Result<()> {
        tokio::fs::write(self.root.join("state.md"), content).await?;
        Ok(())
    }

    /// Move a change directory into the archive namespace.
    pub async fn archive_change(&self, change_id: &str) -> crate::Result<()> {
        validate_artifact_id(change_id)?;
        let source = self.change_dir(change_id);
        if !source.is_dir() {
            return Err(crate::Error::not_found(format!("change '{}'", change_id)));
        }
        let dest = self.root.join("archive").join(change_id);
        if dest.exists() {
            return Err(crate::Error::AlreadyExists(format!(
                "archived change '{}'",
                change_id
            )));
        }
        tokio::fs::rename(&source, &dest).await?;
        Ok(())
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }
}

/// Artifact ids become path segments; refuse anything that could traverse.
fn validate_artifact_id(id: &str) -> crate::Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !id.starts_with('.')
        && !id.contains("..");
    if ok {
        Ok(())
    } else {
        Err(crate::Error::invalid(format!(
            "artifact id '{}' contains invalid characters",
            id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn initialized() -> (tempfile::TempDir, SpecWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = SpecWorkspace::new(dir.path().join(".overseer"));
        workspace.init(InitOptions::default()).await.unwrap();
        (dir, workspace)
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (_guard, workspace) = initialized().await;
        assert!(workspace.is_initialized());

        // Second init reports already-initialized and changes nothing.
        let manifest_before = workspace.manifest().await.unwrap();
        let created = workspace
            .init(InitOptions {
                name: Some("other-name".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(workspace.manifest().await.unwrap(), manifest_before);
    }

    #[tokio::test]
    async fn test_init_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = SpecWorkspace::new(dir.path().join(".overseer"));
        workspace
            .init(InitOptions {
                name: Some("billing".to_string()),
                module: Some("acme/billing".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let manifest = workspace.manifest().await.unwrap();
        assert_eq!(manifest.name, "billing");
        assert_eq!(manifest.module.as_deref(), Some("acme/billing"));
    }

    #[tokio::test]
    async fn test_list_and_show() {
        let (_guard, workspace) = initialized().await;

        let change = workspace.change_dir("add-auth");
        tokio::fs::create_dir_all(&change).await.unwrap();
        tokio::fs::write(change.join("proposal.md"), "# Add auth\n")
            .await
            .unwrap();

        let changes = workspace.list(ArtifactKind::Change).await.unwrap();
        assert_eq!(changes, vec!["add-auth"]);

        let content = workspace
            .show(ArtifactKind::Change, "add-auth")
            .await
            .unwrap();
        assert!(content.contains("# Add auth"));

        assert!(
            workspace
                .show(ArtifactKind::Change, "missing")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_archive_moves_directory() {
        let (_guard, workspace) = initialized().await;
        let change = workspace.change_dir("old-work");
        tokio::fs::create_dir_all(&change).await.unwrap();
        tokio::fs::write(change.join("proposal.md"), "done\n")
            .await
            .unwrap();

        workspace.archive_change("old-work").await.unwrap();
        assert!(!change.exists());
        assert!(workspace.root().join("archive/old-work/proposal.md").exists());

        // Archiving again: the live directory is gone.
        assert!(workspace.archive_change("old-work").await.is_err());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_guard, workspace) = initialized().await;
        assert!(
            workspace
                .show(ArtifactKind::Change, "../../etc/passwd")
                .await
                .is_err()
        );
        assert!(workspace.archive_change("..").await.is_err());
    }

    #[tokio::test]
    async fn test_state_writes() {
        let (_guard, workspace) = initialized().await;
        workspace
            .write_change_state("c1", "# State: c1\n")
            .await
            .unwrap();
        workspace.write_root_state("# Project state\n").await.unwrap();

        assert!(workspace.change_dir("c1").join("state.md").exists());
        assert!(workspace.root().join("state.md").exists());
    }
}
