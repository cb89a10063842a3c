//! Plugin discovery: scan directories for installed bundles.

use std::path::PathBuf;

use super::error::PluginError;
use super::manifest::{MANIFEST_FILE, PluginBundle};

pub struct PluginDiscovery;

impl PluginDiscovery {
    /// Scan each directory for immediate subdirectories carrying a
    /// manifest. Bundles that fail to validate are skipped with a warning;
    /// duplicate names across directories are an error.
    pub fn discover(dirs: &[PathBuf]) -> Result<Vec<PluginBundle>, PluginError> {
        let mut bundles: Vec<PluginBundle> = Vec::new();

        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() || !path.join(MANIFEST_FILE).is_file() {
                    continue;
                }
                match PluginBundle::load(&path) {
                    Ok(bundle) => {
                        if let Some(existing) =
                            bundles.iter().find(|b| b.name() == bundle.name())
                        {
                            return Err(PluginError::Conflict {
                                name: bundle.name().to_string(),
                                other: existing.root_dir.display().to_string(),
                                component: "the plugin name".to_string(),
                            });
                        }
                        bundles.push(bundle);
                    }
                    Err(e) => {
                        tracing::warn!("skipping invalid plugin at {}: {}", path.display(), e);
                    }
                }
            }
        }

        bundles.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(bundles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_plugin(parent: &std::path::Path, name: &str) {
        let dir = parent.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(r#"{{"name":"{}","version":"1.0.0"}}"#, name),
        )
        .unwrap();
    }

    #[test]
    fn test_discover_sorted() {
        let dir = tempfile::tempdir().unwrap();
        create_plugin(dir.path(), "zeta");
        create_plugin(dir.path(), "alpha");

        let bundles = PluginDiscovery::discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].name(), "alpha");
    }

    #[test]
    fn test_duplicate_names_conflict() {
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        create_plugin(dir1.path(), "same");
        create_plugin(dir2.path(), "same");

        let result = PluginDiscovery::discover(&[
            dir1.path().to_path_buf(),
            dir2.path().to_path_buf(),
        ]);
        assert!(matches!(result, Err(PluginError::Conflict { .. })));
    }

    #[test]
    fn test_invalid_bundle_skipped() {
        let dir = tempfile::tempdir().unwrap();
        create_plugin(dir.path(), "good");

        let bad = dir.path().join("bad");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join(MANIFEST_FILE), "{not json").unwrap();

        let bundles = PluginDiscovery::discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].name(), "good");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let bundles =
            PluginDiscovery::discover(&[PathBuf::from("/nonexistent/plugins")]).unwrap();
        assert!(bundles.is_empty());
    }
}
