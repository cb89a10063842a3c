//! Project manifest (`project.yaml`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form convention entries surfaced to planning agents.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conventions: BTreeMap<String, String>,
}

impl ProjectManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn to_yaml(&self) -> crate::Result<String> {
        Ok(serde_yaml_bw::to_string(self)?)
    }

    pub fn from_yaml(raw: &str) -> crate::Result<Self> {
        Ok(serde_yaml_bw::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_roundtrip() {
        let mut manifest = ProjectManifest::new("billing");
        manifest.module = Some("github.com/acme/billing".to_string());
        manifest
            .conventions
            .insert("commit-style".to_string(), "conventional".to_string());

        let yaml = manifest.to_yaml().unwrap();
        let parsed = ProjectManifest::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_minimal_yaml() {
        let parsed = ProjectManifest::from_yaml("name: tiny\n").unwrap();
        assert_eq!(parsed.name, "tiny");
        assert!(parsed.module.is_none());
        assert!(parsed.conventions.is_empty());
    }
}
