//! Plugin-specific error type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{0}' not found")]
    NotFound(String),

    #[error("plugin '{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("invalid plugin manifest at {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("plugin name '{name}' is invalid: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("plugin '{name}' conflicts with '{other}': both contribute {component}")]
    Conflict {
        name: String,
        other: String,
        component: String,
    },

    #[error("plugin '{name}' requires '{dependency}', which is {problem}")]
    MissingDependency {
        name: String,
        dependency: String,
        problem: String,
    },

    #[error("plugin dependency graph contains a cycle involving '{0}'")]
    DependencyCycle(String),

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PluginError> for crate::Error {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::NotFound(name) => crate::Error::not_found(format!("plugin '{}'", name)),
            PluginError::AlreadyInstalled(name) => {
                crate::Error::AlreadyExists(format!("plugin '{}'", name))
            }
            PluginError::Conflict { .. } => crate::Error::Conflict(err.to_string()),
            PluginError::MissingDependency { .. } | PluginError::DependencyCycle(_) => {
                crate::Error::Conflict(err.to_string())
            }
            PluginError::InvalidManifest { .. } | PluginError::InvalidName { .. } => {
                crate::Error::Invalid(err.to_string())
            }
            PluginError::ChecksumMismatch { .. } => crate::Error::Invalid(err.to_string()),
            PluginError::Download { .. } => crate::Error::External(err.to_string()),
            PluginError::Io(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err: crate::Error = PluginError::NotFound("x".into()).into();
        assert_eq!(err.code(), "not_found");

        let err: crate::Error = PluginError::Conflict {
            name: "a".into(),
            other: "b".into(),
            component: "skill 'c'".into(),
        }
        .into();
        assert_eq!(err.code(), "conflict");

        let err: crate::Error = PluginError::ChecksumMismatch {
            url: "http://x".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .into();
        assert_eq!(err.code(), "invalid");
    }
}
