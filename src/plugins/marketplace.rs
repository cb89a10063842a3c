//! Marketplace fetch: download a plugin bundle archive, verify its
//! checksum, and unpack it.
//!
//! Bundles are gzipped tarballs whose top level contains `plugin.json`.
//! The expected SHA-256 digest accompanies the URL; a mismatch aborts
//! before anything is unpacked.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::PluginError;

pub struct Marketplace {
    client: reqwest::Client,
}

impl Marketplace {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Download, verify, and unpack a bundle into `dest_dir`. Returns the
    /// unpacked bundle root.
    pub async fn fetch(
        &self,
        url: &str,
        expected_sha256: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, PluginError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PluginError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .bytes()
            .await
            .map_err(|e| PluginError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        verify_checksum(url, &bytes, expected_sha256)?;
        unpack(&bytes, dest_dir)?;
        Ok(dest_dir.to_path_buf())
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn verify_checksum(
    url: &str,
    bytes: &[u8],
    expected: &str,
) -> Result<(), PluginError> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let actual = format!("{:x}", hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(PluginError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

pub(crate) fn unpack(bytes: &[u8], dest_dir: &Path) -> Result<(), PluginError> {
    std::fs::create_dir_all(dest_dir)?;
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);

    // Refuse entries that would escape the destination.
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(PluginError::InvalidManifest {
                path: dest_dir.to_path_buf(),
                reason: format!("archive entry '{}' escapes the bundle", path.display()),
            });
        }
        entry.unpack_in(dest_dir)?;
    }
    Ok(())
}
