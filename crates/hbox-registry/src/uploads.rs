// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Staging of uploaded firmware images into the managed upload directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use hbox_core::config::{RegistryConfig, UploadPolicy};
use hbox_core::error::{Result, TrustError};
use hbox_core::types::{FirmwareId, SlotImage};
use hbox_security::integrity;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Accepts image payloads, checks them against the upload policy and writes
/// them under a unique name.
pub struct UploadStager {
    upload_dir: PathBuf,
    policy: UploadPolicy,
    server_url: String,
}

impl UploadStager {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        policy: UploadPolicy,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            policy,
            server_url: server_url.into(),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(
            config.upload_dir(),
            config.upload.clone(),
            config.server_url.clone(),
        )
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Store `bytes` as a new image named after `original_name`.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn stage(&self, original_name: &str, bytes: &[u8]) -> Result<SlotImage> {
        let original_name = base_name(original_name);
        if original_name.is_empty() || !self.policy.allows_name(original_name) {
            return Err(TrustError::InvalidArtifact(format!(
                "{original_name:?}: only {} files are accepted",
                self.policy.allowed_extensions.join(", ")
            )));
        }
        self.check_size(bytes.len() as u64)?;

        let stored_name = format!("{}-{}", FirmwareId::generate(), sanitise(original_name));
        let path = self.upload_dir.join(&stored_name);
        self.write_atomic(&path, bytes)?;

        info!(%stored_name, "firmware image staged");
        Ok(SlotImage {
            file_path: path.to_string_lossy().into_owned(),
            original_name: original_name.to_owned(),
            file_size: bytes.len() as u64,
            sha256: Some(integrity::hash_bytes(bytes)),
            download_url: Some(format!(
                "{}/downloads/{stored_name}",
                self.server_url.trim_end_matches('/')
            )),
        })
    }

    /// Stage the contents of a local file.
    pub fn stage_file(&self, source: impl AsRef<Path>) -> Result<SlotImage> {
        let source = source.as_ref();
        self.check_size(fs::metadata(source)?.len())?;
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TrustError::InvalidArtifact(format!("{} has no file name", source.display()))
            })?;
        self.stage(name, &fs::read(source)?)
    }

    /// Remove an image staged by this stager that ended up unused.
    pub fn discard(&self, image: &SlotImage) -> Result<()> {
        let name = Path::new(&image.file_path)
            .file_name()
            .ok_or_else(|| TrustError::InvalidArtifact(image.file_path.clone()))?;
        fs::remove_file(self.upload_dir.join(name))?;
        debug!(file = %image.file_path, "staged image discarded");
        Ok(())
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.policy.max_file_size {
            return Err(TrustError::InvalidArtifact(format!(
                "image is {size} bytes, limit is {}",
                self.policy.max_file_size
            )));
        }
        Ok(())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.upload_dir)?;
        let mut tmp = NamedTempFile::new_in(&self.upload_dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(path).map_err(|e| TrustError::Io(e.error))?;
        Ok(())
    }
}

/// Final path component of a client-supplied name.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name).trim()
}

fn sanitise(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
