// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Registry configuration.
//
// Loaded from `hbox.json` in the data directory when present. Every field is
// optional in the file; relative paths resolve against the data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};

/// File name looked up inside the data directory.
pub const CONFIG_FILE: &str = "hbox.json";

/// Where a transport reads the authentication envelope from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthSource {
    /// `x-device-auth` header, base64 JSON.
    #[default]
    Header,
    /// `deviceAuth` field of a JSON body.
    Body,
    /// `deviceAuth` query parameter, base64 JSON.
    Query,
}

/// Settings for one authenticator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How long a challenge stays reusable after its first use.
    pub expires_in_secs: u64,
    pub source: AuthSource,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            expires_in_secs: 120,
            source: AuthSource::Header,
        }
    }
}

/// Limits applied to uploaded firmware images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    /// Maximum image size in bytes.
    pub max_file_size: u64,
    /// Accepted file extensions including the dot, compared case-insensitively.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            allowed_extensions: vec![".zip".into()],
        }
    }
}

impl UploadPolicy {
    /// Whether `file_name` ends in one of the allowed extensions.
    pub fn allows_name(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

/// Persistent registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root for every relative path below. Never read from the file.
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Managed directory holding firmware images.
    pub upload_dir: Option<PathBuf>,
    /// Firmware catalog document.
    pub firmware_file: Option<PathBuf>,
    /// Device registry document.
    pub device_file: Option<PathBuf>,
    /// SQLite audit trail.
    pub audit_file: Option<PathBuf>,
    /// Public base URL used to build download links.
    pub server_url: String,
    pub auth: AuthConfig,
    pub upload: UploadPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            upload_dir: None,
            firmware_file: None,
            device_file: None,
            audit_file: None,
            server_url: "http://localhost:3000".into(),
            auth: AuthConfig::default(),
            upload: UploadPolicy::default(),
        }
    }
}

impl RegistryConfig {
    /// Defaults rooted at `data_dir`.
    pub fn rooted_at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load settings for `data_dir`.
    ///
    /// `file` overrides the default `<data_dir>/hbox.json`. A missing default
    /// file yields defaults; a missing explicit file is an error.
    pub fn load(data_dir: impl Into<PathBuf>, file: Option<&Path>) -> Result<Self> {
        let data_dir = data_dir.into();
        let path = match file {
            Some(path) => path.to_path_buf(),
            None => {
                let path = data_dir.join(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::rooted_at(data_dir));
                }
                path
            }
        };

        let text = std::fs::read_to_string(&path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        config.data_dir = data_dir;
        config.validate()?;
        Ok(config)
    }

    /// Write the settings to `<data_dir>/hbox.json`.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.data_dir.join(CONFIG_FILE), json)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.auth.expires_in_secs == 0 {
            return Err(TrustError::InvalidRequest(
                "auth.expires_in_secs must be positive".into(),
            ));
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(TrustError::InvalidRequest(
                "upload.allowed_extensions must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn resolve(&self, configured: &Option<PathBuf>, default: &str) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.data_dir.join(path),
            None => self.data_dir.join(default),
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.resolve(&self.upload_dir, "uploads")
    }

    pub fn firmware_file(&self) -> PathBuf {
        self.resolve(&self.firmware_file, "firmware_list.json")
    }

    pub fn device_file(&self) -> PathBuf {
        self.resolve(&self.device_file, "device_ids.json")
    }

    pub fn audit_file(&self) -> PathBuf {
        self.resolve(&self.audit_file, "audit.db")
    }
}
