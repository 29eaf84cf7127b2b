// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Firmware catalog — versioned A/B firmware entries plus their image files.
//
// Stored as `firmware_list.json`: `{ "firmwares": [...], "lastUpdate": ... }`.
//
// Removal is two-phase: the catalog is rewritten first, and only once that
// succeeded are the slot files deleted, each independently. A file that
// cannot be removed is reported in a `CleanupReport` and never rolls back
// the catalog.

use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use hbox_core::error::{Result, TrustError};
use hbox_core::types::{
    ArtifactSummary, FirmwareArtifact, FirmwareId, FirmwarePatch, NewFirmware, Slot, SlotImage,
};
use hbox_security::integrity;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::store::{Change, Document, SnapshotFile};
use crate::version::{Version, compare_versions};

// ---------------------------------------------------------------------------
// Persisted document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareDocument {
    #[serde(default)]
    pub firmwares: Vec<FirmwareArtifact>,
    pub last_update: DateTime<Utc>,
}

impl Document for FirmwareDocument {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            firmwares: Vec::new(),
            last_update: now,
        }
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_update = now;
    }
}

// ---------------------------------------------------------------------------
// Removal reporting
// ---------------------------------------------------------------------------

/// A slot file that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// What happened to the slot files of removed entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Already gone before we got to them.
    pub missing: Vec<PathBuf>,
    pub failures: Vec<FileFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// `false` if no entry had the requested id.
    pub deleted: bool,
    pub cleanup: CleanupReport,
}

/// Result of a version-bounded bulk removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eviction {
    pub deleted_count: usize,
    #[serde(rename = "deletedFirmwares")]
    pub deleted: Vec<ArtifactSummary>,
    pub cleanup: CleanupReport,
}

// ---------------------------------------------------------------------------
// FirmwareRegistry
// ---------------------------------------------------------------------------

/// Durable firmware catalog owning one upload directory.
pub struct FirmwareRegistry {
    store: SnapshotFile<FirmwareDocument>,
    upload_dir: PathBuf,
}

impl FirmwareRegistry {
    /// Open the catalog at `catalog` whose images live in `upload_dir`.
    ///
    /// The upload directory is created if it does not exist.
    pub fn open(catalog: impl AsRef<Path>, upload_dir: impl Into<PathBuf>) -> Result<Self> {
        let upload_dir = upload_dir.into();
        std::fs::create_dir_all(&upload_dir).map_err(|e| {
            TrustError::PersistenceFailed(format!("{}: {e}", upload_dir.display()))
        })?;

        let registry = Self {
            store: SnapshotFile::open(catalog)?,
            upload_dir,
        };
        debug!(
            entries = registry.len(),
            upload_dir = %registry.upload_dir.display(),
            "firmware catalog opened"
        );
        Ok(registry)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    // -- Queries -------------------------------------------------------------

    pub fn find_by_id(&self, id: &FirmwareId) -> Option<FirmwareArtifact> {
        self.store
            .read(|doc| doc.firmwares.iter().find(|fw| &fw.id == id).cloned())
    }

    /// All entries in insertion order.
    pub fn list(&self) -> Vec<FirmwareArtifact> {
        self.store.read(|doc| doc.firmwares.clone())
    }

    pub fn len(&self) -> usize {
        self.store.read(|doc| doc.firmwares.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest entry whose version is strictly greater than `current`.
    ///
    /// Entries with malformed versions are ignored. Among equal versions the
    /// most recently created entry wins.
    pub fn latest_newer_than(&self, current: &str) -> Result<Option<FirmwareArtifact>> {
        let current: Version = current.parse()?;
        Ok(self.store.read(|doc| {
            doc.firmwares
                .iter()
                .filter_map(|fw| fw.version.parse::<Version>().ok().map(|v| (v, fw)))
                .filter(|(v, _)| *v > current)
                .max_by(|(va, a), (vb, b)| va.cmp(vb).then(a.create_time.cmp(&b.create_time)))
                .map(|(_, fw)| fw.clone())
        }))
    }

    /// Absolute location of a slot image inside the upload directory.
    pub fn slot_file(&self, image: &SlotImage) -> Result<PathBuf> {
        Ok(self.upload_dir.join(self.managed_file_name(&image.file_path)?))
    }

    /// Re-hash a slot image and compare it to the recorded SHA-256.
    #[instrument(skip(self), fields(%id, %slot))]
    pub fn verify_slot(&self, id: &FirmwareId, slot: Slot) -> Result<()> {
        let firmware = self
            .find_by_id(id)
            .ok_or_else(|| TrustError::NotFound(format!("firmware {id}")))?;
        let image = firmware
            .slot(slot)
            .ok_or_else(|| TrustError::NotFound(format!("firmware {id} slot {slot}")))?;
        let expected = image.sha256.as_deref().ok_or_else(|| {
            TrustError::InvalidArtifact(format!("firmware {id} slot {slot} has no recorded hash"))
        })?;

        integrity::verify_file(self.slot_file(image)?, expected)?;
        debug!("slot image verified");
        Ok(())
    }

    // -- Mutations -----------------------------------------------------------

    /// Append a new entry; id and timestamps are assigned here.
    #[instrument(skip_all, fields(name = %new.name, version = %new.version))]
    pub fn add(&self, new: NewFirmware) -> Result<FirmwareArtifact> {
        if new.name.trim().is_empty() || new.version.trim().is_empty() {
            return Err(TrustError::InvalidArtifact(
                "name and version are required".into(),
            ));
        }
        for image in [&new.slot_a, &new.slot_b].into_iter().flatten() {
            self.managed_file_name(&image.file_path)?;
        }

        let firmware = self.store.update(|doc| {
            let firmware = FirmwareArtifact::create(new, Utc::now());
            doc.firmwares.push(firmware.clone());
            Ok(Change::Commit(firmware))
        })?;

        info!(id = %firmware.id, "firmware added");
        Ok(firmware)
    }

    /// Merge `patch` into entry `id`.
    ///
    /// Replacing or clearing a slot leaves the previous image file on disk.
    #[instrument(skip(self, patch), fields(%id))]
    pub fn update(&self, id: &FirmwareId, patch: FirmwarePatch) -> Result<FirmwareArtifact> {
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty())
            || patch.version.as_deref().is_some_and(|v| v.trim().is_empty())
        {
            return Err(TrustError::InvalidArtifact(
                "name and version cannot be blank".into(),
            ));
        }
        for image in patch.images() {
            self.managed_file_name(&image.file_path)?;
        }

        let firmware = self.store.update(|doc| {
            let firmware = doc
                .firmwares
                .iter_mut()
                .find(|fw| &fw.id == id)
                .ok_or_else(|| TrustError::NotFound(format!("firmware {id}")))?;
            firmware.apply(patch, Utc::now());
            Ok(Change::Commit(firmware.clone()))
        })?;

        info!(version = %firmware.version, "firmware updated");
        Ok(firmware)
    }

    /// Remove entry `id` and then its slot files.
    #[instrument(skip(self), fields(%id))]
    pub fn delete(&self, id: &FirmwareId) -> Result<DeleteOutcome> {
        let removed = self.store.update(|doc| {
            match doc.firmwares.iter().position(|fw| &fw.id == id) {
                Some(index) => Ok(Change::Commit(Some(doc.firmwares.remove(index)))),
                None => Ok(Change::Keep(None)),
            }
        })?;

        let Some(firmware) = removed else {
            debug!("no such firmware");
            return Ok(DeleteOutcome {
                deleted: false,
                cleanup: CleanupReport::default(),
            });
        };

        info!(version = %firmware.version, "firmware deleted");
        Ok(DeleteOutcome {
            deleted: true,
            cleanup: self.remove_files(std::slice::from_ref(&firmware)),
        })
    }

    /// Remove every entry whose version is at or below `target`.
    ///
    /// Only entries with a valid `MAJOR.MINOR.PATCH` version are candidates,
    /// and only when `target` is valid too; everything else is kept.
    #[instrument(skip(self))]
    pub fn clear_up_to_version(&self, target: &str) -> Result<Eviction> {
        let target_valid = target.parse::<Version>().is_ok();
        if !target_valid {
            warn!("target version is not MAJOR.MINOR.PATCH, keeping every entry");
        }

        let evicted = self.store.update(|doc| {
            let (evicted, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut doc.firmwares).into_iter().partition(|fw| {
                    target_valid
                        && fw.version.parse::<Version>().is_ok()
                        && compare_versions(&fw.version, target).is_le()
                });
            doc.firmwares = kept;

            if evicted.is_empty() {
                Ok(Change::Keep(evicted))
            } else {
                Ok(Change::Commit(evicted))
            }
        })?;

        let cleanup = self.remove_files(&evicted);
        info!(
            deleted = evicted.len(),
            files_removed = cleanup.removed.len(),
            "catalog evicted up to version"
        );
        Ok(Eviction {
            deleted_count: evicted.len(),
            deleted: evicted.iter().map(FirmwareArtifact::summary).collect(),
            cleanup,
        })
    }

    // -- Internals -----------------------------------------------------------

    /// File name of a stored slot path, provided it belongs to us.
    ///
    /// Accepts a bare file name or a path whose parent is the upload
    /// directory; anything else is a foreign path.
    fn managed_file_name(&self, file_path: &str) -> Result<String> {
        let foreign = || {
            TrustError::InvalidArtifact(format!(
                "{file_path:?} is not inside {}",
                self.upload_dir.display()
            ))
        };

        let path = Path::new(file_path);
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(foreign());
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(foreign)?;

        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && parent != self.upload_dir => {
                Err(foreign())
            }
            _ => Ok(name.to_owned()),
        }
    }

    /// Delete the slot files of already-removed entries, best effort.
    fn remove_files(&self, removed: &[FirmwareArtifact]) -> CleanupReport {
        let mut report = CleanupReport::default();

        for (firmware, slot, image) in removed
            .iter()
            .flat_map(|fw| fw.images().map(move |(slot, image)| (fw, slot, image)))
        {
            let path = match self.slot_file(image) {
                Ok(path) => path,
                Err(e) => {
                    warn!(id = %firmware.id, %slot, error = %e, "skipping unmanaged slot file");
                    report.failures.push(FileFailure {
                        path: PathBuf::from(&image.file_path),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "slot file removed");
                    report.removed.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    info!(path = %path.display(), "slot file already gone");
                    report.missing.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove slot file");
                    report.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
