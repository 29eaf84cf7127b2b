// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Central service layer — opens every backend store for one data directory
// and records each trust decision and catalog removal in the audit log.
//
// `AuditLog` wraps a rusqlite connection, which is `Send` but not `Sync`, so
// it sits behind a `Mutex`. The registries synchronise themselves.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hbox_core::codes::wire_error;
use hbox_core::config::{AuthSource, RegistryConfig};
use hbox_core::error::{Result, TrustError};
use hbox_core::types::{
    Device, FirmwareArtifact, FirmwareId, FirmwarePatch, NewFirmware, Slot, SlotImage,
};
use hbox_registry::{
    DeleteOutcome, DeviceRegistry, Eviction, FirmwareRegistry, Registration,
    RegistrationRequest, UploadStager,
};
use hbox_security::audit::{AuditEntry, AuditLog};
use hbox_security::{AuthEnvelope, AuthenticatedDevice, DeviceAuthenticator};
use serde_json::Value;
use tracing::{error, info, warn};

/// Input for adding a firmware entry from local image files.
#[derive(Debug, Clone, Default)]
pub struct FirmwareUpload<'a> {
    pub name: String,
    pub version: String,
    pub description: String,
    pub slot_a: Option<&'a Path>,
    pub slot_b: Option<&'a Path>,
}

/// What to do with one slot in an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotChange<'a> {
    #[default]
    Keep,
    Clear,
    Replace(&'a Path),
}

/// Input for updating a firmware entry.
#[derive(Debug, Clone, Default)]
pub struct FirmwareChange<'a> {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub slot_a: SlotChange<'a>,
    pub slot_b: SlotChange<'a>,
}

/// Every registry service for one data directory.
pub struct RegistryServices {
    config: RegistryConfig,
    devices: Arc<DeviceRegistry>,
    firmware: FirmwareRegistry,
    stager: UploadStager,
    authenticator: DeviceAuthenticator<Arc<DeviceRegistry>>,
    audit_log: Mutex<AuditLog>,
}

impl RegistryServices {
    /// Open all stores under `data_dir`, creating it if needed.
    ///
    /// `config_file` overrides `<data_dir>/hbox.json`.
    pub fn init(data_dir: PathBuf, config_file: Option<&Path>) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let config = RegistryConfig::load(&data_dir, config_file)?;
        info!(path = %data_dir.display(), "initialising registry services");

        let devices = Arc::new(DeviceRegistry::open(config.device_file())?);
        let firmware = FirmwareRegistry::open(config.firmware_file(), config.upload_dir())?;
        let stager = UploadStager::from_config(&config);
        let authenticator = DeviceAuthenticator::new(Arc::clone(&devices), &config.auth);
        let audit_log = AuditLog::open(config.audit_file())?;

        info!(
            devices = devices.len(),
            firmwares = firmware.len(),
            "registry services initialised"
        );

        Ok(Self {
            config,
            devices,
            firmware,
            stager,
            authenticator,
            audit_log: Mutex::new(audit_log),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // -- Devices -------------------------------------------------------------

    pub fn register(&self, request: RegistrationRequest) -> Result<Registration> {
        let claimed = request.device_id.trim().to_ascii_uppercase();
        let result = self.devices.register(request);
        match &result {
            Ok(registration) => self.audit(
                "register",
                &registration.device.device_id,
                true,
                Some(if registration.created { "created" } else { "existing" }),
            ),
            Err(e) => self.audit("register", &claimed, false, Some(wire_error(e).code)),
        }
        result
    }

    pub fn devices(&self) -> Vec<Device> {
        self.devices.list()
    }

    /// Authenticate an envelope as it would arrive through `source`.
    ///
    /// Header and query carriers are base64 JSON; a body carrier is the raw
    /// JSON object. Accepted calls bump the device's `lastSeen`.
    pub fn authenticate(&self, input: &str, source: AuthSource) -> Result<AuthenticatedDevice> {
        let result = match source {
            AuthSource::Header | AuthSource::Query => {
                self.authenticator.authenticate_encoded(Some(input))
            }
            AuthSource::Body => serde_json::from_str::<Value>(input)
                .map_err(|e| TrustError::AuthMalformed(format!("json: {e}")))
                .and_then(|value| self.authenticator.authenticate_json(Some(&value))),
        };

        match &result {
            Ok(auth) => {
                let admission = format!("{:?}", auth.admission);
                self.audit("authenticate", &auth.device.device_id, true, Some(&admission));
                if let Err(e) = self.devices.mark_seen(&auth.device.device_id) {
                    warn!(error = %e, "could not update lastSeen");
                }
            }
            Err(e) => {
                let subject = claimed_device(input, source);
                self.audit("authenticate", &subject, false, Some(wire_error(e).code));
            }
        }
        result
    }

    // -- Firmware ------------------------------------------------------------

    pub fn firmware(&self) -> Vec<FirmwareArtifact> {
        self.firmware.list()
    }

    pub fn find_firmware(&self, id: &FirmwareId) -> Result<FirmwareArtifact> {
        self.firmware
            .find_by_id(id)
            .ok_or_else(|| TrustError::NotFound(format!("firmware {id}")))
    }

    /// Stage the given image files and add a catalog entry for them.
    ///
    /// Images staged before a failure are removed again.
    pub fn add_firmware(&self, upload: FirmwareUpload<'_>) -> Result<FirmwareArtifact> {
        let mut staged = Vec::new();
        let result = self.try_add(upload, &mut staged);
        if result.is_err() {
            self.discard_all(&staged);
        }
        result
    }

    fn try_add(
        &self,
        upload: FirmwareUpload<'_>,
        staged: &mut Vec<SlotImage>,
    ) -> Result<FirmwareArtifact> {
        let slot_a = self.stage(upload.slot_a, staged)?;
        let slot_b = self.stage(upload.slot_b, staged)?;
        self.firmware.add(NewFirmware {
            name: upload.name,
            version: upload.version,
            description: upload.description,
            slot_a,
            slot_b,
        })
    }

    /// Apply `change` to entry `id`, staging any replacement images.
    pub fn update_firmware(
        &self,
        id: &FirmwareId,
        change: FirmwareChange<'_>,
    ) -> Result<FirmwareArtifact> {
        let mut staged = Vec::new();
        let result = self.try_update(id, change, &mut staged);
        if result.is_err() {
            self.discard_all(&staged);
        }
        result
    }

    fn try_update(
        &self,
        id: &FirmwareId,
        change: FirmwareChange<'_>,
        staged: &mut Vec<SlotImage>,
    ) -> Result<FirmwareArtifact> {
        let patch = FirmwarePatch {
            name: change.name,
            version: change.version,
            description: change.description,
            slot_a: self.stage_change(change.slot_a, staged)?,
            slot_b: self.stage_change(change.slot_b, staged)?,
        };
        self.firmware.update(id, patch)
    }

    pub fn delete_firmware(&self, id: &FirmwareId) -> Result<DeleteOutcome> {
        let outcome = self.firmware.delete(id)?;
        if outcome.deleted {
            let details = cleanup_details(&outcome.cleanup);
            self.audit("delete", id.as_str(), outcome.cleanup.is_clean(), Some(&details));
        }
        Ok(outcome)
    }

    pub fn clear_up_to_version(&self, target: &str) -> Result<Eviction> {
        let eviction = self.firmware.clear_up_to_version(target)?;
        for summary in &eviction.deleted {
            self.audit("evict", summary.id.as_str(), true, Some(&summary.version));
        }
        let details = format!(
            "{} entries; {}",
            eviction.deleted_count,
            cleanup_details(&eviction.cleanup)
        );
        self.audit("evict", target, eviction.cleanup.is_clean(), Some(&details));
        Ok(eviction)
    }

    pub fn check_update(&self, current_version: &str) -> Result<Option<FirmwareArtifact>> {
        self.firmware.latest_newer_than(current_version)
    }

    pub fn verify_slot(&self, id: &FirmwareId, slot: Slot) -> Result<()> {
        let result = self.firmware.verify_slot(id, slot);
        let details = match &result {
            Ok(()) => format!("slot {slot}"),
            Err(e) => format!("slot {slot}: {}", wire_error(e).code),
        };
        self.audit("verify", id.as_str(), result.is_ok(), Some(&details));
        result
    }

    // -- Audit ---------------------------------------------------------------

    /// Record an audit entry, logging (not propagating) any failure.
    pub fn audit(&self, action: &str, subject: &str, success: bool, details: Option<&str>) {
        if let Ok(log) = self.audit_log.lock() {
            if let Err(e) = log.record(action, subject, success, details) {
                error!(error = %e, "failed to record audit entry");
            }
        }
    }

    pub fn recent_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let log = self.audit_log.lock().expect("audit lock poisoned");
        log.recent_entries(limit)
    }

    pub fn audit_entries_for_subject(&self, subject: &str) -> Result<Vec<AuditEntry>> {
        let log = self.audit_log.lock().expect("audit lock poisoned");
        log.entries_for_subject(subject)
    }

    // -- Internals -----------------------------------------------------------

    fn stage(
        &self,
        source: Option<&Path>,
        staged: &mut Vec<SlotImage>,
    ) -> Result<Option<SlotImage>> {
        let Some(source) = source else {
            return Ok(None);
        };
        let image = self.stager.stage_file(source)?;
        staged.push(image.clone());
        Ok(Some(image))
    }

    fn stage_change(
        &self,
        change: SlotChange<'_>,
        staged: &mut Vec<SlotImage>,
    ) -> Result<Option<Option<SlotImage>>> {
        match change {
            SlotChange::Keep => Ok(None),
            SlotChange::Clear => Ok(Some(None)),
            SlotChange::Replace(source) => Ok(Some(self.stage(Some(source), staged)?)),
        }
    }

    fn discard_all(&self, staged: &[SlotImage]) {
        for image in staged {
            if let Err(e) = self.stager.discard(image) {
                warn!(file = %image.file_path, error = %e, "could not discard staged image");
            }
        }
    }
}

/// Device id named in an envelope, for auditing rejected calls.
fn claimed_device(input: &str, source: AuthSource) -> String {
    let envelope = match source {
        AuthSource::Body => serde_json::from_str::<Value>(input)
            .ok()
            .and_then(|value| AuthEnvelope::from_json(&value).ok()),
        AuthSource::Header | AuthSource::Query => AuthEnvelope::from_encoded(input).ok(),
    };
    envelope
        .and_then(|e| e.device_id)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "unknown".into())
}

fn cleanup_details(cleanup: &hbox_registry::CleanupReport) -> String {
    format!(
        "{} files removed, {} missing, {} failed",
        cleanup.removed.len(),
        cleanup.missing.len(),
        cleanup.failures.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbox_security::Admission;

    const RAW: &str = "AABBCCDD-11223344-55667788";
    const ID: &str = "29ABFA67DB7B6F85";

    fn services(dir: &tempfile::TempDir) -> RegistryServices {
        RegistryServices::init(dir.path().join("data"), None).expect("init services")
    }

    fn image(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, name.as_bytes()).expect("write image");
        path
    }

    #[test]
    fn init_creates_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = services(&dir);
        assert!(svc.config().upload_dir().is_dir());
        assert!(svc.config().audit_file().exists());
        assert!(svc.devices().is_empty());
    }

    #[test]
    fn registration_is_audited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = services(&dir);
        svc.register(RegistrationRequest::new(RAW, ID)).expect("register");
        assert!(svc.register(RegistrationRequest::new(RAW, "0000000000000000")).is_err());

        let accepted = svc.audit_entries_for_subject(ID).expect("entries");
        assert_eq!(accepted.len(), 1);
        assert!(accepted[0].success);
        assert_eq!(accepted[0].details.as_deref(), Some("created"));

        let rejected = svc
            .audit_entries_for_subject("0000000000000000")
            .expect("entries");
        assert_eq!(rejected.len(), 1);
        assert!(!rejected[0].success);
        assert_eq!(
            rejected[0].details.as_deref(),
            Some("IDENTITY_VERIFICATION_FAILED")
        );
    }

    #[test]
    fn authentication_decisions_are_audited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = services(&dir);
        svc.register(RegistrationRequest::new(RAW, ID)).expect("register");

        let header = AuthEnvelope::signed(ID, "ch1", 1_000_000)
            .to_encoded()
            .expect("encode");
        let auth = svc
            .authenticate(&header, AuthSource::Header)
            .expect("authenticate");
        assert_eq!(auth.admission, Admission::Fresh);

        let mut forged = AuthEnvelope::signed(ID, "ch2", 1_000_000);
        forged.signature = Some("SIG_DEADBEEF".into());
        let body = serde_json::to_string(&forged).expect("json");
        assert!(matches!(
            svc.authenticate(&body, AuthSource::Body),
            Err(TrustError::InvalidSignature)
        ));

        let entries = svc.audit_entries_for_subject(ID).expect("entries");
        let decisions: Vec<_> = entries
            .iter()
            .filter(|e| e.action == "authenticate")
            .map(|e| (e.success, e.details.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            decisions,
            vec![
                (true, "Fresh".to_string()),
                (false, "INVALID_SIGNATURE".to_string())
            ]
        );
    }

    #[test]
    fn unreadable_envelope_is_audited_as_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = services(&dir);
        assert!(matches!(
            svc.authenticate("not base64!", AuthSource::Query),
            Err(TrustError::AuthMalformed(_))
        ));
        let entries = svc.audit_entries_for_subject("unknown").expect("entries");
        assert_eq!(entries[0].details.as_deref(), Some("AUTH_INVALID_FORMAT"));
    }

    #[test]
    fn add_update_and_delete_firmware() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = services(&dir);
        let a = image(&dir, "hbox-a.zip");
        let b = image(&dir, "hbox-b.zip");

        let fw = svc
            .add_firmware(FirmwareUpload {
                name: "HBox".into(),
                version: "1.0.0".into(),
                slot_a: Some(&a),
                ..Default::default()
            })
            .expect("add");
        assert_eq!(fw.slot_a.as_ref().map(|s| s.original_name.as_str()), Some("hbox-a.zip"));
        svc.verify_slot(&fw.id, Slot::A).expect("verify");

        let updated = svc
            .update_firmware(
                &fw.id,
                FirmwareChange {
                    slot_b: SlotChange::Replace(&b),
                    ..Default::default()
                },
            )
            .expect("update");
        assert!(updated.slot_b.is_some());

        let outcome = svc.delete_firmware(&fw.id).expect("delete");
        assert!(outcome.deleted);
        assert_eq!(outcome.cleanup.removed.len(), 2);
        assert!(svc.firmware().is_empty());

        let actions: Vec<_> = svc
            .audit_entries_for_subject(fw.id.as_str())
            .expect("entries")
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["verify", "delete"]);
    }

    #[test]
    fn failed_add_discards_staged_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = services(&dir);
        let a = image(&dir, "hbox-a.zip");
        let wrong = image(&dir, "hbox-b.bin");

        let result = svc.add_firmware(FirmwareUpload {
            name: "HBox".into(),
            version: "1.0.0".into(),
            slot_a: Some(&a),
            slot_b: Some(&wrong),
            ..Default::default()
        });
        assert!(matches!(result, Err(TrustError::InvalidArtifact(_))));
        let leftovers = std::fs::read_dir(svc.config().upload_dir())
            .expect("read uploads")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn eviction_is_audited_per_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let svc = services(&dir);
        for version in ["1.0.0", "2.0.0", "2.0.1"] {
            svc.add_firmware(FirmwareUpload {
                name: "HBox".into(),
                version: version.into(),
                ..Default::default()
            })
            .expect("add");
        }

        let eviction = svc.clear_up_to_version("2.0.0").expect("evict");
        assert_eq!(eviction.deleted_count, 2);
        assert_eq!(
            svc.check_update("1.0.0")
                .expect("check")
                .map(|fw| fw.version),
            Some("2.0.1".to_string())
        );

        let recent = svc.recent_audit_entries(10).expect("recent");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].subject, "2.0.0");
        assert!(recent.iter().all(|e| e.action == "evict"));
    }
}
