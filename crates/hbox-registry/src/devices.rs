// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Device registry — registered HBox units keyed by their derived device id.
//
// Stored as `device_ids.json`: `{ "devices": [...], "lastUpdate": ... }`.
// Devices are appended on registration and otherwise only have `lastSeen`
// touched; nothing here deletes a device.

use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, Utc};
use hbox_core::error::{Result, TrustError};
use hbox_core::traits::DeviceDirectory;
use hbox_core::types::{Device, DeviceStatus};
use hbox_security::identity;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::store::{Change, Document, SnapshotFile};

// ---------------------------------------------------------------------------
// Persisted document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDocument {
    #[serde(default)]
    pub devices: Vec<Device>,
    pub last_update: DateTime<Utc>,
}

impl Document for DeviceDocument {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            devices: Vec::new(),
            last_update: now,
        }
    }

    fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_update = now;
    }
}

impl DeviceDocument {
    fn find(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// A registration call as received from a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub raw_unique_id: String,
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Filled in by the transport, never by the device.
    #[serde(skip)]
    pub register_ip: Option<IpAddr>,
}

impl RegistrationRequest {
    pub fn new(raw_unique_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            raw_unique_id: raw_unique_id.into(),
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    /// Trimmed raw id and upper-cased device id, both format-checked.
    fn canonical(&self) -> Result<(String, String)> {
        let raw = self.raw_unique_id.trim();
        identity::parse_unique_id(raw).map_err(|_| {
            TrustError::InvalidRequest(
                "rawUniqueId must be XXXXXXXX-XXXXXXXX-XXXXXXXX (hex)".into(),
            )
        })?;

        let device_id = self.device_id.trim();
        if device_id.len() != 16 || !device_id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TrustError::InvalidRequest(
                "deviceId must be 16 hex characters".into(),
            ));
        }

        Ok((raw.to_owned(), device_id.to_ascii_uppercase()))
    }
}

/// Result of a registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    /// `false` when the device id was already registered.
    pub created: bool,
    pub device: Device,
}

// ---------------------------------------------------------------------------
// DeviceRegistry
// ---------------------------------------------------------------------------

/// Durable set of registered devices.
pub struct DeviceRegistry {
    store: SnapshotFile<DeviceDocument>,
}

impl DeviceRegistry {
    /// Open (or create) the registry stored at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = SnapshotFile::open(path)?;
        let registry = Self { store };
        debug!(devices = registry.len(), "device registry opened");
        Ok(registry)
    }

    /// Register a device, or return the existing record for its id.
    ///
    /// An already-registered id short-circuits before identity
    /// verification, so repeating a registration never fails.
    #[instrument(skip_all, fields(device_id = %request.device_id.trim()))]
    pub fn register(&self, request: RegistrationRequest) -> Result<Registration> {
        let (raw_unique_id, device_id) = request.canonical()?;

        self.store.update(|doc| {
            if let Some(existing) = doc.find(&device_id) {
                debug!("device already registered");
                return Ok(Change::Keep(Registration {
                    created: false,
                    device: existing.clone(),
                }));
            }

            if !identity::verify_device_id(&raw_unique_id, &device_id)? {
                warn!(%raw_unique_id, "device id does not match hardware id");
                return Err(TrustError::IdentityVerificationFailed { device_id });
            }

            let now = Utc::now();
            let device = Device {
                device_name: request
                    .device_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map_or_else(|| Device::default_name(&device_id), str::to_owned),
                raw_unique_id,
                device_id,
                register_ip: request.register_ip.map(|ip| ip.to_string()),
                register_time: now,
                last_seen: now,
                status: DeviceStatus::Active,
            };
            doc.devices.push(device.clone());

            info!(device_name = %device.device_name, "device registered");
            Ok(Change::Commit(Registration {
                created: true,
                device,
            }))
        })
    }

    /// Exact, case-sensitive lookup.
    pub fn find(&self, device_id: &str) -> Option<Device> {
        self.store.read(|doc| doc.find(device_id).cloned())
    }

    /// All devices in registration order.
    pub fn list(&self) -> Vec<Device> {
        self.store.read(|doc| doc.devices.clone())
    }

    pub fn len(&self) -> usize {
        self.store.read(|doc| doc.devices.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that `device_id` was just heard from.
    pub fn mark_seen(&self, device_id: &str) -> Result<Device> {
        self.store.update(|doc| {
            let device = doc
                .devices
                .iter_mut()
                .find(|d| d.device_id == device_id)
                .ok_or_else(|| TrustError::NotFound(format!("device {device_id}")))?;
            device.last_seen = Utc::now();
            Ok(Change::Commit(device.clone()))
        })
    }
}

impl DeviceDirectory for DeviceRegistry {
    fn find_device(&self, device_id: &str) -> Option<Device> {
        self.find(device_id)
    }
}
