// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Core domain types for the HBox device registry and firmware catalog.
//
// Field names serialise in camelCase so the on-disk documents stay readable
// by the firmware server tooling that already produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Lifecycle state of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
}

/// A device that completed registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Hardware-burned identifier, `XXXXXXXX-XXXXXXXX-XXXXXXXX`.
    pub raw_unique_id: String,
    /// 16 uppercase hex characters derived from `raw_unique_id`.
    pub device_id: String,
    pub device_name: String,
    /// Address the registration call came from, as the transport reported
    /// it. Existing documents may hold placeholders such as `unknown`.
    #[serde(rename = "registerIP", default)]
    pub register_ip: Option<String>,
    pub register_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: DeviceStatus,
}

impl Device {
    /// Display name used when registration does not supply one.
    pub fn default_name(device_id: &str) -> String {
        let prefix: String = device_id.chars().take(8).collect();
        format!("HBox-{prefix}")
    }
}

// ---------------------------------------------------------------------------
// Firmware
// ---------------------------------------------------------------------------

/// Opaque identifier of a firmware catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FirmwareId(pub String);

impl FirmwareId {
    /// Fresh random 128-bit id rendered as 32 lowercase hex characters.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FirmwareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FirmwareId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One of the two independent image positions on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub const BOTH: [Slot; 2] = [Slot::A, Slot::B];
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// Binary image stored for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotImage {
    /// Location of the image inside the managed upload directory.
    pub file_path: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub file_size: u64,
    /// Lowercase hex SHA-256 of the image bytes.
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// A versioned firmware package with optional A and B images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareArtifact {
    pub id: FirmwareId,
    pub name: String,
    /// `MAJOR.MINOR.PATCH`; entries with other shapes are kept but never
    /// auto-evicted.
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub slot_a: Option<SlotImage>,
    #[serde(default)]
    pub slot_b: Option<SlotImage>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl FirmwareArtifact {
    /// Build a catalog entry from add input, assigning id and timestamps.
    pub fn create(new: NewFirmware, now: DateTime<Utc>) -> Self {
        Self {
            id: FirmwareId::generate(),
            name: new.name,
            version: new.version,
            description: new.description,
            slot_a: new.slot_a,
            slot_b: new.slot_b,
            create_time: now,
            update_time: now,
        }
    }

    pub fn slot(&self, slot: Slot) -> Option<&SlotImage> {
        match slot {
            Slot::A => self.slot_a.as_ref(),
            Slot::B => self.slot_b.as_ref(),
        }
    }

    /// Populated slots in A, B order.
    pub fn images(&self) -> impl Iterator<Item = (Slot, &SlotImage)> {
        Slot::BOTH
            .into_iter()
            .filter_map(move |slot| self.slot(slot).map(|image| (slot, image)))
    }

    /// Merge `patch` field by field. `id` and `create_time` never change;
    /// `update_time` is always bumped.
    pub fn apply(&mut self, patch: FirmwarePatch, now: DateTime<Utc>) {
        let FirmwarePatch {
            name,
            version,
            description,
            slot_a,
            slot_b,
        } = patch;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(version) = version {
            self.version = version;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(slot_a) = slot_a {
            self.slot_a = slot_a;
        }
        if let Some(slot_b) = slot_b {
            self.slot_b = slot_b;
        }
        self.update_time = now;
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Input for adding a firmware entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFirmware {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub slot_a: Option<SlotImage>,
    #[serde(default)]
    pub slot_b: Option<SlotImage>,
}

/// Partial update of a firmware entry.
///
/// `None` leaves a field alone. For slots, `Some(None)` clears the slot and
/// `Some(Some(image))` replaces it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwarePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "double_option")]
    pub slot_a: Option<Option<SlotImage>>,
    #[serde(default, with = "double_option")]
    pub slot_b: Option<Option<SlotImage>>,
}

impl FirmwarePatch {
    /// Slot images this patch would install.
    pub fn images(&self) -> impl Iterator<Item = &SlotImage> {
        [&self.slot_a, &self.slot_b]
            .into_iter()
            .filter_map(|slot| slot.as_ref().and_then(Option::as_ref))
    }
}

/// Short description of a removed catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: FirmwareId,
    pub name: String,
    pub version: String,
}

/// Distinguishes an absent key from an explicit `null` so a patch can clear
/// a slot.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
