// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// HBox Registry — durable device registry and A/B firmware catalog.
//
// Each store is a single JSON document rewritten atomically on every
// mutation and cached in memory between writes. Firmware images live as
// plain files in one managed upload directory.

pub mod devices;
pub mod firmware;
pub mod store;
pub mod uploads;
pub mod version;

pub use devices::{DeviceRegistry, Registration, RegistrationRequest};
pub use firmware::{CleanupReport, DeleteOutcome, Eviction, FirmwareRegistry};
pub use uploads::UploadStager;
pub use version::{Version, compare_versions, is_valid_version};
