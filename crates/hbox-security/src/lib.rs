// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors

//! hbox-security — device trust primitives for the HBox registry.
//!
//! Derives and checks device identities from hardware unique IDs, computes
//! and verifies request signatures, bounds challenge replay, and keeps an
//! append-only audit trail.
//!
//! COMPATIBILITY: `identity` and `signature` must produce exactly the same
//! output as the algorithms flashed on HBox controllers. Their reference
//! vectors are pinned in the unit tests; never change a constant there.

pub mod audit;
pub mod authenticator;
pub mod envelope;
pub mod identity;
pub mod integrity;
pub mod replay;
pub mod signature;

// PUBLIC API: Re-export the trust primitives
pub use audit::AuditLog;
pub use authenticator::{AuthenticatedDevice, DeviceAuthenticator};
pub use envelope::AuthEnvelope;
pub use identity::{derive_device_id, parse_unique_id, verify_device_id};
pub use integrity::{hash_bytes, hash_file, verify_file, verify_hash};
pub use replay::{Admission, ReplayWindow};
pub use signature::sign;
