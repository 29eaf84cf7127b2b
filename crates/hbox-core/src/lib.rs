// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// HBox registry — core types and error definitions shared across all crates.

pub mod clock;
pub mod codes;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RegistryConfig;
pub use error::{Result, TrustError};
pub use traits::DeviceDirectory;
pub use types::*;
