// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Unified error types for the HBox registry.

use thiserror::Error;

/// Top-level error type for all registry and authentication operations.
#[derive(Debug, Error)]
pub enum TrustError {
    // -- Identity --
    #[error("malformed unique id: {0}")]
    MalformedIdentity(String),

    #[error("device id {device_id} does not match its unique id")]
    IdentityVerificationFailed { device_id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // -- Authentication --
    #[error("device authentication required")]
    AuthMissing,

    #[error("invalid authentication format: {0}")]
    AuthMalformed(String),

    #[error("authentication data incomplete")]
    AuthIncomplete,

    #[error("device not registered: {0}")]
    DeviceNotRegistered(String),

    #[error("invalid device signature")]
    InvalidSignature,

    #[error("challenge has expired")]
    ChallengeExpired,

    // -- Catalog --
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid firmware artifact: {0}")]
    InvalidArtifact(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Storage / persistence --
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrustError {
    /// Whether this error rejects an authenticated call (as opposed to a
    /// registration, catalog, or storage failure).
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthMissing
                | Self::AuthMalformed(_)
                | Self::AuthIncomplete
                | Self::DeviceNotRegistered(_)
                | Self::InvalidSignature
                | Self::ChallengeExpired
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TrustError>;
