// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Wire-level error codes for the transport layer.
//
// Devices in the field parse the `error` string of a rejected response, so
// the codes here must not change. The HTTP status is a suggestion; the
// transport owns the final mapping.

use crate::error::TrustError;

/// Broad class of a failure, used by the transport to pick a response family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The caller could not be authenticated.
    Unauthorized,
    /// The request itself is wrong (bad format, failed verification).
    BadRequest,
    /// The addressed entity does not exist.
    Missing,
    /// Something went wrong on our side.
    Internal,
}

/// A transport-ready description of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireError {
    /// Stable machine-readable code (e.g. `"AUTH_MISSING"`).
    pub code: &'static str,
    /// Suggested HTTP status.
    pub status: u16,
    pub class: FailureClass,
    /// Human-readable message, safe to return to the device.
    pub message: String,
}

/// Map an error to its wire code and suggested status.
pub fn wire_error(err: &TrustError) -> WireError {
    let (code, class) = match err {
        TrustError::AuthMissing => ("AUTH_MISSING", FailureClass::Unauthorized),
        TrustError::AuthMalformed(_) => ("AUTH_INVALID_FORMAT", FailureClass::Unauthorized),
        TrustError::AuthIncomplete => ("AUTH_INCOMPLETE", FailureClass::Unauthorized),
        TrustError::DeviceNotRegistered(_) => {
            ("DEVICE_NOT_REGISTERED", FailureClass::Unauthorized)
        }
        TrustError::InvalidSignature => ("INVALID_SIGNATURE", FailureClass::Unauthorized),
        TrustError::ChallengeExpired => ("CHALLENGE_EXPIRED", FailureClass::Unauthorized),

        TrustError::MalformedIdentity(_) => ("MALFORMED_IDENTITY", FailureClass::BadRequest),
        TrustError::IdentityVerificationFailed { .. } => {
            ("IDENTITY_VERIFICATION_FAILED", FailureClass::BadRequest)
        }
        TrustError::InvalidRequest(_) => ("INVALID_REQUEST", FailureClass::BadRequest),
        TrustError::InvalidArtifact(_) => ("INVALID_ARTIFACT", FailureClass::BadRequest),
        TrustError::IntegrityMismatch { .. } => ("INTEGRITY_MISMATCH", FailureClass::BadRequest),

        TrustError::NotFound(_) => ("NOT_FOUND", FailureClass::Missing),

        TrustError::PersistenceFailed(_) => ("PERSISTENCE_FAILED", FailureClass::Internal),
        TrustError::Database(_) | TrustError::Io(_) | TrustError::Serialization(_) => {
            ("SERVER_ERROR", FailureClass::Internal)
        }
    };

    let status = match class {
        FailureClass::Unauthorized => 401,
        FailureClass::BadRequest => 400,
        FailureClass::Missing => 404,
        FailureClass::Internal => 500,
    };

    WireError {
        code,
        status,
        class,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_unauthorized() {
        for err in [
            TrustError::AuthMissing,
            TrustError::AuthMalformed("bad base64".into()),
            TrustError::AuthIncomplete,
            TrustError::DeviceNotRegistered("0011223344556677".into()),
            TrustError::InvalidSignature,
            TrustError::ChallengeExpired,
        ] {
            assert!(err.is_auth_failure());
            let wire = wire_error(&err);
            assert_eq!(wire.status, 401, "{}", wire.code);
            assert_eq!(wire.class, FailureClass::Unauthorized);
        }
    }

    #[test]
    fn malformed_envelope_keeps_device_facing_code() {
        let wire = wire_error(&TrustError::AuthMalformed("not json".into()));
        assert_eq!(wire.code, "AUTH_INVALID_FORMAT");
    }

    #[test]
    fn verification_failure_is_bad_request() {
        let wire = wire_error(&TrustError::IdentityVerificationFailed {
            device_id: "0011223344556677".into(),
        });
        assert_eq!(wire.status, 400);
        assert!(wire.message.contains("0011223344556677"));
    }

    #[test]
    fn persistence_failure_is_internal() {
        let err = TrustError::PersistenceFailed("disk full".into());
        assert!(!err.is_auth_failure());
        let wire = wire_error(&err);
        assert_eq!(wire.code, "PERSISTENCE_FAILED");
        assert_eq!(wire.status, 500);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(wire_error(&TrustError::NotFound("firmware x".into())).status, 404);
    }
}
