// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Per-request device authentication.
//
// Checks run in a fixed order and the first failure wins:
//   1. envelope present and decodable   (AuthMissing / AuthMalformed)
//   2. all four fields non-empty        (AuthIncomplete)
//   3. device registered                (DeviceNotRegistered)
//   4. signature matches                (InvalidSignature)
//   5. challenge inside replay window   (ChallengeExpired)

use hbox_core::clock::{Clock, SystemClock};
use hbox_core::config::AuthConfig;
use hbox_core::error::{Result, TrustError};
use hbox_core::traits::DeviceDirectory;
use hbox_core::types::Device;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::envelope::AuthEnvelope;
use crate::replay::{Admission, ReplayWindow};
use crate::signature;

/// A device that passed authentication for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedDevice {
    pub device: Device,
    pub challenge: String,
    pub admission: Admission,
}

/// Validates auth envelopes against the device directory, the shared
/// signature function, and this instance's replay window.
///
/// Each instance owns its own window, so endpoint classes that need
/// different expiry get separate authenticators.
pub struct DeviceAuthenticator<D, C = SystemClock> {
    directory: D,
    replay: ReplayWindow,
    clock: C,
    expires_in_secs: u64,
}

impl<D: DeviceDirectory> DeviceAuthenticator<D, SystemClock> {
    pub fn new(directory: D, config: &AuthConfig) -> Self {
        Self::with_clock(directory, SystemClock, config.expires_in_secs)
    }
}

impl<D: DeviceDirectory, C: Clock> DeviceAuthenticator<D, C> {
    pub fn with_clock(directory: D, clock: C, expires_in_secs: u64) -> Self {
        Self {
            directory,
            replay: ReplayWindow::new(),
            clock,
            expires_in_secs,
        }
    }

    pub fn expires_in_secs(&self) -> u64 {
        self.expires_in_secs
    }

    pub fn replay_window(&self) -> &ReplayWindow {
        &self.replay
    }

    /// Authenticate a header or query carrier (base64 JSON).
    pub fn authenticate_encoded(&self, encoded: Option<&str>) -> Result<AuthenticatedDevice> {
        let envelope = match encoded.filter(|s| !s.is_empty()) {
            Some(encoded) => Some(AuthEnvelope::from_encoded(encoded).inspect_err(|e| {
                warn!(error = %e, "rejected device call");
            })?),
            None => None,
        };
        self.authenticate(envelope.as_ref())
    }

    /// Authenticate a body carrier (`deviceAuth` JSON object).
    pub fn authenticate_json(&self, value: Option<&Value>) -> Result<AuthenticatedDevice> {
        let envelope = match value.filter(|v| !v.is_null()) {
            Some(value) => Some(AuthEnvelope::from_json(value).inspect_err(|e| {
                warn!(error = %e, "rejected device call");
            })?),
            None => None,
        };
        self.authenticate(envelope.as_ref())
    }

    /// Run the check sequence on a decoded envelope.
    #[instrument(skip_all)]
    pub fn authenticate(&self, envelope: Option<&AuthEnvelope>) -> Result<AuthenticatedDevice> {
        let result = self.check(envelope);
        match &result {
            Ok(auth) => info!(
                device_id = %auth.device.device_id,
                challenge = %auth.challenge,
                admission = ?auth.admission,
                "device authenticated"
            ),
            Err(e) => warn!(error = %e, "rejected device call"),
        }
        result
    }

    fn check(&self, envelope: Option<&AuthEnvelope>) -> Result<AuthenticatedDevice> {
        let envelope = envelope.ok_or(TrustError::AuthMissing)?;
        let fields = envelope.complete()?;

        let device = self
            .directory
            .find_device(fields.device_id)
            .ok_or_else(|| TrustError::DeviceNotRegistered(fields.device_id.to_owned()))?;

        if !signature::verify(
            fields.device_id,
            fields.challenge,
            fields.timestamp,
            fields.signature,
        ) {
            debug!(received = %fields.signature, "signature mismatch");
            return Err(TrustError::InvalidSignature);
        }

        let now = self.clock.now_millis();
        let admission = self
            .replay
            .admit(fields.challenge, now, self.expires_in_secs);
        if !admission.is_accepted() {
            return Err(TrustError::ChallengeExpired);
        }

        Ok(AuthenticatedDevice {
            device,
            challenge: fields.challenge.to_owned(),
            admission,
        })
    }
}
