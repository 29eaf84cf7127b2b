// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Authentication envelope carried by every privileged device call.
//
// Wire form is a JSON object `{deviceId, challenge, timestamp, signature}`.
// In a header or query parameter it is base64 (standard alphabet) encoded;
// in a request body it is embedded as-is.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Map, Value};

use hbox_core::error::{Result, TrustError};

use crate::signature;

/// Decoded, not yet validated, envelope. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Envelope whose four fields are all present and non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteEnvelope<'a> {
    pub device_id: &'a str,
    pub challenge: &'a str,
    pub timestamp: i64,
    pub signature: &'a str,
}

impl AuthEnvelope {
    /// Build a correctly signed envelope, as a device would.
    pub fn signed(device_id: &str, challenge: &str, timestamp: i64) -> Self {
        Self {
            device_id: Some(device_id.to_owned()),
            challenge: Some(challenge.to_owned()),
            timestamp: Some(timestamp),
            signature: Some(signature::sign(device_id, challenge, timestamp)),
        }
    }

    /// Decode the base64 form used in headers and query strings.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TrustError::AuthMalformed(format!("base64: {e}")))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| TrustError::AuthMalformed(format!("json: {e}")))?;
        Self::from_json(&value)
    }

    /// Interpret a JSON object, as found in a request body.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| TrustError::AuthMalformed("envelope is not an object".into()))?;

        Ok(Self {
            device_id: string_field(object, "deviceId")?,
            challenge: string_field(object, "challenge")?,
            timestamp: timestamp_field(object)?,
            signature: string_field(object, "signature")?,
        })
    }

    /// Base64 form for headers and query strings.
    pub fn to_encoded(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Borrow the fields if every one is present and non-empty.
    ///
    /// A zero timestamp counts as empty.
    pub fn complete(&self) -> Result<CompleteEnvelope<'_>> {
        match (
            non_empty(&self.device_id),
            non_empty(&self.challenge),
            self.timestamp.filter(|t| *t != 0),
            non_empty(&self.signature),
        ) {
            (Some(device_id), Some(challenge), Some(timestamp), Some(signature)) => {
                Ok(CompleteEnvelope {
                    device_id,
                    challenge,
                    timestamp,
                    signature,
                })
            }
            _ => Err(TrustError::AuthIncomplete),
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn string_field(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TrustError::AuthMalformed(format!("{key} must be a string"))),
    }
}

/// Accept an integer or a decimal string; an empty string is absent.
fn timestamp_field(object: &Map<String, Value>) -> Result<Option<i64>> {
    let malformed = || TrustError::AuthMalformed("timestamp must be an integer".into());
    match object.get("timestamp") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(malformed),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s.parse::<i64>().map(Some).map_err(|_| malformed()),
        Some(_) => Err(malformed()),
    }
}
