// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Request signature shared with the controller firmware.
//
// The signature is a DJB2-style fold over `device_id || challenge ||
// timestamp` seeded with the golden-ratio constant. It uses no secret: any
// party that sees the three fields can compute it. Devices in the field
// depend on this exact function, so it must not gain a key.

const SEED: u32 = 0x9E37_79B9;

/// Compute `SIG_XXXXXXXX` for a request.
///
/// Characters are folded as UTF-16 code units, which is what the server
/// side has always hashed; for the ASCII ids and challenges devices send
/// this is the same as hashing bytes.
pub fn sign(device_id: &str, challenge: &str, timestamp: i64) -> String {
    let timestamp = timestamp.to_string();
    let hash = device_id
        .encode_utf16()
        .chain(challenge.encode_utf16())
        .chain(timestamp.encode_utf16())
        .fold(SEED, |hash, unit| {
            hash.wrapping_mul(33).wrapping_add(u32::from(unit))
        });

    format!("SIG_{hash:08X}")
}

/// Whether `signature` is the expected one for these fields. Exact,
/// case-sensitive comparison.
pub fn verify(device_id: &str, challenge: &str, timestamp: i64, signature: &str) -> bool {
    sign(device_id, challenge, timestamp) == signature
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: &str = "29ABFA67DB7B6F85";

    #[test]
    fn reference_vectors() {
        assert_eq!(sign(DEVICE, "ch1", 1_000_000), "SIG_B8CE1B10");
        assert_eq!(sign("", "", 0), "SIG_6526B109");
        assert_eq!(sign("0000000000000000", "abc", 1_700_000_000), "SIG_F5C22C87");
    }

    #[test]
    fn deterministic() {
        assert_eq!(sign(DEVICE, "nonce-7", 42), sign(DEVICE, "nonce-7", 42));
    }

    #[test]
    fn timestamp_change_changes_signature() {
        assert_eq!(sign(DEVICE, "ch1", 1_000_001), "SIG_B8CE1B11");
        for t in [0i64, 1, 59, 1_000_000, 1_700_000_000_123] {
            assert_ne!(sign(DEVICE, "ch1", t), sign(DEVICE, "ch1", t + 1), "t = {t}");
        }
    }

    #[test]
    fn verify_is_exact() {
        let sig = sign(DEVICE, "ch1", 1_000_000);
        assert!(verify(DEVICE, "ch1", 1_000_000, &sig));
        assert!(!verify(DEVICE, "ch1", 1_000_000, &sig.to_lowercase()));
        assert!(!verify(DEVICE, "ch2", 1_000_000, &sig));
    }
}
