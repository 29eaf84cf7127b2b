// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Device identity — 64-bit id derived from the three 32-bit MCU unique-ID
// words. Bit-exact with the derivation in the controller firmware.

use hbox_core::error::{Result, TrustError};

/// "HBox" in ASCII.
const SALT_1: u32 = 0x4842_6F78;
/// "2024" in ASCII.
const SALT_2: u32 = 0x3230_3234;

const PRIME_1: u32 = 0x9E37_79B9;
const PRIME_2: u32 = 0x85EB_CA6B;
const PRIME_3: u32 = 0xC2B2_AE35;

/// Derive the 16-character uppercase hex device id for a unique ID.
pub fn derive_device_id(uid0: u32, uid1: u32, uid2: u32) -> String {
    let h1 = (uid0 ^ SALT_1).rotate_left(13).wrapping_mul(PRIME_1) ^ uid1;
    let h2 = (uid1 ^ SALT_2).rotate_left(17).wrapping_mul(PRIME_2) ^ uid2;
    let h3 = (uid2 ^ SALT_1.wrapping_add(SALT_2))
        .rotate_left(21)
        .wrapping_mul(PRIME_3)
        ^ h1;

    format!("{:08X}{:08X}", h1 ^ h2, h2 ^ h3)
}

/// Split `XXXXXXXX-XXXXXXXX-XXXXXXXX` into its three words.
///
/// Each group must be exactly eight hex digits; anything else is
/// `MalformedIdentity`.
pub fn parse_unique_id(raw: &str) -> Result<[u32; 3]> {
    let malformed = || TrustError::MalformedIdentity(raw.to_owned());

    let mut words = [0u32; 3];
    let mut groups = raw.split('-');
    for word in &mut words {
        let group = groups.next().ok_or_else(malformed)?;
        if group.len() != 8 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        *word = u32::from_str_radix(group, 16).map_err(|_| malformed())?;
    }
    if groups.next().is_some() {
        return Err(malformed());
    }
    Ok(words)
}

/// Device id for a textual unique ID.
pub fn device_id_for(raw: &str) -> Result<String> {
    let [uid0, uid1, uid2] = parse_unique_id(raw)?;
    Ok(derive_device_id(uid0, uid1, uid2))
}

/// Check that `asserted` is the id derived from `raw`, ignoring case.
pub fn verify_device_id(raw: &str, asserted: &str) -> Result<bool> {
    Ok(device_id_for(raw)?.eq_ignore_ascii_case(asserted))
}
