// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Firmware image integrity — SHA-256 fingerprints for tamper detection.

use std::fs::File;
use std::io;
use std::path::Path;

use hbox_core::error::{Result, TrustError};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stream a file through SHA-256 without loading it into memory.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Returns `Err(TrustError::IntegrityMismatch)` with the expected and actual
/// values when it does not. Comparison ignores hex case.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    check(hash_bytes(data), expected_hex)
}

/// File counterpart of [`verify_hash`].
pub fn verify_file(path: impl AsRef<Path>, expected_hex: &str) -> Result<()> {
    check(hash_file(path)?, expected_hex)
}

fn check(actual: String, expected_hex: &str) -> Result<()> {
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(TrustError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fips_180_vectors() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_hash_matches_byte_hash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("slot_a.zip");
        let payload = vec![0x5Au8; 64 * 1024 + 3];
        std::fs::write(&path, &payload).expect("write");

        assert_eq!(hash_file(&path).expect("hash"), hash_bytes(&payload));
        assert!(verify_file(&path, &hash_bytes(&payload).to_uppercase()).is_ok());
    }

    #[test]
    fn verify_mismatched_hash() {
        match verify_hash(b"a", "0000") {
            Err(TrustError::IntegrityMismatch { expected, actual }) => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, hash_bytes(b"a"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            hash_file(dir.path().join("gone.zip")),
            Err(TrustError::Io(_))
        ));
    }
}
